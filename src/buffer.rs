//! # Bounded Buffer
//!
//! Fixed-capacity circular buffer shared by every producer and consumer.
//!
//! ## Layers
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ BoundedBuffer<S, D, N>                                 │
//! │   empty_slots: S (N permits)   full_slots: S (0)       │
//! │   store: SemMutex<S, SlotStore<N>>                     │
//! │   sink: D                                              │
//! ├────────────────────────────────────────────────────────┤
//! │ SlotStore<N>                                           │
//! │   slots: [i32; N]   write / read cursors   occupancy   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! `SlotStore` is the single-slot, O(1) state machine; it never looks at
//! any slot other than the one under its cursor. `BoundedBuffer` wraps it
//! in the classic bounded-buffer protocol:
//!
//! - insert: pend `empty_slots` → lock → put → unlock → post `full_slots`
//! - remove: pend `full_slots` → lock → take → unlock → post `empty_slots`
//!
//! The counting semaphore is always taken before the mutex. Taking them
//! the other way round lets a unit sleep on a full/empty buffer while
//! holding the lock every peer needs.

use crate::config::EMPTY_SLOT;
use crate::diag::DiagnosticSink;
use crate::error::BufferError;
use crate::sync::{SemMutex, Semaphore};

/// Value type stored in the buffer.
pub type Item = i32;

// ---------------------------------------------------------------------------
// Slot store
// ---------------------------------------------------------------------------

/// Circular slot array with write/read cursors and an occupancy counter.
///
/// Invariant: `occupancy` equals the number of non-`EMPTY_SLOT` entries
/// and stays within `0..=N`.
#[derive(Debug, Clone)]
pub struct SlotStore<const N: usize> {
    slots: [Item; N],
    write: usize,
    read: usize,
    occupancy: usize,
}

impl<const N: usize> SlotStore<N> {
    const NON_EMPTY: () = assert!(N > 0, "buffer capacity must be at least 1");

    /// Create a store with every slot empty and both cursors at 0.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            slots: [EMPTY_SLOT; N],
            write: 0,
            read: 0,
            occupancy: 0,
        }
    }

    /// Store `item` in the slot under the write cursor.
    ///
    /// Returns the new occupancy. Fails without mutation if that slot is
    /// still occupied.
    pub fn put(&mut self, item: Item) -> Result<usize, BufferError> {
        if item == EMPTY_SLOT {
            return Err(BufferError::ReservedValue);
        }
        if self.slots[self.write] != EMPTY_SLOT {
            return Err(BufferError::SlotOccupied {
                index: self.write,
                item,
            });
        }
        self.occupancy += 1;
        self.slots[self.write] = item;
        self.write = (self.write + 1) % N;
        Ok(self.occupancy)
    }

    /// Take the item under the read cursor and mark its slot empty.
    ///
    /// Returns the item and the new occupancy. Fails without mutation if
    /// that slot is empty.
    pub fn take(&mut self) -> Result<(Item, usize), BufferError> {
        let item = self.slots[self.read];
        if item == EMPTY_SLOT {
            return Err(BufferError::SlotEmpty { index: self.read });
        }
        self.occupancy -= 1;
        self.slots[self.read] = EMPTY_SLOT;
        self.read = (self.read + 1) % N;
        Ok((item, self.occupancy))
    }

    #[inline]
    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn write_cursor(&self) -> usize {
        self.write
    }

    #[inline]
    pub fn read_cursor(&self) -> usize {
        self.read
    }

    /// Raw slot contents, `EMPTY_SLOT` for free slots.
    pub fn slots(&self) -> &[Item; N] {
        &self.slots
    }

    /// Number of slots holding an item, counted from the slots themselves.
    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|&&v| v != EMPTY_SLOT).count()
    }

    /// Overwrite a slot behind the cursors' back.
    #[cfg(test)]
    pub(crate) fn corrupt_slot(&mut self, index: usize, value: Item) {
        self.slots[index] = value;
    }
}

impl<const N: usize> Default for SlotStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Bounded buffer
// ---------------------------------------------------------------------------

/// The slot store behind the bounded-buffer semaphore protocol.
pub struct BoundedBuffer<S, D, const N: usize> {
    empty_slots: S,
    full_slots: S,
    store: SemMutex<S, SlotStore<N>>,
    sink: D,
}

impl<S: Semaphore, D: DiagnosticSink, const N: usize> BoundedBuffer<S, D, N> {
    /// Create an empty buffer: `N` free-slot permits, no item permits.
    pub fn new(sink: D) -> Self {
        let cap = N as u32;
        Self {
            empty_slots: S::new(cap, cap),
            full_slots: S::new(0, cap),
            store: SemMutex::new(SlotStore::new()),
            sink,
        }
    }

    /// Insert one item, blocking while the buffer is full.
    ///
    /// Returns the occupancy after the insert. On a consistency failure
    /// the free-slot permit is handed back and the buffer is untouched.
    pub fn insert(&self, item: Item) -> Result<usize, BufferError> {
        if item == EMPTY_SLOT {
            self.sink.error("insert: item value is reserved", item);
            return Err(BufferError::ReservedValue);
        }

        self.empty_slots.pend();
        let mut store = self.store.lock();
        match store.put(item) {
            Ok(occupancy) => {
                self.sink
                    .info("produced item; occupancy", item, occupancy as i32);
                drop(store);
                self.full_slots.post();
                Ok(occupancy)
            }
            Err(err) => {
                self.sink.error("insert: could not insert item", item);
                drop(store);
                self.empty_slots.post();
                Err(err)
            }
        }
    }

    /// Remove the oldest item, blocking while the buffer is empty.
    ///
    /// Returns the item and the occupancy after the remove. On a
    /// consistency failure the item permit is handed back and the buffer
    /// is untouched.
    pub fn remove(&self) -> Result<(Item, usize), BufferError> {
        self.full_slots.pend();
        let mut store = self.store.lock();
        match store.take() {
            Ok((item, occupancy)) => {
                self.sink
                    .info("consumed item; occupancy", item, occupancy as i32);
                drop(store);
                self.empty_slots.post();
                Ok((item, occupancy))
            }
            Err(err) => {
                let index = store.read_cursor() as i32;
                self.sink.error("remove: no item at slot", index);
                drop(store);
                self.full_slots.post();
                Err(err)
            }
        }
    }

    /// Free-slot permits currently available.
    pub fn empty_permits(&self) -> u32 {
        self.empty_slots.count()
    }

    /// Item permits currently available.
    pub fn full_permits(&self) -> u32 {
        self.full_slots.count()
    }

    /// Current occupancy, read under the buffer mutex.
    pub fn occupancy(&self) -> usize {
        self.store.lock().occupancy()
    }

    /// Copy of the slot store, taken under the buffer mutex.
    pub fn snapshot(&self) -> SlotStore<N> {
        self.store.lock().clone()
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut SlotStore<N> {
        self.store.get_mut()
    }

    /// Hand out an item permit with no item behind it.
    #[cfg(test)]
    pub(crate) fn grant_item_permit(&self) {
        self.full_slots.post();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::{Record, RecordingSink};
    use crate::sync::StdSemaphore;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use std::vec::Vec;

    type TestBuffer<const N: usize> = BoundedBuffer<StdSemaphore, RecordingSink, N>;

    #[test]
    fn test_store_initial_state() {
        let store = SlotStore::<4>::new();
        assert_eq!(store.occupancy(), 0);
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.slots(), &[EMPTY_SLOT; 4]);
        assert_eq!((store.write_cursor(), store.read_cursor()), (0, 0));
    }

    #[test]
    fn test_put_then_take_restores_empty() {
        let mut store = SlotStore::<1>::new();
        assert_eq!(store.put(42), Ok(1));
        assert_eq!(store.take(), Ok((42, 0)));
        assert_eq!(store.slots(), &[EMPTY_SLOT]);
        assert_eq!(store.occupied_slots(), 0);
        // Capacity 1: both cursors wrap back to 0
        assert_eq!((store.write_cursor(), store.read_cursor()), (0, 0));
    }

    #[test]
    fn test_cursors_wrap() {
        let mut store = SlotStore::<3>::new();
        for round in 0..4 {
            store.put(round).unwrap();
            store.put(round + 100).unwrap();
            assert_eq!(store.take().unwrap().0, round);
            assert_eq!(store.take().unwrap().0, round + 100);
        }
        assert_eq!(store.write_cursor(), 8 % 3);
        assert_eq!(store.read_cursor(), 8 % 3);
    }

    #[test]
    fn test_put_into_occupied_slot_fails() {
        let mut store = SlotStore::<2>::new();
        store.slots[0] = 5;
        let before = store.clone();
        assert_eq!(
            store.put(9),
            Err(BufferError::SlotOccupied { index: 0, item: 9 })
        );
        assert_eq!(store.slots(), before.slots());
        assert_eq!(store.occupancy(), 0);
        assert_eq!(store.write_cursor(), 0);
    }

    #[test]
    fn test_take_from_empty_slot_fails() {
        let mut store = SlotStore::<2>::new();
        assert_eq!(store.take(), Err(BufferError::SlotEmpty { index: 0 }));
        assert_eq!(store.read_cursor(), 0);
    }

    #[test]
    fn test_sentinel_rejected() {
        let mut store = SlotStore::<2>::new();
        assert_eq!(store.put(EMPTY_SLOT), Err(BufferError::ReservedValue));

        let buffer: TestBuffer<2> = BoundedBuffer::new(RecordingSink::default());
        assert_eq!(buffer.insert(EMPTY_SLOT), Err(BufferError::ReservedValue));
        assert_eq!(buffer.empty_permits(), 2);
        assert_eq!(buffer.full_permits(), 0);
    }

    #[test]
    fn test_fifo_with_occupancy_trace() {
        let buffer: TestBuffer<10> = BoundedBuffer::new(RecordingSink::default());
        let mut trace = Vec::new();

        for v in [3, 7, 1] {
            trace.push(buffer.insert(v).unwrap());
        }
        let mut out = Vec::new();
        for _ in 0..3 {
            let (item, occupancy) = buffer.remove().unwrap();
            out.push(item);
            trace.push(occupancy);
        }

        assert_eq!(out, [3, 7, 1]);
        assert_eq!(trace, [1, 2, 3, 2, 1, 0]);
        assert_eq!(buffer.sink().errors(), 0);
        assert_eq!(
            buffer.sink().records()[0],
            Record::Info("produced item; occupancy", 3, 1)
        );
    }

    #[test]
    fn test_permits_track_occupancy() {
        let buffer: TestBuffer<3> = BoundedBuffer::new(RecordingSink::default());
        buffer.insert(1).unwrap();
        buffer.insert(2).unwrap();
        assert_eq!(buffer.empty_permits(), 1);
        assert_eq!(buffer.full_permits(), 2);
        buffer.remove().unwrap();
        assert_eq!(buffer.empty_permits(), 2);
        assert_eq!(buffer.full_permits(), 1);
    }

    #[test]
    fn test_corrupted_slot_rolls_back_permit() {
        let mut buffer: TestBuffer<4> = BoundedBuffer::new(RecordingSink::default());
        buffer.store_mut().corrupt_slot(0, 8);
        let permits = buffer.empty_permits();

        let result = buffer.insert(2);

        assert_eq!(result, Err(BufferError::SlotOccupied { index: 0, item: 2 }));
        assert_eq!(buffer.occupancy(), 0);
        assert_eq!(buffer.empty_permits(), permits);
        assert_eq!(buffer.full_permits(), 0);
        assert_eq!(buffer.snapshot().slots()[0], 8);
        assert_eq!(
            buffer.sink().records(),
            [Record::Error("insert: could not insert item", 2)]
        );
    }

    #[test]
    fn test_remove_from_desynchronized_buffer_rolls_back() {
        let buffer: TestBuffer<4> = BoundedBuffer::new(RecordingSink::default());
        // An item permit with no matching item
        buffer.full_slots.post();

        assert_eq!(buffer.remove(), Err(BufferError::SlotEmpty { index: 0 }));
        assert_eq!(buffer.full_permits(), 1);
        assert_eq!(buffer.empty_permits(), 4);
        assert_eq!(buffer.sink().errors(), 1);
    }

    #[test]
    fn test_insert_blocks_when_full() {
        let buffer: TestBuffer<2> = BoundedBuffer::new(RecordingSink::default());
        buffer.insert(5).unwrap();
        buffer.insert(9).unwrap();
        let inserted = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                buffer.insert(4).unwrap();
                inserted.store(true, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(50));
            assert!(!inserted.load(Ordering::SeqCst));
            assert_eq!(buffer.remove().unwrap().0, 5);
        });

        assert!(inserted.load(Ordering::SeqCst));
        assert_eq!(buffer.remove().unwrap().0, 9);
        assert_eq!(buffer.remove().unwrap().0, 4);
        assert_eq!(buffer.occupancy(), 0);
    }

    #[test]
    fn test_concurrent_producers_consumers_preserve_items() {
        const PER_PRODUCER: i32 = 200;
        let buffer: TestBuffer<4> = BoundedBuffer::new(RecordingSink::default());
        let consumed: SemMutex<StdSemaphore, Vec<Item>> = SemMutex::new(Vec::new());

        thread::scope(|s| {
            for p in 0..2 {
                let buffer = &buffer;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        buffer.insert(p * 1000 + i).unwrap();
                    }
                });
            }
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..PER_PRODUCER {
                        let (item, _) = buffer.remove().unwrap();
                        consumed.lock().push(item);
                    }
                });
            }
        });

        let mut items = consumed.lock().clone();
        items.sort_unstable();
        let mut expected: Vec<Item> = (0..PER_PRODUCER)
            .chain(1000..1000 + PER_PRODUCER)
            .collect();
        expected.sort_unstable();
        assert_eq!(items, expected);
        assert_eq!(buffer.occupancy(), 0);
        assert_eq!(buffer.sink().errors(), 0);
    }

    proptest! {
        #[test]
        fn prop_occupancy_matches_slots_and_fifo(
            ops in proptest::collection::vec(prop_oneof![
                (0..1000i32).prop_map(Some),
                Just(None),
            ], 0..200)
        ) {
            let mut store = SlotStore::<5>::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    // Only insert when a free-slot permit would be available
                    Some(v) if model.len() < 5 => {
                        prop_assert_eq!(store.put(v), Ok(model.len() + 1));
                        model.push_back(v);
                    }
                    // Only remove when an item permit would be available
                    None if !model.is_empty() => {
                        let expected = model.pop_front().unwrap();
                        prop_assert_eq!(store.take(), Ok((expected, model.len())));
                    }
                    _ => {}
                }
                prop_assert_eq!(store.occupancy(), store.occupied_slots());
                prop_assert!(store.occupancy() <= store.capacity());
            }
        }
    }
}
