//! # Producer / Consumer Drivers
//!
//! Each worker unit loops forever on one buffer operation followed by one
//! mailbox publish:
//!
//! ```text
//! producer:  next item ─► buffer.insert ─┬─ ok  ─► publish(A, item)
//!                                        └─ err ─► diagnostic, restart
//! consumer:  buffer.remove ──────────────┬─ ok  ─► publish(B, item)
//!                                        └─ err ─► diagnostic, restart
//! ```
//!
//! A failed iteration is not retried: the next iteration starts from
//! scratch with fresh semaphore acquisition. Workers only reach the
//! doorbell and the mailbox mutex through [`Mailbox::publish`].

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::buffer::{BoundedBuffer, Item};
use crate::config::{MAX_ITEM_VALUE, MIN_ITEM_VALUE};
use crate::diag::DiagnosticSink;
use crate::error::BufferError;
use crate::mailbox::{ActuationRequest, Channel, Mailbox};
use crate::sync::Semaphore;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The buffer and mailbox every unit works against.
///
/// Created once before any unit runs and never dropped while they do.
pub struct Shared<S, D, const N: usize> {
    pub buffer: BoundedBuffer<S, D, N>,
    pub mailbox: Mailbox<S>,
}

impl<S: Semaphore, D: DiagnosticSink, const N: usize> Shared<S, D, N> {
    pub fn new(sink: D) -> Self {
        Self {
            buffer: BoundedBuffer::new(sink),
            mailbox: Mailbox::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Item sources
// ---------------------------------------------------------------------------

/// Synthetic workload feeding a producer.
pub trait ItemSource {
    fn next_item(&mut self) -> Item;
}

/// Uniform values in `MIN_ITEM_VALUE..=MAX_ITEM_VALUE`.
pub struct RandomItems {
    rng: SmallRng,
}

impl RandomItems {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl ItemSource for RandomItems {
    fn next_item(&mut self) -> Item {
        self.rng.gen_range(MIN_ITEM_VALUE..=MAX_ITEM_VALUE)
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Producer unit: inserts generated items and requests channel A bursts.
pub struct Producer<'a, S, D, G, const N: usize> {
    id: u32,
    shared: &'a Shared<S, D, N>,
    source: G,
}

impl<'a, S, D, G, const N: usize> Producer<'a, S, D, G, N>
where
    S: Semaphore,
    D: DiagnosticSink,
    G: ItemSource,
{
    /// `id` is an opaque identity used only in diagnostics.
    pub fn new(id: u32, shared: &'a Shared<S, D, N>, source: G) -> Self {
        Self { id, shared, source }
    }

    /// One loop iteration. Returns the item that was inserted.
    pub fn step(&mut self) -> Result<Item, BufferError> {
        let item = self.source.next_item();
        let sink = self.shared.buffer.sink();
        if let Err(err) = self.shared.buffer.insert(item) {
            sink.error("producer: could not insert item; producer id", self.id as i32);
            return Err(err);
        }
        sink.info("producer id; produced item", self.id as i32, item);
        self.shared
            .mailbox
            .publish(ActuationRequest::for_item(Channel::A, item));
        Ok(item)
    }

    pub fn run(&mut self) -> ! {
        loop {
            let _ = self.step();
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Consumer unit: removes items and requests channel B bursts.
pub struct Consumer<'a, S, D, const N: usize> {
    id: u32,
    shared: &'a Shared<S, D, N>,
}

impl<'a, S, D, const N: usize> Consumer<'a, S, D, N>
where
    S: Semaphore,
    D: DiagnosticSink,
{
    pub fn new(id: u32, shared: &'a Shared<S, D, N>) -> Self {
        Self { id, shared }
    }

    /// One loop iteration. Returns the item that was removed.
    pub fn step(&mut self) -> Result<Item, BufferError> {
        let sink = self.shared.buffer.sink();
        let item = match self.shared.buffer.remove() {
            Ok((item, _)) => item,
            Err(err) => {
                sink.error("consumer: could not remove item; consumer id", self.id as i32);
                return Err(err);
            }
        };
        sink.info("consumer id; consumed item", self.id as i32, item);
        self.shared
            .mailbox
            .publish(ActuationRequest::for_item(Channel::B, item));
        Ok(item)
    }

    pub fn run(&mut self) -> ! {
        loop {
            let _ = self.step();
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::SpinDelay;
    use crate::diag::testing::{Record, RecordingSink};
    use crate::service::{Actuator, ServiceUnit};
    use crate::sync::StdSemaphore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::vec::Vec;

    type TestShared<const N: usize> = Shared<StdSemaphore, RecordingSink, N>;

    /// Replays a fixed item sequence, wrapping around at the end.
    struct FixedItems {
        items: &'static [Item],
        next: usize,
    }

    impl FixedItems {
        fn new(items: &'static [Item]) -> Self {
            Self { items, next: 0 }
        }
    }

    impl ItemSource for FixedItems {
        fn next_item(&mut self) -> Item {
            let item = self.items[self.next % self.items.len()];
            self.next += 1;
            item
        }
    }

    #[test]
    fn test_random_items_in_range() {
        let mut source = RandomItems::new(7);
        for _ in 0..1000 {
            let v = source.next_item();
            assert!((MIN_ITEM_VALUE..=MAX_ITEM_VALUE).contains(&v));
        }
    }

    #[test]
    fn test_producer_then_consumer_scenario() {
        let shared: TestShared<10> = Shared::new(RecordingSink::default());
        let mut producer = Producer::new(1, &shared, FixedItems::new(&[3, 7, 1]));
        let mut consumer = Consumer::new(2, &shared);

        let produced: Vec<Item> = (0..3).map(|_| producer.step().unwrap()).collect();
        assert_eq!(shared.mailbox.peek(), Some(ActuationRequest::new(Channel::A, 1)));
        let consumed: Vec<Item> = (0..3).map(|_| consumer.step().unwrap()).collect();

        assert_eq!(produced, [3, 7, 1]);
        assert_eq!(consumed, [3, 7, 1]);
        assert_eq!(shared.mailbox.peek(), Some(ActuationRequest::new(Channel::B, 1)));

        let sink = shared.buffer.sink();
        assert_eq!(sink.errors(), 0);
        let occupancy: Vec<i32> = sink
            .records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Info(t, _, occ) if t.ends_with("occupancy") => Some(occ),
                _ => None,
            })
            .collect();
        assert_eq!(occupancy, [1, 2, 3, 2, 1, 0]);
        assert!(sink
            .records()
            .contains(&Record::Info("producer id; produced item", 1, 7)));
    }

    #[test]
    fn test_producer_failure_reports_id_and_skips_publish() {
        let mut shared: TestShared<2> = Shared::new(RecordingSink::default());
        // Slot under the write cursor holds an item no permit accounts for
        shared.buffer.store_mut().corrupt_slot(0, 6);
        let mut producer = Producer::new(5, &shared, FixedItems::new(&[2]));

        assert!(producer.step().is_err());
        assert_eq!(shared.mailbox.peek(), None);
        assert_eq!(shared.mailbox.doorbell_count(), 0);
        assert!(shared
            .buffer
            .sink()
            .records()
            .contains(&Record::Error("producer: could not insert item; producer id", 5)));
        assert_eq!(shared.buffer.empty_permits(), 2);
    }

    #[test]
    fn test_consumer_failure_reports_id_and_skips_publish() {
        let shared: TestShared<2> = Shared::new(RecordingSink::default());
        // An item permit with no item in the slot under the read cursor
        shared.buffer.grant_item_permit();
        let mut consumer = Consumer::new(4, &shared);

        assert_eq!(consumer.step(), Err(BufferError::SlotEmpty { index: 0 }));
        assert_eq!(shared.mailbox.peek(), None);
        assert_eq!(shared.mailbox.doorbell_count(), 0);
        assert!(shared
            .buffer
            .sink()
            .records()
            .contains(&Record::Error("consumer: could not remove item; consumer id", 4)));
        assert_eq!(shared.buffer.full_permits(), 1);
        assert_eq!(shared.buffer.empty_permits(), 2);
    }

    #[test]
    fn test_fixed_items_wraps_around() {
        let mut source = FixedItems::new(&[3, 7]);
        let items: Vec<Item> = (0..5).map(|_| source.next_item()).collect();
        assert_eq!(items, [3, 7, 3, 7, 3]);
    }

    #[derive(Default)]
    struct CountingActuator {
        a: u32,
        b: u32,
    }

    impl Actuator for CountingActuator {
        fn toggle(&mut self, channel: Channel) {
            match channel {
                Channel::A => self.a += 1,
                Channel::B => self.b += 1,
            }
        }
    }

    #[test]
    fn test_end_to_end_with_service_unit() {
        const ITEMS: usize = 50;
        let shared: TestShared<3> = Shared::new(RecordingSink::default());
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            let mut service = ServiceUnit::new(
                shared.mailbox.receiver().unwrap(),
                CountingActuator::default(),
                SpinDelay::new(10),
            );
            let done = &done;
            let service = s.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    if let Some(req) = service.step() {
                        assert!(req.repeat_count as i32 <= MAX_ITEM_VALUE);
                    }
                }
                service.bursts()
            });

            let workers: Vec<_> = (0..2)
                .map(|id| {
                    let shared = &shared;
                    s.spawn(move || {
                        let mut p = Producer::new(id, shared, RandomItems::new(id as u64));
                        for _ in 0..ITEMS {
                            p.step().unwrap();
                        }
                    })
                })
                .chain((0..2).map(|id| {
                    let shared = &shared;
                    s.spawn(move || {
                        let mut c = Consumer::new(10 + id, shared);
                        for _ in 0..ITEMS {
                            c.step().unwrap();
                        }
                    })
                }))
                .collect();
            for w in workers {
                w.join().unwrap();
            }

            done.store(true, Ordering::SeqCst);
            // Release the service unit if it is parked on the doorbell
            shared
                .mailbox
                .publish(ActuationRequest::new(Channel::A, 0));
            let bursts = service.join().unwrap();
            assert!(bursts >= 1);
        });

        assert_eq!(shared.buffer.occupancy(), 0);
        assert_eq!(shared.buffer.sink().errors(), 0);
        assert!(shared.mailbox.doorbell_count() <= 1);
    }
}
