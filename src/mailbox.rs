//! # Notification Mailbox
//!
//! Single-slot, overwrite-on-publish channel from the producer/consumer
//! units to the service unit, paired with a binary doorbell.
//!
//! ## Publish protocol
//!
//! ```text
//! publisher                          service unit
//! ─────────                          ────────────
//! lock mailbox mutex
//! pending ← request
//! post doorbell (saturates at 1) ──► pend doorbell
//! unlock mailbox mutex               read pending (no lock)
//! ```
//!
//! Write and ring form one critical section: a publisher preempted after
//! writing `pending` but before ringing cannot have its request
//! overwritten by another publisher.
//!
//! The request lives in a single `AtomicU32`, so the unlocked read on the
//! service side always sees a whole request, never half of two. Only one
//! reader may exist; [`Mailbox::receiver`] hands out the read end once.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::buffer::Item;
use crate::sync::{SemMutex, Semaphore};

/// Actuator output a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Driven by producers (green LED on the reference board).
    A,
    /// Driven by consumers (red LED on the reference board).
    B,
}

/// Work order handed to the service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActuationRequest {
    pub channel: Channel,
    /// Number of on/off cycles; the actuator toggles twice per cycle.
    pub repeat_count: u16,
}

// Packed layout: bit 31 = present, bit 16 = channel, bits 0..16 = count.
const PRESENT: u32 = 1 << 31;
const CHANNEL_B: u32 = 1 << 16;
const COUNT_MASK: u32 = 0xFFFF;

impl ActuationRequest {
    pub const fn new(channel: Channel, repeat_count: u16) -> Self {
        Self {
            channel,
            repeat_count,
        }
    }

    /// Request for a buffer item. Negative items map to 0 cycles, values
    /// beyond `u16::MAX` saturate.
    pub fn for_item(channel: Channel, item: Item) -> Self {
        let repeat_count = u16::try_from(item.max(0)).unwrap_or(u16::MAX);
        Self::new(channel, repeat_count)
    }

    /// Number of raw output toggles this request produces.
    #[inline]
    pub fn toggles(&self) -> u32 {
        u32::from(self.repeat_count) * 2
    }

    fn pack(self) -> u32 {
        let channel = match self.channel {
            Channel::A => 0,
            Channel::B => CHANNEL_B,
        };
        PRESENT | channel | u32::from(self.repeat_count)
    }

    fn unpack(raw: u32) -> Option<Self> {
        if raw & PRESENT == 0 {
            return None;
        }
        let channel = if raw & CHANNEL_B != 0 {
            Channel::B
        } else {
            Channel::A
        };
        Some(Self::new(channel, (raw & COUNT_MASK) as u16))
    }
}

/// Overwrite-on-publish mailbox with its doorbell.
pub struct Mailbox<S> {
    pending: AtomicU32,
    lock: SemMutex<S, ()>,
    doorbell: S,
    claimed: AtomicBool,
}

impl<S: Semaphore> Mailbox<S> {
    /// Empty mailbox, doorbell silent.
    pub fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            lock: SemMutex::new(()),
            doorbell: S::new(0, 1),
            claimed: AtomicBool::new(false),
        }
    }

    /// Overwrite the pending request and ring the doorbell. Never fails.
    ///
    /// Blocks only while another publisher holds the mailbox mutex.
    pub fn publish(&self, request: ActuationRequest) {
        let _guard = self.lock.lock();
        self.pending.store(request.pack(), Ordering::Release);
        self.doorbell.post();
    }

    /// Claim the read end. Returns `None` once it has been handed out.
    pub fn receiver(&self) -> Option<Receiver<'_, S>> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Receiver { mailbox: self })
    }

    /// Request currently in the slot, if any was ever published.
    pub fn peek(&self) -> Option<ActuationRequest> {
        ActuationRequest::unpack(self.pending.load(Ordering::Acquire))
    }

    /// Doorbell permits outstanding: 0 or 1.
    pub fn doorbell_count(&self) -> u32 {
        self.doorbell.count()
    }
}

impl<S: Semaphore> Default for Mailbox<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique read end of a [`Mailbox`], held by the service unit.
pub struct Receiver<'a, S> {
    mailbox: &'a Mailbox<S>,
}

impl<S: Semaphore> Receiver<'_, S> {
    /// Wait for the doorbell, then read the pending request.
    ///
    /// `None` means the doorbell rang with nothing published, which only
    /// a foreign `post` on the doorbell can cause.
    pub fn wait(&mut self) -> Option<ActuationRequest> {
        self.mailbox.doorbell.pend();
        self.mailbox.peek()
    }

    /// Non-blocking variant of [`wait`](Self::wait).
    pub fn try_wait(&mut self) -> Option<ActuationRequest> {
        if self.mailbox.doorbell.try_pend() {
            self.mailbox.peek()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::StdSemaphore;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_pack_roundtrip_edges() {
        for req in [
            ActuationRequest::new(Channel::A, 0),
            ActuationRequest::new(Channel::B, u16::MAX),
        ] {
            assert_eq!(ActuationRequest::unpack(req.pack()), Some(req));
        }
        assert_eq!(ActuationRequest::unpack(0), None);
    }

    #[test]
    fn test_request_for_item() {
        assert_eq!(ActuationRequest::for_item(Channel::A, 7).repeat_count, 7);
        assert_eq!(ActuationRequest::for_item(Channel::B, -3).repeat_count, 0);
        assert_eq!(
            ActuationRequest::for_item(Channel::B, 1 << 20).repeat_count,
            u16::MAX
        );
        assert_eq!(ActuationRequest::new(Channel::A, 4).toggles(), 8);
    }

    #[test]
    fn test_publish_rings_doorbell() {
        let mailbox: Mailbox<StdSemaphore> = Mailbox::new();
        let mut rx = mailbox.receiver().unwrap();
        assert_eq!(rx.try_wait(), None);

        mailbox.publish(ActuationRequest::new(Channel::A, 3));
        assert_eq!(mailbox.doorbell_count(), 1);
        assert_eq!(rx.wait(), Some(ActuationRequest::new(Channel::A, 3)));
        assert_eq!(mailbox.doorbell_count(), 0);
    }

    #[test]
    fn test_back_to_back_publish_last_writer_wins() {
        let mailbox: Mailbox<StdSemaphore> = Mailbox::new();
        let mut rx = mailbox.receiver().unwrap();

        mailbox.publish(ActuationRequest::new(Channel::A, 3));
        mailbox.publish(ActuationRequest::new(Channel::B, 9));

        // Binary doorbell: one ring for the unconsumed pair
        assert_eq!(mailbox.doorbell_count(), 1);
        assert_eq!(rx.wait(), Some(ActuationRequest::new(Channel::B, 9)));
        assert_eq!(rx.try_wait(), None);
    }

    #[test]
    fn test_single_receiver() {
        let mailbox: Mailbox<StdSemaphore> = Mailbox::new();
        let first = mailbox.receiver();
        assert!(first.is_some());
        assert!(mailbox.receiver().is_none());
    }

    #[test]
    fn test_concurrent_publishers_never_tear() {
        const ROUNDS: usize = 500;
        let mailbox: Mailbox<StdSemaphore> = Mailbox::new();
        let mut rx = mailbox.receiver().unwrap();
        let published = AtomicUsize::new(0);
        let a = ActuationRequest::new(Channel::A, 3);
        let b = ActuationRequest::new(Channel::B, 7);

        thread::scope(|s| {
            for req in [a, b] {
                let mailbox = &mailbox;
                let published = &published;
                s.spawn(move || {
                    for _ in 0..ROUNDS {
                        mailbox.publish(req);
                        assert!(mailbox.doorbell_count() <= 1);
                        published.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }

            let mut rings = 0;
            while published.load(std::sync::atomic::Ordering::SeqCst) < 2 * ROUNDS {
                if let Some(req) = rx.try_wait() {
                    assert!(req == a || req == b);
                    rings += 1;
                }
            }
            assert!(rings <= 2 * ROUNDS);
        });

        assert!(mailbox.doorbell_count() <= 1);
    }
}
