//! # Service Unit
//!
//! The highest-priority task. It sleeps on the mailbox doorbell and, once
//! rung, runs an actuation burst to completion without yielding.
//!
//! ```text
//!   ┌──────────┐   doorbell acquired   ┌────────────┐
//!   │ Waiting  │ ────────────────────► │ Actuating  │
//!   └──────────┘                       └────────────┘
//!        ▲           burst complete          │
//!        └───────────────────────────────────┘
//! ```
//!
//! A burst for `repeat_count` is `2 × repeat_count` toggles of the
//! selected channel, each followed by one [`NonSuspendingDelay`] pause.

use crate::delay::NonSuspendingDelay;
use crate::mailbox::{ActuationRequest, Channel, Receiver};
use crate::sync::Semaphore;

/// Physical output driven by the service unit.
pub trait Actuator {
    /// Invert the output of `channel`.
    fn toggle(&mut self, channel: Channel);
}

/// Service unit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Blocked on the doorbell.
    Waiting,
    /// Running a burst; never suspends in this state.
    Actuating,
}

/// Doorbell-driven actuation loop.
pub struct ServiceUnit<'a, S, A, W> {
    receiver: Receiver<'a, S>,
    actuator: A,
    delay: W,
    state: ServiceState,
    bursts: u32,
}

impl<'a, S, A, W> ServiceUnit<'a, S, A, W>
where
    S: Semaphore,
    A: Actuator,
    W: NonSuspendingDelay,
{
    pub fn new(receiver: Receiver<'a, S>, actuator: A, delay: W) -> Self {
        Self {
            receiver,
            actuator,
            delay,
            state: ServiceState::Waiting,
            bursts: 0,
        }
    }

    /// One Waiting → Actuating → Waiting round.
    ///
    /// Blocks on the doorbell, then performs the burst for the pending
    /// request. Returns the request that was served, or `None` for a ring
    /// with an empty mailbox.
    pub fn step(&mut self) -> Option<ActuationRequest> {
        self.state = ServiceState::Waiting;
        let request = self.receiver.wait();
        match request {
            Some(req) => self.actuate(req),
            None => log::warn!(target: "pcsync", "doorbell rang with an empty mailbox"),
        }
        request
    }

    /// Serve requests forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// Run the burst for `request` to completion.
    pub fn actuate(&mut self, request: ActuationRequest) {
        self.state = ServiceState::Actuating;
        for _ in 0..request.toggles() {
            self.actuator.toggle(request.channel);
            self.delay.pause();
        }
        self.bursts = self.bursts.wrapping_add(1);
        self.state = ServiceState::Waiting;
    }

    #[inline]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Bursts completed so far.
    #[inline]
    pub fn bursts(&self) -> u32 {
        self.bursts
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
