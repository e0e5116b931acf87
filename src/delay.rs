//! # Non-Suspending Delay
//!
//! The service unit is the highest-priority task. If it suspended between
//! two toggles, the scheduler would run producers and consumers, which
//! would republish the mailbox in the middle of a burst. The pause
//! between toggles therefore burns CPU cycles and never enters the
//! scheduler. A sleeping delay must not implement [`NonSuspendingDelay`].

/// Fixed-length pause that keeps the CPU busy and never yields.
pub trait NonSuspendingDelay {
    fn pause(&mut self);
}

/// Busy-wait for a fixed number of core cycles (`cortex_m::asm::delay`).
#[cfg(target_arch = "arm")]
#[derive(Debug, Clone, Copy)]
pub struct CycleDelay {
    cycles: u32,
}

#[cfg(target_arch = "arm")]
impl CycleDelay {
    pub const fn new(cycles: u32) -> Self {
        Self { cycles }
    }
}

#[cfg(target_arch = "arm")]
impl NonSuspendingDelay for CycleDelay {
    #[inline]
    fn pause(&mut self) {
        cortex_m::asm::delay(self.cycles);
    }
}

/// Portable busy-wait: spins `iterations` times on `spin_loop`.
#[derive(Debug, Clone, Copy)]
pub struct SpinDelay {
    iterations: u32,
}

impl SpinDelay {
    pub const fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl NonSuspendingDelay for SpinDelay {
    fn pause(&mut self) {
        for _ in 0..self.iterations {
            core::hint::spin_loop();
        }
    }
}
