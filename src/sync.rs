//! # Synchronization Primitives
//!
//! The engine consumes three things from the runtime it runs on:
//!
//! - counting semaphores (`Semaphore`)
//! - a mutual-exclusion primitive, built here as [`SemMutex`] on top of a
//!   binary semaphore so the protected data is only reachable through a
//!   guard
//! - interrupt-safe critical sections for the kernel's own bookkeeping
//!
//! On the target, `kernel::KernelSemaphore` blocks tasks in the scheduler.
//! On a host (tests, `std` feature), [`StdSemaphore`] blocks OS threads.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use cortex_m::interrupt;

/// Execute a closure within a critical section (interrupts disabled).
///
/// This is the mechanism for accessing the kernel's shared mutable state.
/// Interrupts are disabled on entry and restored on exit, ensuring
/// atomicity of the enclosed operation. Target only: on a host the
/// underlying `cpsid` is unavailable.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

// ---------------------------------------------------------------------------
// Counting semaphore seam
// ---------------------------------------------------------------------------

/// Counting semaphore supplied by the runtime.
///
/// All waits are indefinite: `pend` returns only once a permit has been
/// taken. `post` saturates at the ceiling given to `new`, which is how a
/// binary doorbell is expressed (`ceiling == 1`).
pub trait Semaphore: Sync {
    /// Create a semaphore holding `initial` permits, never more than
    /// `ceiling`.
    fn new(initial: u32, ceiling: u32) -> Self
    where
        Self: Sized;

    /// Take one permit, blocking the caller until one is available.
    fn pend(&self);

    /// Take one permit if available, without blocking.
    fn try_pend(&self) -> bool;

    /// Return one permit and release a waiter, if any.
    fn post(&self);

    /// Permits currently available.
    fn count(&self) -> u32;
}

// ---------------------------------------------------------------------------
// Semaphore-backed mutex
// ---------------------------------------------------------------------------

/// Mutex built from a binary semaphore.
///
/// Mirrors the RTOS idiom of a semaphore with initial count 1 guarding
/// shared data, but the data lives inside the mutex and is reachable only
/// through a [`SemMutexGuard`]. The permit is returned when the guard is
/// dropped.
pub struct SemMutex<S, T> {
    sem: S,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `sem`, which admits one
// holder at a time.
unsafe impl<S: Semaphore, T: Send> Sync for SemMutex<S, T> {}

impl<S: Semaphore, T> SemMutex<S, T> {
    pub fn new(data: T) -> Self {
        Self {
            sem: S::new(1, 1),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the mutex, blocking until it is free.
    pub fn lock(&self) -> SemMutexGuard<'_, S, T> {
        self.sem.pend();
        SemMutexGuard { mutex: self }
    }

    /// True while some holder owns the mutex.
    pub fn is_locked(&self) -> bool {
        self.sem.count() == 0
    }

    /// Mutable access without locking; the borrow proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Exclusive handle on the data of a [`SemMutex`].
pub struct SemMutexGuard<'a, S: Semaphore, T> {
    mutex: &'a SemMutex<S, T>,
}

impl<S: Semaphore, T> Deref for SemMutexGuard<'_, S, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard holds the mutex permit.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<S: Semaphore, T> DerefMut for SemMutexGuard<'_, S, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds the mutex permit.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<S: Semaphore, T> Drop for SemMutexGuard<'_, S, T> {
    fn drop(&mut self) {
        self.mutex.sem.post();
    }
}

// ---------------------------------------------------------------------------
// Host backend
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "std"))]
pub use host::StdSemaphore;

#[cfg(any(test, feature = "std"))]
mod host {
    use super::Semaphore;
    use std::sync::{Condvar, Mutex, PoisonError};

    /// Semaphore blocking OS threads, for running the engine on a host.
    pub struct StdSemaphore {
        count: Mutex<u32>,
        ceiling: u32,
        available: Condvar,
    }

    impl Semaphore for StdSemaphore {
        fn new(initial: u32, ceiling: u32) -> Self {
            Self {
                count: Mutex::new(initial.min(ceiling)),
                ceiling,
                available: Condvar::new(),
            }
        }

        fn pend(&self) {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            while *count == 0 {
                count = self
                    .available
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *count -= 1;
        }

        fn try_pend(&self) -> bool {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        }

        fn post(&self) {
            let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
            if *count < self.ceiling {
                *count += 1;
            }
            self.available.notify_one();
        }

        fn count(&self) -> u32 {
            *self.count.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_post_saturates_at_ceiling() {
        let sem = StdSemaphore::new(0, 1);
        sem.post();
        sem.post();
        assert_eq!(sem.count(), 1);
        assert!(sem.try_pend());
        assert!(!sem.try_pend());
    }

    #[test]
    fn test_initial_count_clamped() {
        let sem = StdSemaphore::new(5, 3);
        assert_eq!(sem.count(), 3);
    }

    #[test]
    fn test_pend_blocks_until_post() {
        let sem = StdSemaphore::new(0, 4);
        let taken = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                sem.pend();
                taken.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!taken.load(Ordering::SeqCst));
            sem.post();
        });

        assert!(taken.load(Ordering::SeqCst));
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_mutex_guard_releases_on_drop() {
        let mutex: SemMutex<StdSemaphore, u32> = SemMutex::new(7);
        {
            let mut guard = mutex.lock();
            assert!(mutex.is_locked());
            *guard += 1;
        }
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.lock(), 8);
    }

    #[test]
    fn test_mutex_serializes_threads() {
        let mutex: SemMutex<StdSemaphore, u64> = SemMutex::new(0);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let mut guard = mutex.lock();
                        let v = *guard;
                        thread::yield_now();
                        *guard = v + 1;
                    }
                });
            }
        });

        assert_eq!(*mutex.lock(), 4000);
    }
}
