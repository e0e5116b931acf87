//! # Kernel
//!
//! Top-level kernel initialization and public API.
//!
//! The kernel owns the global scheduler instance, registers tasks, starts
//! the time-sharing clock and provides [`KernelSemaphore`], the blocking
//! counting semaphore the engine runs on. All public functions use
//! critical sections to stay interrupt safe.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Reset scheduler, create idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Set interrupt priorities
//!               ├─► Pick the first task
//!               ├─► Configure SysTick
//!               └─► Start first task via arch::start_first_task()
//! ```

use core::cell::Cell;
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::interrupt::Mutex;
use cortex_m::peripheral::SYST;

use crate::arch::cortex_m4;
use crate::config::IDLE_PRIORITY;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::sync::{self, Semaphore};
use crate::task::{TaskEntry, WaitId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Accessed via `SCHEDULER_PTR` which is set during `init()`.
/// All access is through critical sections or from ISR context
/// (where interrupts are already serialized by priority).
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler. Used by the arch layer
/// (PendSV, SysTick handlers) which cannot easily use references.
///
/// # Safety
/// Set once during `init()`, read from ISR context.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

/// Set once the first task runs. Before that PSP holds no task context,
/// so nothing may pend a PendSV.
static STARTED: AtomicBool = AtomicBool::new(false);

/// Access the global scheduler.
///
/// # Safety
/// Caller must hold a critical section or run in PendSV/SysTick context.
#[inline]
pub(crate) unsafe fn scheduler() -> &'static mut Scheduler {
    &mut *SCHEDULER_PTR
}

/// Pend a context switch if the scheduler asked for one.
#[inline]
fn switch_if_needed(needed: bool) {
    if needed && STARTED.load(Ordering::Acquire) {
        cortex_m4::trigger_pendsv();
    }
}

extern "C" fn idle_task(_arg: usize) -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel and create the idle task at index 0.
///
/// Must be called exactly once, from the main thread, before any other
/// kernel function.
pub fn init() -> Result<usize, KernelError> {
    unsafe {
        SCHEDULER_PTR = addr_of_mut!(SCHEDULER);
    }
    create_task(idle_task, IDLE_PRIORITY, 0)
}

/// Create a new task and register it with the scheduler.
///
/// # Parameters
/// - `entry`: Task entry function, receives `arg` and never returns.
/// - `priority`: Fixed priority, higher runs first.
/// - `arg`: Opaque argument (the workers use it as their id).
///
/// # Returns
/// - `Ok(task_id)`: The task's index in the scheduler array.
/// - `Err(KernelError::TaskTableFull)`: `MAX_TASKS` reached.
///
/// # Example
/// ```ignore
/// kernel::create_task(producer_task, WORKER_PRIORITY, 1)?;
/// ```
pub fn create_task(entry: TaskEntry, priority: u8, arg: usize) -> Result<usize, KernelError> {
    sync::critical_section(|_cs| unsafe {
        let scheduler = scheduler();
        let id = scheduler.create_task(priority, arg)?;
        cortex_m4::init_task_stack(&mut scheduler.tasks[id], entry);
        Ok(id)
    })
}

/// Start the scheduler. **Does not return.**
///
/// Interrupts stay masked from here until the first task is running, so
/// the first SysTick can never catch the CPU still on the main stack.
pub fn start(mut syst: SYST) -> ! {
    cortex_m::interrupt::disable();

    // Set PendSV and SysTick to lowest priority
    cortex_m4::set_interrupt_priorities();

    let first_sp = unsafe {
        let scheduler = scheduler();
        if scheduler.task_count == 0 {
            // No tasks — spin forever
            loop {
                cortex_m::asm::wfi();
            }
        }
        let first = scheduler.schedule();
        scheduler.tasks[first].stack_pointer as *const u32
    };

    cortex_m4::configure_systick(&mut syst);
    STARTED.store(true, Ordering::Release);

    unsafe { cortex_m4::start_first_task(first_sp) }
}

/// Time-sharing clock, called from the SysTick handler.
pub(crate) fn on_tick() {
    let needed = sync::critical_section(|_cs| unsafe {
        let scheduler = scheduler();
        scheduler.tick();
        scheduler.needs_reschedule
    });
    switch_if_needed(needed);
}

// ---------------------------------------------------------------------------
// Blocking semaphore
// ---------------------------------------------------------------------------

/// Counting semaphore whose waiters are Blocked in the scheduler.
///
/// A task that finds no permit parks on the semaphore's address and
/// gives up the CPU; `post` wakes the highest-priority waiter. A woken
/// task retries the take, so a permit grabbed by someone else in between
/// just parks it again.
///
/// The semaphore must not move while a task waits on it. The firmware
/// keeps all of them in a `'static` singleton.
pub struct KernelSemaphore {
    count: Mutex<Cell<u32>>,
    ceiling: u32,
}

impl KernelSemaphore {
    #[inline]
    fn wait_id(&self) -> WaitId {
        WaitId(self as *const Self as usize)
    }
}

impl Semaphore for KernelSemaphore {
    fn new(initial: u32, ceiling: u32) -> Self {
        Self {
            count: Mutex::new(Cell::new(initial.min(ceiling))),
            ceiling,
        }
    }

    fn pend(&self) {
        loop {
            let taken = sync::critical_section(|cs| {
                let count = self.count.borrow(cs);
                if count.get() > 0 {
                    count.set(count.get() - 1);
                    return true;
                }
                unsafe { scheduler().block_current(self.wait_id()) };
                false
            });
            if taken {
                return;
            }
            switch_if_needed(true);
        }
    }

    fn try_pend(&self) -> bool {
        sync::critical_section(|cs| {
            let count = self.count.borrow(cs);
            if count.get() == 0 {
                return false;
            }
            count.set(count.get() - 1);
            true
        })
    }

    fn post(&self) {
        let needed = sync::critical_section(|cs| {
            let count = self.count.borrow(cs);
            if count.get() < self.ceiling {
                count.set(count.get() + 1);
            }
            let scheduler = unsafe { scheduler() };
            scheduler.wake_one(self.wait_id());
            scheduler.needs_reschedule
        });
        switch_if_needed(needed);
    }

    fn count(&self) -> u32 {
        sync::critical_section(|cs| self.count.borrow(cs).get())
    }
}
