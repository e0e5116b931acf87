//! # Scheduler
//!
//! Priority-preemptive scheduler with round-robin among equal priorities.
//!
//! ## Scheduling Algorithm
//!
//! 1. The highest-priority runnable task always runs. The service unit
//!    sits strictly above the workers, so waking it preempts them.
//! 2. Tasks of equal priority share the CPU: every `TIME_SHARE_TICKS`
//!    ticks the time-sharing clock forces the running task to yield, and
//!    `schedule()` rotates to the next peer after it in table order.
//! 3. A task that pends on an empty semaphore is Blocked until
//!    `wake_one()` picks it (highest priority first, FIFO among equals).
//! 4. The idle task (index 0, priority 0) never blocks, so there is
//!    always something to run.

use crate::config::MAX_TASKS;
use crate::error::KernelError;
use crate::task::{TaskControlBlock, TaskState, WaitId};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Holds all task control blocks and
/// scheduling state. Stored as a global `static mut` in `kernel.rs`.
pub struct Scheduler {
    /// Fixed-size array of TCBs. Index 0 is reserved for the idle task.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Index of the currently running task.
    pub current_task: usize,

    /// Number of allocated tasks (including idle task).
    pub task_count: usize,

    /// Monotonic tick counter.
    pub tick_count: u64,

    /// Flag set when a context switch should happen at the next
    /// opportunity (PendSV).
    pub needs_reschedule: bool,

    /// Next blocking sequence number.
    wait_seq: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            current_task: 0,
            task_count: 0,
            tick_count: 0,
            needs_reschedule: false,
            wait_seq: 0,
        }
    }

    /// Register a new task with the scheduler.
    ///
    /// The caller prepares the task's stack frame afterwards.
    pub fn create_task(&mut self, priority: u8, arg: usize) -> Result<usize, KernelError> {
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let id = self.task_count;
        self.tasks[id].init(id, priority, arg);
        self.task_count += 1;

        if self.current_valid() && priority > self.tasks[self.current_task].priority {
            self.needs_reschedule = true;
        }
        Ok(id)
    }

    /// Called from the SysTick handler every tick.
    ///
    /// Charges the tick to the running task and, when its time-share
    /// slice runs out, forces it to yield.
    pub fn tick(&mut self) {
        self.tick_count += 1;

        let current = self.current_task;
        if !self.current_valid() || self.tasks[current].state != TaskState::Running {
            return;
        }

        let task = &mut self.tasks[current];
        task.ticks_remaining = task.ticks_remaining.saturating_sub(1);
        if task.ticks_remaining == 0 {
            self.yield_current();
        }
    }

    /// Select the next task to run and mark it Running.
    ///
    /// A still-running task keeps the CPU unless a strictly higher
    /// priority task is ready. Otherwise peers are scanned in table order
    /// starting after the current task, so equal priorities rotate.
    ///
    /// # Returns
    /// Index of the next task to run.
    pub fn schedule(&mut self) -> usize {
        let count = self.task_count;
        let current = self.current_task;

        let mut best: Option<usize> = None;
        for offset in 1..=count {
            let i = (current + offset) % count.max(1);
            if !self.tasks[i].is_runnable() {
                continue;
            }
            match best {
                Some(b) if self.tasks[b].priority >= self.tasks[i].priority => {}
                _ => best = Some(i),
            }
        }

        // Keep the running task on ties
        if self.current_valid() && self.tasks[current].state == TaskState::Running {
            if let Some(b) = best {
                if self.tasks[b].priority <= self.tasks[current].priority {
                    best = Some(current);
                }
            }
        }

        let next = best.unwrap_or(0);

        if self.current_valid() && self.tasks[current].state == TaskState::Running && next != current {
            self.tasks[current].state = TaskState::Ready;
        }
        if next < count {
            if next != current || self.tasks[next].state != TaskState::Running {
                self.tasks[next].reset_slice();
            }
            self.tasks[next].state = TaskState::Running;
        }

        self.current_task = next;
        self.needs_reschedule = false;
        next
    }

    /// Give up the CPU to equal- or higher-priority peers.
    ///
    /// Called by the time-sharing tick when the slice runs out.
    pub fn yield_current(&mut self) {
        let current = self.current_task;
        if self.current_valid() && self.tasks[current].state == TaskState::Running {
            self.tasks[current].state = TaskState::Ready;
            self.tasks[current].reset_slice();
            self.needs_reschedule = true;
        }
    }

    /// Block the running task on `wait`.
    pub fn block_current(&mut self, wait: WaitId) {
        let current = self.current_task;
        if !self.current_valid() {
            return;
        }
        let seq = self.wait_seq;
        self.wait_seq = self.wait_seq.wrapping_add(1);
        self.tasks[current].block_on(wait, seq);
        self.needs_reschedule = true;
    }

    /// Make the highest-priority task waiting on `wait` Ready.
    ///
    /// Among equal priorities the longest waiter wins. Requests a
    /// reschedule when the woken task outranks the running one.
    ///
    /// # Returns
    /// Index of the woken task, or `None` if nobody was waiting.
    pub fn wake_one(&mut self, wait: WaitId) -> Option<usize> {
        let mut best: Option<usize> = None;
        for i in 0..self.task_count {
            if !self.tasks[i].is_waiting_on(wait) {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let (tb, ti) = (&self.tasks[b], &self.tasks[i]);
                    let newer = ti.wait_seq.wrapping_sub(tb.wait_seq) as i32 > 0;
                    if ti.priority > tb.priority || (ti.priority == tb.priority && !newer) {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }

        let woken = best?;
        self.tasks[woken].unblock();

        let current = self.current_task;
        let current_running =
            self.current_valid() && self.tasks[current].state == TaskState::Running;
        if !current_running || self.tasks[woken].priority > self.tasks[current].priority {
            self.needs_reschedule = true;
        }
        Some(woken)
    }

    /// Number of tasks blocked on `wait`.
    pub fn waiters(&self, wait: WaitId) -> usize {
        self.tasks[..self.task_count]
            .iter()
            .filter(|t| t.is_waiting_on(wait))
            .count()
    }

    /// Get a reference to the current task's TCB.
    pub fn current_tcb(&self) -> &TaskControlBlock {
        &self.tasks[self.current_task]
    }

    #[inline]
    fn current_valid(&self) -> bool {
        self.current_task < self.task_count
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
