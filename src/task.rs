//! # Task Control Block
//!
//! Defines the execution units the kernel multiplexes: the idle task, the
//! service unit and the producer/consumer workers. Each task carries a
//! fixed priority, an opaque argument handed to its entry point, and the
//! wait object it is blocked on, if any.

use crate::config::{STACK_SIZE, TIME_SHARE_TICKS};

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲    preempt / tick / yield      │
///        ├────────────────────────────────┤
///        │                                │ block_current()
///        │         wake_one()        ┌──────────┐
///        └───────────────────────────│ Blocked  │
///                                    └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task is ready to run and waiting in the run queue.
    Ready,
    /// Task is currently executing on the CPU.
    Running,
    /// Task is waiting on a semaphore.
    Blocked,
    /// Free TCB slot, never scheduled.
    Unused,
}

/// Task entry point. Receives the task's opaque argument and never
/// returns.
pub type TaskEntry = extern "C" fn(usize) -> !;

// ---------------------------------------------------------------------------
// Initial stack frame
// ---------------------------------------------------------------------------

/// Words the context switch saves by hand: R4–R11 and EXC_RETURN.
pub const SW_FRAME_WORDS: usize = 9;

/// Words of the basic (non-FP) hardware exception frame.
pub const HW_FRAME_WORDS: usize = 8;

/// Total words of a freshly prepared frame.
pub const FRAME_WORDS: usize = SW_FRAME_WORDS + HW_FRAME_WORDS;

/// Return to Thread mode on PSP with a basic (non-FP) frame.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// xPSR with only the Thumb bit set.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// Identity of the object a blocked task waits on (the semaphore's
/// address on the target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitId(pub usize);

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// TCBs are stored in a static array in the scheduler — no heap
/// allocation. Each TCB includes an inline stack (`[u8; STACK_SIZE]`);
/// `stack_pointer` points into it and is updated on every context switch.
#[repr(C, align(8))]
pub struct TaskControlBlock {
    /// Per-task stack memory. First field so the TCB alignment (8, as
    /// required by ARM AAPCS) applies to it.
    pub stack: [u8; STACK_SIZE],

    /// Saved stack pointer (PSP). Updated on context switch.
    pub stack_pointer: *mut u32,

    /// Task identifier (index in the scheduler's task array).
    pub id: usize,

    /// Current execution state.
    pub state: TaskState,

    /// Fixed priority, higher runs first.
    pub priority: u8,

    /// Opaque argument passed to the entry point in `r0`.
    pub arg: usize,

    /// Object this task is blocked on while `state == Blocked`.
    pub waiting_on: Option<WaitId>,

    /// Sequence number taken when the task blocked; orders waiters of
    /// equal priority first-come first-served.
    pub wait_seq: u32,

    /// Remaining ticks in the current time-share slice.
    pub ticks_remaining: u32,
}

// Safety: TaskControlBlock contains a raw pointer (stack_pointer) but
// it always points into the task's own stack array. We only access TCBs
// within critical sections.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// Unallocated TCB, used to initialize the static array.
    pub const EMPTY: Self = Self::empty();

    pub const fn empty() -> Self {
        Self {
            stack: [0u8; STACK_SIZE],
            stack_pointer: core::ptr::null_mut(),
            id: 0,
            state: TaskState::Unused,
            priority: 0,
            arg: 0,
            waiting_on: None,
            wait_seq: 0,
            ticks_remaining: 0,
        }
    }

    /// Initialize a TCB for a new task. The task starts Ready with a full
    /// time slice; the stack frame is set up separately by the arch layer.
    pub fn init(&mut self, id: usize, priority: u8, arg: usize) {
        self.id = id;
        self.state = TaskState::Ready;
        self.priority = priority;
        self.arg = arg;
        self.waiting_on = None;
        self.wait_seq = 0;
        self.ticks_remaining = TIME_SHARE_TICKS;
    }

    /// Lay out the frame the first context switch into this task pops.
    ///
    /// ```text
    /// [Hardware stacked frame, basic (no FP)]   <- 8-byte aligned top
    ///   xPSR  (Thumb bit set)
    ///   PC    (entry)
    ///   LR    (exit)
    ///   R12, R3, R2, R1 (0)
    ///   R0    (task argument)
    /// [Software saved context]
    ///   EXC_RETURN (Thread mode, PSP, no FP frame)
    ///   R11 … R4 (0)                            <- stack_pointer
    /// ```
    ///
    /// `entry` and `exit` are code addresses (Thumb bit included).
    pub fn prepare_frame(&mut self, entry: u32, exit: u32) {
        let base = self.stack.as_ptr() as usize;
        // Align to 8 bytes (AAPCS requirement)
        let top = (base + STACK_SIZE) & !0x07;
        let offset = top - base - FRAME_WORDS * 4;

        let mut words = [0u32; FRAME_WORDS];
        words[SW_FRAME_WORDS - 1] = EXC_RETURN_THREAD_PSP;
        let hw = &mut words[SW_FRAME_WORDS..];
        hw[0] = self.arg as u32;
        hw[5] = exit;
        hw[6] = entry;
        hw[7] = INITIAL_XPSR;

        for (i, word) in words.iter().enumerate() {
            let at = offset + i * 4;
            self.stack[at..at + 4].copy_from_slice(&word.to_ne_bytes());
        }
        self.stack_pointer = self.stack[offset..].as_mut_ptr() as *mut u32;
    }

    /// Park the task on `wait`.
    pub fn block_on(&mut self, wait: WaitId, seq: u32) {
        self.state = TaskState::Blocked;
        self.waiting_on = Some(wait);
        self.wait_seq = seq;
    }

    /// Make a blocked task runnable again.
    pub fn unblock(&mut self) {
        self.state = TaskState::Ready;
        self.waiting_on = None;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != TaskState::Unused
    }

    /// Ready or already running.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    #[inline]
    pub fn is_waiting_on(&self, wait: WaitId) -> bool {
        self.state == TaskState::Blocked && self.waiting_on == Some(wait)
    }

    /// Refill the time-share slice.
    #[inline]
    pub fn reset_slice(&mut self) {
        self.ticks_remaining = TIME_SHARE_TICKS;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
