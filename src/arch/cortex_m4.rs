//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! task stack preparation and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11 plus the task's EXC_RETURN, which completes the full
//! context save/restore. On hard-float targets a task that has used the
//! FPU gets an extended hardware frame (S0–S15, FPSCR); PendSV then also
//! saves S16–S31, and EXC_RETURN bit 4 tells the restore path which frame
//! to unstack.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both sit at the lowest priority (0xFF), so a context
//! switch never preempts another handler, and the time-sharing tick never
//! interrupts a switch in progress.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::task::{TaskControlBlock, TaskEntry, SW_FRAME_WORDS};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` using the processor clock.
/// Each tick drives the time-sharing clock in `Scheduler::tick()`.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a PendSV exception to perform a context switch.
///
/// From Thread mode with interrupts enabled the switch happens before
/// this function returns; from a handler it happens on handler exit.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Initialize a task's stack frame for its first context switch.
///
/// The frame (see [`TaskControlBlock::prepare_frame`]) mimics what PendSV
/// leaves behind, so the first "return" into the task starts `entry` with
/// the task argument in R0.
pub fn init_task_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
    tcb.prepare_frame(entry as usize as u32, task_exit as usize as u32);
}

/// Fallback for tasks that return (they can't — entries are `-> !`).
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching to PSP and branching to Thread mode.
///
/// Pops the frame built by [`init_task_stack`] by hand, leaving the task
/// argument in R0, and jumps to the entry point.
///
/// # Safety
/// Must only be called once, with a stack pointer produced by
/// [`init_task_stack`].
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Set PSP to the task's stack pointer (skip SW-saved R4-R11, EXC_RETURN)
        "adds r0, #{sw_frame}",
        "msr psp, r0",

        // Switch to PSP for Thread mode (set CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Pop the hardware frame manually; R0 receives the task argument
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (task entry point)
        "pop {{r6}}",          // xPSR (discarded)
        "mov lr, r4",

        "cpsie i",
        "bx r5",

        in("r0") psp,
        sw_frame = const SW_FRAME_WORDS * 4,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// ## Sequence
/// 1. Save S16–S31 if the task has an FP frame (EXC_RETURN bit 4 clear)
/// 2. Save R4–R11 and EXC_RETURN onto the current task's stack (PSP)
/// 3. Store the updated PSP into the current task's TCB
/// 4. Call the scheduler to select the next task
/// 5. Restore R4–R11, EXC_RETURN and, if flagged, S16–S31 from the new
///    task's stack
/// 6. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR
///    and, for an FP frame, S0–S15 and FPSCR)
///
/// Interrupts are masked for the duration so kernel state is never seen
/// half-updated by another handler.
#[cfg(target_abi = "eabihf")]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",

        // --- Save current context ---
        "mrs r0, psp",
        "tst lr, #0x10",
        "it eq",
        "vstmdbeq r0!, {{s16-s31}}",
        "stmdb r0!, {{r4-r11, lr}}",
        "bl {save_context}",

        // --- Select next task ---
        "bl {do_schedule}",

        // --- Restore new context ---
        "ldmia r0!, {{r4-r11, lr}}",
        "tst lr, #0x10",
        "it eq",
        "vldmiaeq r0!, {{s16-s31}}",
        "msr psp, r0",

        "cpsie i",
        "bx lr",

        save_context = sym save_current_context,
        do_schedule = sym do_context_switch,
    );
}

/// PendSV for soft-float targets: no FP frame can exist, EXC_RETURN is
/// still carried per task so both variants share one stack layout.
#[cfg(not(target_abi = "eabihf"))]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",

        "mrs r0, psp",
        "stmdb r0!, {{r4-r11, lr}}",
        "bl {save_context}",

        "bl {do_schedule}",

        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",

        "cpsie i",
        "bx lr",

        save_context = sym save_current_context,
        do_schedule = sym do_context_switch,
    );
}

/// Save the current task's stack pointer. Called from PendSV.
///
/// # Safety
/// Called from assembly context with interrupts disabled.
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    let scheduler = crate::kernel::scheduler();
    let current = scheduler.current_task;
    if current < scheduler.task_count {
        scheduler.tasks[current].stack_pointer = psp;
    }
}

/// Perform the scheduling decision and return the new task's PSP.
/// Called from PendSV.
///
/// # Safety
/// Called from assembly context with interrupts disabled.
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    let scheduler = crate::kernel::scheduler();
    let next = scheduler.schedule();
    scheduler.tasks[next].stack_pointer
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — the time-sharing clock.
///
/// Called at `TICK_HZ`. Its only effect is to force the running task to
/// yield when its slice expires.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::on_tick();
}
