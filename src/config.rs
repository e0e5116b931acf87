//! # PCSync Configuration
//!
//! Compile-time constants for the buffer, the mailbox service and the
//! kernel that runs them. All limits are fixed at compile time — no
//! dynamic allocation, no runtime configuration.

// ---------------------------------------------------------------------------
// Shared buffer
// ---------------------------------------------------------------------------

/// Number of slots in the shared circular buffer.
pub const BUFFER_SIZE: usize = 10;

/// Sentinel marking a free buffer slot. Never a valid item.
pub const EMPTY_SLOT: i32 = -1;

/// Smallest value the synthetic workload produces.
pub const MIN_ITEM_VALUE: i32 = 1;

/// Largest value the synthetic workload produces. Also bounds the
/// length of a single actuation burst (`2 × MAX_ITEM_VALUE` toggles).
pub const MAX_ITEM_VALUE: i32 = 10;

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Number of producer units created by the firmware.
pub const PRODUCER_COUNT: usize = 2;

/// Number of consumer units created by the firmware.
pub const CONSUMER_COUNT: usize = 2;

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Maximum number of tasks: idle + service + producers + consumers,
/// with some headroom. Each task consumes `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 8;

/// Per-task stack size in bytes. Must hold the deepest call chain plus
/// the hardware exception frame (32 bytes) and the software-saved
/// context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 2048;

/// SysTick frequency in Hz. 2 kHz gives the 500 µs tick the
/// time-sharing clock runs on.
pub const TICK_HZ: u32 = 2000;

/// Ticks a task may run before the time-sharing clock forces it to
/// yield to its equal-priority peers.
pub const TIME_SHARE_TICKS: u32 = 1;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Core cycles burnt between two actuator toggles (~1/2 second).
pub const ACTUATION_DELAY_CYCLES: u32 = SYSTEM_CLOCK_HZ / 2;

// ---------------------------------------------------------------------------
// Priorities (higher = more important)
// ---------------------------------------------------------------------------

/// Idle task priority. Runs only when every other task is blocked.
pub const IDLE_PRIORITY: u8 = 0;

/// Shared priority of producers and consumers. Equal priority lets the
/// time-sharing clock round-robin them.
pub const WORKER_PRIORITY: u8 = 1;

/// Service unit priority. Strictly above every worker so a rung doorbell
/// preempts them immediately.
pub const SERVICE_PRIORITY: u8 = 15;
