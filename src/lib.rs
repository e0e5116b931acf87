//! # PCSync — Bounded-Buffer Engine with an Actuator Mailbox
//!
//! A producer/consumer synchronization engine for ARM Cortex-M4
//! microcontrollers, together with the small preemptive kernel it runs on.
//!
//! ## Overview
//!
//! Producers insert items into a fixed-capacity circular buffer and
//! consumers remove them, coordinated by two counting semaphores (free
//! slots, filled slots) and a mutex over the slot store. Every successful
//! operation publishes an actuation request into a single-slot mailbox and
//! rings a binary doorbell. A high-priority service unit wakes on the
//! doorbell and drives the requested output channel through a burst of
//! toggles.
//!
//! - **Producers never overfill, consumers never underflow**: the permit
//!   counts always match slot occupancy.
//! - **Only the latest request matters**: the mailbox holds one request,
//!   later publishes overwrite earlier unseen ones.
//! - **Bursts are atomic**: the service unit never suspends mid-burst.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │          Firmware (main.rs): service · producers ·     │
//! │                      consumers                         │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │   Drivers    │  Service Unit    │  Diagnostics         │
//! │   driver.rs  │  service.rs      │  diag.rs             │
//! │  ─ Producer  │  ─ step()        │  ─ DiagnosticSink    │
//! │  ─ Consumer  │  ─ actuate()     │  ─ LogSink/ItmLogger │
//! ├──────────────┴─────┬────────────┴──────────────────────┤
//! │  Bounded Buffer    │  Mailbox (mailbox.rs)             │
//! │  buffer.rs         │  publish() · Receiver::wait()     │
//! ├────────────────────┴───────────────────────────────────┤
//! │        Sync Primitives (sync.rs): Semaphore ·          │
//! │        SemMutex · critical_section                     │
//! ├────────────────────────────────────────────────────────┤
//! │  Kernel (kernel.rs) · Scheduler · Task Model           │
//! │  KernelSemaphore · create_task() · start()             │
//! ├────────────────────────────────────────────────────────┤
//! │  Arch Port (arch/cortex_m4.rs) · Board (board.rs)      │
//! │  PendSV · SysTick · Stack Init · GPIO LEDs             │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine (`buffer`, `mailbox`, `service`, `driver`) is generic over
//! [`sync::Semaphore`] and [`diag::DiagnosticSink`]. On the target it
//! runs on `kernel::KernelSemaphore`; on a host (tests, `std` feature) on
//! [`sync::StdSemaphore`] and OS threads.
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in TCB
//! - **Critical sections**: `cortex_m::interrupt::free()` for kernel state

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod error;
pub mod diag;
pub mod sync;
pub mod buffer;
pub mod mailbox;
pub mod delay;
pub mod service;
pub mod driver;
pub mod task;
pub mod scheduler;
#[cfg(target_arch = "arm")]
pub mod arch;
#[cfg(target_arch = "arm")]
pub mod kernel;
#[cfg(target_arch = "arm")]
pub mod board;

pub use buffer::{BoundedBuffer, Item};
pub use error::{BufferError, KernelError};
pub use mailbox::{ActuationRequest, Channel, Mailbox};
pub use service::{Actuator, ServiceUnit};
pub use sync::Semaphore;
