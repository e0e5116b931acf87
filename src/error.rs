//! # Error Types
//!
//! The engine models a single recoverable failure kind: the buffer's
//! permits and its slot contents disagree. Kernel errors only surface
//! while the firmware registers its tasks.

use thiserror::Error;

/// Buffer consistency failure reported by `insert` / `remove`.
///
/// Every variant is recovered locally: permits are rolled back, a
/// diagnostic is emitted and the calling unit restarts its iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Insert found the slot under the write cursor still occupied.
    #[error("slot {index} is occupied, cannot insert item {item}")]
    SlotOccupied { index: usize, item: i32 },

    /// Remove found the slot under the read cursor empty.
    #[error("slot {index} is empty, nothing to remove")]
    SlotEmpty { index: usize },

    /// The item equals the EMPTY sentinel and cannot be stored.
    #[error("item value is reserved for empty slots")]
    ReservedValue,
}

/// Errors raised while registering tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The TCB table is full (`MAX_TASKS` reached).
    #[error("task table is full")]
    TaskTableFull,
}
