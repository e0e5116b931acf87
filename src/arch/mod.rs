//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the kernel. Currently implements the Cortex-M4
//! port; extensible to other architectures by adding sibling modules.

pub mod cortex_m4;
