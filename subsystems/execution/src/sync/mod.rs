//! # Synchronization
//!
//! Blocking primitives layered on the scheduler's block/wakeup.

pub mod condvar;

pub use condvar::CondVar;
