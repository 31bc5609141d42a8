//! # Scheduler Seam
//!
//! The execution-context scheduler is an external collaborator. This module
//! defines what the thread core needs from it; implementations live in
//! `modules_impl/schedulers`.

pub mod metrics;
pub mod traits;

pub use metrics::SchedulerMetrics;
pub use traits::*;
