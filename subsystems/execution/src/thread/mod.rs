//! # Thread Management
//!
//! Thread handles: the user-visible identity and lifecycle state of a
//! thread, independent of whether its execution context still exists.

pub mod handle;
pub mod ops;
pub mod states;

pub use handle::*;
pub use ops::*;
pub use states::*;
