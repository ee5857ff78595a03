//! Task execution engine
//!
//! This module holds the task registry, the phased sequencer, tool command
//! execution and the context shared by the tasks of a run.

pub mod command;
pub mod context;
pub mod interpolate;
pub mod sequence;
pub mod task;

// Re-export main types
pub use command::*;
pub use context::*;
pub use interpolate::*;
pub use sequence::*;
pub use task::*;
