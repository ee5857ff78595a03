//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, target selection and the
//! long-running driver loop used when the dev server or watcher is active.

pub mod app;

// Re-export main types
pub use app::*;
