//! Pipework - a phased build orchestrator for front-end assets
//!
//! Pipework compiles stylesheets, bundles scripts, assembles HTML pages from
//! components and optimizes images into an output tree, driven by named
//! sequences of task phases described in a pipework.yml file. A development
//! server with live reload and a file watcher keep the output current.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod ui;
pub mod watch;

// Re-export commonly used types
pub use error::{PipeworkError, Result};

/// Current version of Pipework
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
