//! Configuration parsing and validation
//!
//! This module handles discovery and parsing of pipework.yml files,
//! validation of the task graph they describe and the environment flag.

pub mod env;
pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use env::*;
pub use parse::*;
pub use schema::*;
pub use types::*;
