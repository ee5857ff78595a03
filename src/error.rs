//! Error types for Pipework

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Pipework operations
pub type Result<T> = std::result::Result<T, PipeworkError>;

/// Main error type for Pipework
#[derive(Error, Debug)]
pub enum PipeworkError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sequence (build) errors
    #[error("Build failed: {0}")]
    Sequence(#[from] SequenceError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Sequence '{0}' is not defined")]
    SequenceNotFound(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Invalid glob pattern '{pattern}': {error}")]
    InvalidGlob { pattern: String, error: String },

    #[error("Invalid environment '{value}' in ${var} (expected dev or prod)")]
    InvalidEnvironment { var: String, value: String },

    #[error("Failed to load {path}: {message}")]
    Dotenv { path: PathBuf, message: String },
}

/// Failures of a single task.
///
/// Read and processing errors abort the owning task only; write errors to the
/// destination tree are fatal to the whole build.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed on {file} ({}): {stderr}", exit_status(.code))]
    Tool {
        tool: String,
        file: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("template error in {file}: {message}")]
    Template { file: PathBuf, message: String },

    #[error("component error in {file}: {message}")]
    Component { file: PathBuf, message: String },

    #[error("dev server error: {0}")]
    Server(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("dependency '{0}' failed")]
    DependencyFailed(String),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

impl TaskError {
    /// Whether this failure should terminate the process even in watch mode
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Write { .. })
    }
}

/// Errors raised by the sequencer
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("task '{0}' is not registered")]
    UnknownTask(String),

    #[error("circular dependency: {0}")]
    Cycle(String),

    #[error("phase {phase} failed: {}", summarize(.failures))]
    PhaseFailed {
        phase: usize,
        failures: Vec<(String, Arc<TaskError>)>,
    },
}

impl SequenceError {
    /// Whether any of the failed tasks hit a fatal error
    pub fn is_fatal(&self) -> bool {
        match self {
            SequenceError::UnknownTask(_) | SequenceError::Cycle(_) => false,
            SequenceError::PhaseFailed { failures, .. } => {
                failures.iter().any(|(_, err)| err.is_fatal())
            }
        }
    }
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by a signal".to_string(),
    }
}

fn summarize(failures: &[(String, Arc<TaskError>)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("[{}] {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Variable interpolation errors
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Recursive interpolation detected")]
    RecursiveInterpolation,
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for task operations
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;
