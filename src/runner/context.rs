//! Build context shared by every task of a run
//!
//! Holds runtime plumbing (project root, shell, reload channel, re-run
//! requests). Pipeline settings and the environment flag are handed to each
//! task when it is constructed.

use crate::config::{Environment, Project};
use crate::server::Reloader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A request to re-run a set of tasks (issued by the watch controller)
pub type RerunRequest = Vec<String>;

/// Execution context shared by the tasks of a build
pub struct Context {
    /// Project root; configured paths are relative to it
    pub root: PathBuf,

    /// Interpreter for tool commands (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Name of the environment variable exported to tools
    pub env_var: String,

    /// Active environment
    pub env: Environment,

    /// Live-reload broadcaster
    pub reloader: Reloader,

    rerun_tx: mpsc::UnboundedSender<RerunRequest>,
    rerun_rx: Mutex<Option<mpsc::UnboundedReceiver<RerunRequest>>>,
    background: AtomicBool,
}

impl Context {
    /// Create a context rooted at `root` with default settings
    pub fn new(root: PathBuf) -> Self {
        let (rerun_tx, rerun_rx) = mpsc::unbounded_channel();
        Context {
            root,
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            env_var: "NODE_ENV".to_string(),
            env: Environment::Dev,
            reloader: Reloader::new(),
            rerun_tx,
            rerun_rx: Mutex::new(Some(rerun_rx)),
            background: AtomicBool::new(false),
        }
    }

    /// Create a context for a loaded project
    pub fn for_project(project: &Project, env: Environment) -> Self {
        Context::new(project.root.clone())
            .with_interpreter(project.config.interpreter.clone())
            .with_env_var(project.config.env_var.clone())
            .with_env(env)
    }

    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_env_var(mut self, env_var: String) -> Self {
        self.env_var = env_var;
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Resolve a configured (root-relative) path
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Path relative to the project root, for display and source maps
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// Variables available to every tool command
    pub fn base_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("env".to_string(), self.env.to_string());
        vars.insert(
            "root".to_string(),
            crate::runner::shell_quote(&self.root.display().to_string()),
        );
        vars
    }

    /// A sender for re-run requests that can outlive the current task
    pub fn rerun_sender(&self) -> mpsc::UnboundedSender<RerunRequest> {
        self.rerun_tx.clone()
    }

    /// Take the re-run request stream; only the first caller gets it
    pub fn take_rerun_requests(&self) -> Option<mpsc::UnboundedReceiver<RerunRequest>> {
        self.rerun_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Record that a long-lived background loop (server, watcher) is running
    pub fn mark_background(&self) {
        self.background.store(true, Ordering::SeqCst);
    }

    /// Whether the process must stay alive after the sequence completes
    pub fn has_background(&self) -> bool {
        self.background.load(Ordering::SeqCst)
    }
}
