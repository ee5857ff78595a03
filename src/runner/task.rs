//! Tasks and the task graph
//!
//! A task is a named unit of build work that completes exactly once per
//! invocation with success or a [`TaskError`]. The [`TaskGraph`] holds every
//! registered task together with its prerequisites and is handed to the
//! sequencer by reference.

use crate::error::TaskResult;
use crate::runner::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A unit of build work
#[async_trait]
pub trait Task: Send + Sync {
    /// Perform the work
    async fn run(&self, ctx: &Context) -> TaskResult<()>;

    /// One-line description for `--list`
    fn describe(&self) -> String {
        String::new()
    }
}

/// A registered task with its declared prerequisites
#[derive(Clone)]
pub struct TaskEntry {
    pub name: String,
    pub deps: Vec<String>,
    pub task: Arc<dyn Task>,
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEntry")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish()
    }
}

/// Registry of named tasks
#[derive(Debug, Default, Clone)]
pub struct TaskGraph {
    tasks: BTreeMap<String, TaskEntry>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; an existing task of the same name is replaced
    pub fn register<T>(&mut self, name: &str, deps: &[&str], task: T) -> &mut Self
    where
        T: Task + 'static,
    {
        let deps = deps.iter().map(|d| d.to_string()).collect();
        self.register_arc(name.to_string(), deps, Arc::new(task))
    }

    /// Register an already shared task
    pub fn register_arc(
        &mut self,
        name: String,
        deps: Vec<String>,
        task: Arc<dyn Task>,
    ) -> &mut Self {
        if self.tasks.contains_key(&name) {
            tracing::warn!(task = %name, "task registered twice; replacing the earlier definition");
        }
        self.tasks.insert(
            name.clone(),
            TaskEntry {
                name,
                deps,
                task,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TaskEntry> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A task backed by a closure, handy for lifecycle hooks and tests
pub struct FnTask<F> {
    func: F,
    description: String,
}

impl<F> FnTask<F>
where
    F: Fn(&Context) -> TaskResult<()> + Send + Sync,
{
    pub fn new(description: &str, func: F) -> Self {
        FnTask {
            func,
            description: description.to_string(),
        }
    }
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn(&Context) -> TaskResult<()> + Send + Sync,
{
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        (self.func)(ctx)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::path::PathBuf;

    #[test]
    fn test_register_and_lookup() {
        let mut graph = TaskGraph::new();
        graph
            .register("scss", &[], FnTask::new("compile", |_| Ok(())))
            .register("css", &["scss"], FnTask::new("style", |_| Ok(())));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("css").unwrap().deps, vec!["scss"]);
        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["css", "scss"]);
        assert_eq!(graph.get("scss").unwrap().task.describe(), "compile");
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut graph = TaskGraph::new();
        graph.register("html", &[], FnTask::new("first", |_| Ok(())));
        graph.register("html", &["clean"], FnTask::new("second", |_| Ok(())));

        let entry = graph.get("html").unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(entry.deps, vec!["clean"]);
        assert_eq!(entry.task.describe(), "second");
    }

    #[tokio::test]
    async fn test_fn_task_runs() {
        let ctx = Context::new(PathBuf::from("."));
        let task = FnTask::new("fails", |_| Err(TaskError::DependencyFailed("x".into())));
        assert!(task.run(&ctx).await.is_err());
    }
}
