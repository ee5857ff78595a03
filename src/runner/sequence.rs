//! Phased task execution
//!
//! A sequence is an ordered list of phases. Tasks inside a phase run
//! concurrently (each after its own prerequisites); every task of a phase is
//! awaited, successful or not, before the next phase starts. Within one run a
//! task executes at most once, so a prerequisite shared by several tasks is
//! built a single time.

use crate::error::{SequenceError, TaskError};
use crate::runner::{Context, TaskGraph};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Outcome of a single task inside a run
pub type TaskOutcome = Result<(), Arc<TaskError>>;

type SharedOutcome = Shared<BoxFuture<'static, TaskOutcome>>;

/// Runs phases of tasks from a [`TaskGraph`]
#[derive(Clone)]
pub struct Sequencer {
    graph: Arc<TaskGraph>,
    ctx: Arc<Context>,
}

impl Sequencer {
    pub fn new(graph: Arc<TaskGraph>, ctx: Arc<Context>) -> Self {
        Sequencer { graph, ctx }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Run `phases` strictly in order, stopping at the first failed phase
    pub async fn run_phases(&self, phases: &[Vec<String>]) -> Result<(), SequenceError> {
        for name in phases.iter().flatten() {
            self.check(name)?;
        }

        let run = Arc::new(Run::new(Arc::clone(&self.graph), Arc::clone(&self.ctx)));
        let started = Instant::now();

        for (index, phase) in phases.iter().enumerate() {
            let number = index + 1;
            tracing::debug!(phase = number, tasks = ?phase, "starting phase");

            let outcomes = join_all(phase.iter().map(|name| run.start(name))).await;

            let failures: Vec<(String, Arc<TaskError>)> = phase
                .iter()
                .zip(outcomes)
                .filter_map(|(name, outcome)| outcome.err().map(|e| (name.clone(), e)))
                .collect();

            if !failures.is_empty() {
                tracing::error!(phase = number, failed = failures.len(), "phase failed");
                return Err(SequenceError::PhaseFailed {
                    phase: number,
                    failures,
                });
            }
        }

        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "sequence complete");
        Ok(())
    }

    /// Run `tasks` (and their prerequisites) as a single phase
    pub async fn run_tasks(&self, tasks: &[String]) -> Result<(), SequenceError> {
        self.run_phases(&[tasks.to_vec()]).await
    }

    /// Verify that `name` and everything it depends on is registered and acyclic
    pub fn check(&self, name: &str) -> Result<(), SequenceError> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        self.check_from(name, &mut done, &mut stack)
    }

    fn check_from(
        &self,
        name: &str,
        done: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Result<(), SequenceError> {
        if stack.iter().any(|t| t == name) {
            stack.push(name.to_string());
            return Err(SequenceError::Cycle(stack.join(" -> ")));
        }
        if done.contains(name) {
            return Ok(());
        }

        let entry = self
            .graph
            .get(name)
            .ok_or_else(|| SequenceError::UnknownTask(name.to_string()))?;

        stack.push(name.to_string());
        for dep in &entry.deps {
            self.check_from(dep, done, stack)?;
        }
        stack.pop();

        done.insert(name.to_string());
        Ok(())
    }
}

/// State of one sequence run: the shared outcome of every task started so far
struct Run {
    graph: Arc<TaskGraph>,
    ctx: Arc<Context>,
    started: Mutex<HashMap<String, SharedOutcome>>,
}

impl Run {
    fn new(graph: Arc<TaskGraph>, ctx: Arc<Context>) -> Self {
        Run {
            graph,
            ctx,
            started: Mutex::new(HashMap::new()),
        }
    }

    /// Start `name` unless it already started in this run
    fn start(self: &Arc<Self>, name: &str) -> SharedOutcome {
        let mut started = self
            .started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(outcome) = started.get(name) {
            return outcome.clone();
        }

        let outcome = Arc::clone(self).execute(name.to_string()).shared();
        started.insert(name.to_string(), outcome.clone());
        outcome
    }

    fn execute(self: Arc<Self>, name: String) -> BoxFuture<'static, TaskOutcome> {
        async move {
            let entry = match self.graph.get(&name) {
                Some(entry) => entry.clone(),
                None => return Err(Arc::new(TaskError::DependencyFailed(name))),
            };

            let prerequisites = join_all(entry.deps.iter().map(|dep| self.start(dep))).await;
            for (dep, outcome) in entry.deps.iter().zip(prerequisites) {
                if outcome.is_err() {
                    tracing::warn!(task = %name, dependency = %dep, "skipping task: prerequisite failed");
                    return Err(Arc::new(TaskError::DependencyFailed(dep.clone())));
                }
            }

            tracing::info!(task = %name, "starting");
            let started = Instant::now();
            let result = entry.task.run(&self.ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    tracing::info!(task = %name, elapsed_ms, "finished");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(task = %name, elapsed_ms, error = %e, "failed");
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
    }
}
