//! Configuration validation
//!
//! Checks that sequences, watch rules and shell-task dependencies only name
//! known tasks, that watch patterns compile and that dependencies are acyclic.

use crate::config::types::Config;
use crate::error::{ConfigError, ConfigResult};
use globset::Glob;
use std::collections::{BTreeMap, HashSet};

/// Built-in task names and their fixed prerequisites
pub const BUILTIN_TASKS: &[(&str, &[&str])] = &[
    ("start", &[]),
    ("clean", &[]),
    ("scss", &[]),
    ("lib-css", &[]),
    ("css", &["scss", "lib-css"]),
    ("lib-js", &[]),
    ("js", &["lib-js"]),
    ("image", &[]),
    ("html", &[]),
    ("serve", &[]),
    ("watch", &[]),
    ("finish", &[]),
];

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    if config.interpreter.is_empty() {
        return Err(ConfigError::Invalid(
            "interpreter must name at least one program".to_string(),
        ));
    }

    let graph = dependency_map(config);

    for (name, phases) in &config.sequences {
        if phases.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "sequence '{}' has no phases",
                name
            )));
        }
        for task in phases.iter().flatten() {
            require_task(&graph, task)?;
        }
    }

    for rule in &config.watch {
        Glob::new(&rule.pattern).map_err(|e| ConfigError::InvalidGlob {
            pattern: rule.pattern.clone(),
            error: e.to_string(),
        })?;
        for task in &rule.tasks {
            require_task(&graph, task)?;
        }
    }

    for deps in graph.values() {
        for dep in deps {
            require_task(&graph, dep)?;
        }
    }

    detect_circular_task_dependencies(&graph)?;

    Ok(())
}

/// All task names with their declared dependencies; shell tasks override
/// built-ins of the same name
pub fn dependency_map(config: &Config) -> BTreeMap<String, Vec<String>> {
    let mut graph: BTreeMap<String, Vec<String>> = BUILTIN_TASKS
        .iter()
        .map(|(name, deps)| {
            (
                name.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect();

    for (name, task) in &config.tasks {
        graph.insert(name.clone(), task.deps.clone());
    }

    graph
}

fn require_task(graph: &BTreeMap<String, Vec<String>>, name: &str) -> ConfigResult<()> {
    if graph.contains_key(name) {
        Ok(())
    } else {
        Err(ConfigError::TaskNotFound(name.to_string()))
    }
}

/// Detect circular dependencies between tasks
fn detect_circular_task_dependencies(graph: &BTreeMap<String, Vec<String>>) -> ConfigResult<()> {
    let mut visited = HashSet::new();
    for task_name in graph.keys() {
        let mut stack = Vec::new();
        check_task_cycle(graph, task_name, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Recursively check for cycles in task dependencies
fn check_task_cycle(
    graph: &BTreeMap<String, Vec<String>>,
    task_name: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> ConfigResult<()> {
    if stack.iter().any(|t| t == task_name) {
        stack.push(task_name.to_string());
        return Err(ConfigError::CircularDependency(stack.join(" -> ")));
    }

    // Skip if already fully processed
    if visited.contains(task_name) {
        return Ok(());
    }

    let deps = graph
        .get(task_name)
        .ok_or_else(|| ConfigError::TaskNotFound(task_name.to_string()))?;

    stack.push(task_name.to_string());
    for dep in deps {
        check_task_cycle(graph, dep, visited, stack)?;
    }
    stack.pop();

    visited.insert(task_name.to_string());
    Ok(())
}
