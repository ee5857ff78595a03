//! Watch controller
//!
//! Maps changed source files to the tasks that rebuild them. Each change
//! event becomes a re-run request handed to the driver; requests are not
//! debounced or coalesced.

use crate::config::WatchRule;
use crate::error::{ConfigResult, TaskResult};
use crate::pipeline::{compile_glob, glob_base, slash_path};
use crate::runner::{Context, Task};
use async_trait::async_trait;
use globset::GlobMatcher;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Compiled watch rules
#[derive(Debug, Clone)]
pub struct WatchController {
    rules: Vec<(WatchRule, GlobMatcher)>,
}

impl WatchController {
    pub fn new(rules: &[WatchRule]) -> ConfigResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.clone(), compile_glob(&rule.pattern)?.compile_matcher())))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(WatchController { rules })
    }

    /// Tasks to re-run for a change to `relative` (root-relative, `/`-separated),
    /// in rule order without duplicates
    pub fn tasks_for(&self, relative: &str) -> Vec<String> {
        let mut tasks: Vec<String> = Vec::new();
        for (rule, matcher) in &self.rules {
            if matcher.is_match(relative) {
                for task in &rule.tasks {
                    if !tasks.contains(task) {
                        tasks.push(task.clone());
                    }
                }
            }
        }
        tasks
    }

    /// Existing directories to watch: every rule's glob base, minus those
    /// already covered by another
    pub fn roots(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .rules
            .iter()
            .map(|(rule, _)| root.join(glob_base(&rule.pattern)))
            .filter(|dir| dir.is_dir())
            .collect();
        dirs.sort();
        dirs.dedup();

        let mut roots: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            if !roots.iter().any(|r| dir.starts_with(r)) {
                roots.push(dir);
            }
        }
        roots
    }
}

/// Path relative to the project root, tolerating canonicalized event paths
fn relative_to(root: &Path, canonical_root: &Path, path: &Path) -> String {
    let relative = path
        .strip_prefix(root)
        .or_else(|_| path.strip_prefix(canonical_root))
        .unwrap_or(path);
    slash_path(relative)
}

/// The `watch` task: registers the watcher once and feeds re-run requests
pub struct WatchTask {
    controller: Arc<WatchController>,
    started: AtomicBool,
}

impl WatchTask {
    pub fn from_config(rules: &[WatchRule]) -> ConfigResult<Self> {
        Ok(WatchTask {
            controller: Arc::new(WatchController::new(rules)?),
            started: AtomicBool::new(false),
        })
    }

    fn start(&self, ctx: &Context) -> TaskResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            },
        )?;

        let roots = self.controller.roots(&ctx.root);
        for dir in &roots {
            watcher.watch(dir, RecursiveMode::Recursive)?;
        }
        tracing::info!(dirs = roots.len(), "watching for changes");

        let root = ctx.root.clone();
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());
        let controller = Arc::clone(&self.controller);
        let requests = ctx.rerun_sender();

        tokio::spawn(async move {
            // The watcher stops when dropped
            let _watcher = watcher;
            while let Some(path) = rx.recv().await {
                let relative = relative_to(&root, &canonical_root, &path);
                let tasks = controller.tasks_for(&relative);
                if tasks.is_empty() {
                    continue;
                }
                tracing::info!(file = %relative, tasks = ?tasks, "change detected");
                if requests.send(tasks).is_err() {
                    break;
                }
            }
        });

        Ok(())
    }
}

#[async_trait]
impl Task for WatchTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.start(ctx) {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        ctx.mark_background();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("watch {} rule(s) and rebuild on change", self.controller.rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn rules() -> Vec<WatchRule> {
        vec![
            WatchRule::new("src/**/*.html", &["html"]),
            WatchRule::new("src/style/**/*.{css,scss}", &["css"]),
            WatchRule::new("src/style/**/*.scss", &["css", "lint"]),
            WatchRule::new("src/javascript/**/*.js", &["js"]),
        ]
    }

    #[test]
    fn test_tasks_for_unions_matching_rules() {
        let controller = WatchController::new(&rules()).unwrap();
        assert_eq!(controller.tasks_for("src/style/main.scss"), vec!["css", "lint"]);
        assert_eq!(controller.tasks_for("src/style/main.css"), vec!["css"]);
        assert_eq!(controller.tasks_for("src/views/index.html"), vec!["html"]);
        assert!(controller.tasks_for("README.md").is_empty());
        assert!(controller.tasks_for("dist/index.html").is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(WatchController::new(&[WatchRule::new("src/[", &["css"])]).is_err());
    }

    #[test]
    fn test_roots_skip_nested_and_missing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/style")).unwrap();

        let controller = WatchController::new(&rules()).unwrap();
        assert_eq!(controller.roots(temp.path()), vec![temp.path().join("src")]);
    }

    #[tokio::test]
    async fn test_change_requests_rerun() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/style")).unwrap();

        let ctx = Context::new(temp.path().to_path_buf());
        let mut requests = ctx.take_rerun_requests().unwrap();
        let task = WatchTask::from_config(&rules()).unwrap();
        task.run(&ctx).await.unwrap();
        assert!(ctx.has_background());

        fs::write(temp.path().join("src/style/main.css"), "a{}").unwrap();

        let request = tokio::time::timeout(Duration::from_secs(10), requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, vec!["css"]);
    }
}
