//! Build pipelines
//!
//! Every built-in task lives here, along with the helpers they share for
//! reading sources and writing into the destination tree. [`build_graph`]
//! wires them (and user-defined shell tasks) into a [`TaskGraph`].

pub mod clean;
pub mod fileset;
pub mod image;
pub mod lifecycle;
pub mod markup;
pub mod script;
pub mod sourcemap;
pub mod stylesheet;
pub mod template;

pub use clean::CleanTask;
pub use fileset::{compile_glob, glob_base, slash_path, FileSet, SourceFile};
pub use image::ImageTask;
pub use lifecycle::{FinishTask, ShellCommandTask, StartTask};
pub use markup::{ComponentExpander, HtmlTask};
pub use script::ScriptTask;
pub use sourcemap::SourceMap;
pub use stylesheet::{ScssTask, StyleTask};
pub use template::{BraceEngine, TemplateEngine, TemplateError};

use crate::config::{Environment, Project, BUILTIN_TASKS};
use crate::error::{ConfigResult, TaskError, TaskResult};
use crate::runner::{Context, Task, TaskGraph};
use crate::server::ServeTask;
use crate::watch::WatchTask;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read a source file
pub async fn read_source(path: &Path) -> TaskResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| TaskError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a source file that must be UTF-8 text
pub async fn read_text(path: &Path) -> TaskResult<String> {
    let bytes = read_source(path).await?;
    String::from_utf8(bytes).map_err(|e| TaskError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

/// Write an output file, creating parent directories
pub async fn write_output(path: &Path, contents: &[u8]) -> TaskResult<()> {
    let write_err = |source| TaskError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, contents).await.map_err(write_err)
}

/// Convert tool output to text
pub fn into_text(tool: &str, file: &Path, bytes: Vec<u8>) -> TaskResult<String> {
    String::from_utf8(bytes).map_err(|_| TaskError::Tool {
        tool: tool.to_string(),
        file: file.to_path_buf(),
        code: Some(0),
        stderr: "output is not valid UTF-8".to_string(),
    })
}

/// Copies matching files verbatim (vendor stylesheets and scripts)
pub struct CopyTask {
    sources: FileSet,
    dest: PathBuf,
}

impl CopyTask {
    pub fn new(sources: FileSet, dest: impl Into<PathBuf>) -> Self {
        CopyTask {
            sources,
            dest: dest.into(),
        }
    }
}

#[async_trait]
impl Task for CopyTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let files = self.sources.collect(&ctx.root)?;
        let dest = ctx.resolve(&self.dest);

        for file in &files {
            let contents = read_source(&file.path).await?;
            write_output(&dest.join(&file.relative), &contents).await?;
        }

        tracing::debug!(copied = files.len(), dest = %self.dest.display(), "copied vendor files");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("copy {} to {}", self.sources.patterns().join(" "), self.dest.display())
    }
}

fn builtin_deps(name: &str) -> &'static [&'static str] {
    BUILTIN_TASKS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, deps)| *deps)
        .unwrap_or(&[])
}

/// Build the task graph for a project with the default template engine
pub fn build_graph(project: &Project, env: Environment) -> ConfigResult<TaskGraph> {
    build_graph_with_engine(project, env, Arc::new(BraceEngine::new()))
}

/// Build the task graph, rendering components with `engine`
pub fn build_graph_with_engine(
    project: &Project,
    env: Environment,
    engine: Arc<dyn TemplateEngine>,
) -> ConfigResult<TaskGraph> {
    let config = &project.config;
    let mut graph = TaskGraph::new();

    let mut register = |name: &str, task: Arc<dyn Task>| {
        let deps = builtin_deps(name).iter().map(|d| d.to_string()).collect();
        graph.register_arc(name.to_string(), deps, task);
    };

    register("start", Arc::new(StartTask));
    register("clean", Arc::new(CleanTask::new(&config.dest)));
    register(
        "scss",
        Arc::new(ScssTask::new(
            FileSet::new(&config.styles.sources)?,
            config.styles.compile.clone(),
        )),
    );
    register(
        "lib-css",
        Arc::new(CopyTask::new(
            FileSet::new(&config.styles.vendor)?,
            &config.styles.vendor_dest,
        )),
    );
    register("css", Arc::new(StyleTask::from_config(&config.styles, env)?));
    register(
        "lib-js",
        Arc::new(CopyTask::new(
            FileSet::new(&config.scripts.vendor)?,
            &config.scripts.vendor_dest,
        )),
    );
    register("js", Arc::new(ScriptTask::from_config(&config.scripts, env)?));
    register("image", Arc::new(ImageTask::from_config(&config.images)?));
    register(
        "html",
        Arc::new(HtmlTask::from_config(&config.markup, env, engine)?),
    );
    register("serve", Arc::new(ServeTask::from_config(&config.server)));
    register("watch", Arc::new(WatchTask::from_config(&config.watch)?));
    register("finish", Arc::new(FinishTask::new(env)));

    for (name, shell) in &config.tasks {
        graph.register_arc(
            name.clone(),
            shell.deps.clone(),
            Arc::new(ShellCommandTask::new(name, shell)),
        );
    }

    Ok(graph)
}
