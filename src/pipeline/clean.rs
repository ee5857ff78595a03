//! Removes the destination tree

use crate::error::{TaskError, TaskResult};
use crate::runner::{Context, Task};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

pub struct CleanTask {
    dest: PathBuf,
}

impl CleanTask {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        CleanTask { dest: dest.into() }
    }
}

#[async_trait]
impl Task for CleanTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        let dest = ctx.resolve(&self.dest);
        match tokio::fs::remove_dir_all(&dest).await {
            Ok(()) => {
                tracing::debug!(dest = %self.dest.display(), "removed output tree");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TaskError::Write { path: dest, source }),
        }
    }

    fn describe(&self) -> String {
        format!("remove {}", self.dest.display())
    }
}
