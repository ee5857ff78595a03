//! Lifecycle markers and user-defined shell tasks

use crate::config::{Environment, ShellTask};
use crate::error::TaskResult;
use crate::runner::{run_command, Context, Task};
use crate::ui;
use async_trait::async_trait;

/// Announces the start of a build
pub struct StartTask;

#[async_trait]
impl Task for StartTask {
    async fn run(&self, _ctx: &Context) -> TaskResult<()> {
        ui::log_color("cyan", "build start!");
        Ok(())
    }

    fn describe(&self) -> String {
        "announce the build".to_string()
    }
}

/// Reloads connected browsers and reports the environment
pub struct FinishTask {
    env: Environment,
}

impl FinishTask {
    pub fn new(env: Environment) -> Self {
        FinishTask { env }
    }
}

#[async_trait]
impl Task for FinishTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        ctx.reloader.reload();
        ui::log_color("blueBG", &format!("environment: {}", self.env));
        Ok(())
    }

    fn describe(&self) -> String {
        "reload browsers and report the environment".to_string()
    }
}

/// A task defined in the `tasks` section of pipework.yml
pub struct ShellCommandTask {
    name: String,
    usage: Option<String>,
    commands: Vec<String>,
}

impl ShellCommandTask {
    pub fn new(name: &str, task: &ShellTask) -> Self {
        ShellCommandTask {
            name: name.to_string(),
            usage: task.usage.clone(),
            commands: task.run.clone(),
        }
    }
}

#[async_trait]
impl Task for ShellCommandTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        for command in &self.commands {
            run_command(ctx, &self.name, command).await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.usage.clone().unwrap_or_else(|| self.commands.join(" && "))
    }
}
