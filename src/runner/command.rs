//! Tool command execution
//!
//! Delegated capabilities (compilers, prefixers, minifiers, optimizers) are
//! shell commands: content goes in on stdin, the result comes back on stdout.

use crate::error::{TaskError, TaskResult};
use crate::runner::{interpolate, Context};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Build the interpreter invocation for a command line
fn shell(ctx: &Context, command_line: &str) -> Command {
    let mut command = Command::new(&ctx.interpreter[0]);
    if ctx.interpreter.len() > 1 {
        command.args(&ctx.interpreter[1..]);
    }
    command.arg(command_line);
    command.current_dir(&ctx.root);
    command.env(&ctx.env_var, ctx.env.as_str());
    command
}

/// Pipe `input` through a tool command and return its stdout
///
/// `tool` names the step for diagnostics and `file` is the source the content
/// came from.
pub async fn pipe_through(
    ctx: &Context,
    tool: &str,
    template: &str,
    vars: &HashMap<String, String>,
    file: &Path,
    input: Vec<u8>,
) -> TaskResult<Vec<u8>> {
    let command_line = interpolate(template, vars)?;
    tracing::debug!(tool, file = %ctx.relative(file).display(), command = %command_line, "running tool");

    let mut child = shell(ctx, &command_line)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TaskError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take().ok_or_else(|| TaskError::Spawn {
        command: command_line.clone(),
        source: io::Error::new(io::ErrorKind::BrokenPipe, "stdin unavailable"),
    })?;

    let writer = async move {
        let result = stdin.write_all(&input).await;
        drop(stdin);
        result
    };

    let (written, output) = tokio::join!(writer, child.wait_with_output());
    let output = output.map_err(|source| TaskError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(TaskError::Tool {
            tool: tool.to_string(),
            file: ctx.relative(file).to_path_buf(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    // A tool may legitimately stop reading early; the exit status decides
    if let Err(e) = written {
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(TaskError::Spawn {
                command: command_line,
                source: e,
            });
        }
    }

    Ok(output.stdout)
}

/// Apply an optional step: `None` passes the content through unchanged
pub async fn apply_step(
    ctx: &Context,
    tool: &str,
    template: Option<&str>,
    vars: &HashMap<String, String>,
    file: &Path,
    input: Vec<u8>,
) -> TaskResult<Vec<u8>> {
    match template {
        Some(template) => pipe_through(ctx, tool, template, vars, file, input).await,
        None => Ok(input),
    }
}

/// Run a command with inherited stdio (user-defined shell tasks)
pub async fn run_command(ctx: &Context, task: &str, command_line: &str) -> TaskResult<()> {
    let command_line = interpolate(command_line, &ctx.base_vars())?;
    tracing::info!(task, command = %command_line, "running command");

    let status = shell(ctx, &command_line)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| TaskError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    if !status.success() {
        return Err(TaskError::Tool {
            tool: task.to_string(),
            file: ctx.root.clone(),
            code: status.code(),
            stderr: format!("`{}` exited unsuccessfully", command_line),
        });
    }

    Ok(())
}
