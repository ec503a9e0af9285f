//! Shell commands as probes and guarded operations.
//!
//! The command words are joined and handed to `sh -c`, so pipes and
//! redirections work but arguments are not re-quoted.

use idehealth_core::Failure;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Exit status convention for probes: 0 means detected, 1 means not
/// detected, anything else is a probe failure.
pub async fn detect(command: &[String], timeout: Option<Duration>) -> Result<bool, Failure> {
    let output = execute(command, timeout).await?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        Some(code) => Err(exit_failure(code, &output.stderr)),
        None => Err(Failure::new("probe terminated by signal")),
    }
}

/// Run a guarded command, returning its stdout on success.
pub async fn run_command(command: Vec<String>, timeout: Option<Duration>) -> Result<String, Failure> {
    let output = execute(&command, timeout).await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    match output.status.code() {
        Some(code) => Err(exit_failure(code, &output.stderr)),
        None => Err(Failure::new("command terminated by signal")),
    }
}

async fn execute(command: &[String], timeout: Option<Duration>) -> Result<Output, Failure> {
    let script = command.join(" ");
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&script)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                Failure::new(format!("command timed out after {}ms", limit.as_millis()))
                    .with_code("ETIMEDOUT")
            })?,
        None => cmd.output().await,
    };
    Ok(output?)
}

/// Shells report 127 for a missing command and 126 for one that cannot be
/// executed; surface those as the matching errno codes.
fn exit_failure(code: i32, stderr: &[u8]) -> Failure {
    let stderr = String::from_utf8_lossy(stderr);
    let detail = stderr.trim().lines().last().unwrap_or("").trim();
    let message = if detail.is_empty() {
        format!("command exited with status {code}")
    } else {
        format!("command exited with status {code}: {detail}")
    };
    let failure = Failure::new(message);
    match code {
        126 => failure.with_code("EACCES"),
        127 => failure.with_code("ENOENT"),
        _ => failure,
    }
}
