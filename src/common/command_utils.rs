use crate::error::{Result, ScanError};
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Execute a command with a hard timeout and return the output.
///
/// Every external tool the pipeline drives goes through here; a hung
/// subprocess surfaces as `ScanError::CommandTimeout` instead of stalling
/// its worker forever.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<Output> {
    let mut command = tokio::process::Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command.kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| ScanError::CommandTimeout {
            command: format!("{} {}", program, args.join(" ")),
            seconds: timeout.as_secs(),
        })??;

    Ok(output)
}

/// Check if a command is available in PATH
pub fn is_command_available(cmd: &str) -> bool {
    std::process::Command::new(cmd)
        .arg("--version")
        .output()
        .is_ok()
}
