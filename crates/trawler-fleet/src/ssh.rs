//! Remote command execution over the system ssh client.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{ExecOutput, RemoteExec};
use crate::error::{FleetError, FleetResult};

/// Runs commands on worker instances through `ssh` with key auth.
/// BatchMode keeps a missing key from hanging on a password prompt.
pub struct SshExec {
    user: String,
    key_path: String,
}

impl SshExec {
    pub fn new(user: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
        }
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn execute(&self, host: &str, command: &str) -> FleetResult<ExecOutput> {
        debug!(%host, %command, "running remote command");
        let output = Command::new("ssh")
            .arg("-i")
            .arg(&self.key_path)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg(format!("{}@{}", self.user, host))
            .arg(command)
            .output()
            .await
            .map_err(|e| FleetError::RemoteExec(format!("spawning ssh: {e}")))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
