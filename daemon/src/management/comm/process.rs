use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// 脚本退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOutcome {
    Success,
    Failed(i32),
    /// Terminated by a signal, no exit code.
    Killed,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("server `{0}` not found")]
    UnknownServer(String),
    #[error("script {} not found", .0.display())]
    Missing(PathBuf),
    #[error("failed to run script: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("script did not finish within {0:?}")]
    Timeout(Duration),
}

/// Runs `sh <script>` inside `dir` and maps its exit status.
///
/// Only plain file names are accepted. The child is killed when the
/// timeout elapses.
pub async fn run_script(
    dir: &Path,
    script: &str,
    timeout: Duration,
) -> Result<ScriptOutcome, ScriptError> {
    let path = dir.join(script);
    let plain_name = Path::new(script).file_name().is_some_and(|name| name == script);
    if !plain_name || !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ScriptError::Missing(path));
    }

    let mut child = Command::new("sh")
        .arg(script)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            warn!("script {} timed out, killing it", path.display());
            let _ = child.kill().await;
            return Err(ScriptError::Timeout(timeout));
        }
    };

    let outcome = match status.code() {
        Some(0) => ScriptOutcome::Success,
        Some(code) => ScriptOutcome::Failed(code),
        None => ScriptOutcome::Killed,
    };
    info!("script {} finished: {:?}", path.display(), outcome);
    Ok(outcome)
}
