use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::CollaboratorError;
use super::{Deliverer, OutboundMessage, Summarizer, TextExtractor};

/// Collaborators backed by shell commands.
///
/// - summarize: text on stdin, summary on stdout
/// - translate: text on stdin, `TARGET_LANGUAGE` in the environment
/// - deliver: JSON envelope on stdin, success is exit status 0
/// - extract-text: `FILE_PATH` in the environment, text on stdout
#[derive(Debug, Clone, Default)]
pub struct CommandCollaborators {
    pub summarize_cmd: Option<String>,
    pub translate_cmd: Option<String>,
    pub deliver_cmd: Option<String>,
    pub extract_text_cmd: Option<String>,
}

fn configured<'a>(
    cmd: &'a Option<String>,
    what: &'static str,
) -> Result<&'a str, CollaboratorError> {
    cmd.as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or(CollaboratorError::NotConfigured(what))
}

/// Run `command` through `sh -c`, feed it `input`, and return its stdout.
async fn run(
    command: &str,
    input: Option<&[u8]>,
    envs: &[(&str, &str)],
) -> Result<String, CollaboratorError> {
    tracing::debug!("Running collaborator: {}", command);
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .envs(envs.iter().copied())
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CollaboratorError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(bytes)) = (stdin, input) {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());

    let io_err = |source: std::io::Error| CollaboratorError::Io {
        command: command.to_string(),
        source,
    };
    let output = output.map_err(io_err)?;
    if !output.status.success() {
        return Err(CollaboratorError::Failed {
            command: command.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    // A child that exits successfully without reading all of stdin is fine.
    if let Err(e) = fed {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(io_err(e));
        }
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[async_trait]
impl Summarizer for CommandCollaborators {
    async fn summarize(&self, text: &str) -> Result<String, CollaboratorError> {
        let cmd = configured(&self.summarize_cmd, "summarize command")?;
        run(cmd, Some(text.as_bytes()), &[]).await
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, CollaboratorError> {
        let cmd = configured(&self.translate_cmd, "translate command")?;
        run(
            cmd,
            Some(text.as_bytes()),
            &[("TARGET_LANGUAGE", target_language)],
        )
        .await
    }
}

#[async_trait]
impl Deliverer for CommandCollaborators {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        let cmd = configured(&self.deliver_cmd, "deliver command")?;
        let envelope = serde_json::to_vec(message)?;
        run(cmd, Some(envelope.as_slice()), &[]).await.map(|_| ())
    }
}

#[async_trait]
impl TextExtractor for CommandCollaborators {
    async fn extract_text(&self, path: &Path) -> Result<String, CollaboratorError> {
        let cmd = configured(&self.extract_text_cmd, "extract-text command")?;
        let path = path.to_string_lossy();
        run(cmd, None, &[("FILE_PATH", path.as_ref())]).await
    }
}
