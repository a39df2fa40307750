use std::process::Stdio;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

use crate::config::{BackupConfig, EndpointConfig};

/// Longest stderr excerpt carried into an error
const STDERR_EXCERPT_LEN: usize = 2048;

/// Error producing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Snapshot exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },
    #[error("I/O error while writing snapshot: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Capability that streams a logical snapshot of an endpoint's database
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Write the snapshot into `out`, returning the number of bytes written
    async fn snapshot(
        &self,
        endpoint: &EndpointConfig,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SnapshotError>;
}

/// Snapshot produced by an external program writing to stdout
///
/// Connection details go through the libpq environment (`PGHOST`, `PGPORT`,
/// `PGUSER`, `PGPASSWORD`, `PGDATABASE`) so the password never shows up in a
/// process listing.
#[derive(Debug, Clone)]
pub struct CommandSnapshot {
    program: String,
    args: Vec<String>,
}

impl CommandSnapshot {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn command(&self, endpoint: &EndpointConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("PGHOST", &endpoint.host)
            .env("PGPORT", endpoint.port.to_string())
            .env("PGUSER", &endpoint.user)
            .env("PGPASSWORD", endpoint.password.expose_secret())
            .env("PGDATABASE", &endpoint.database)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SnapshotSource for CommandSnapshot {
    async fn snapshot(
        &self,
        endpoint: &EndpointConfig,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SnapshotError> {
        debug!(program = %self.program, addr = %endpoint.addr(), "Starting snapshot process");

        let mut child = self
            .command(endpoint)
            .spawn()
            .map_err(|source| SnapshotError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            SnapshotError::Io(std::io::Error::other("snapshot stdout not captured"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            SnapshotError::Io(std::io::Error::other("snapshot stderr not captured"))
        })?;

        // stderr drains on its own task so a chatty child cannot block stdout,
        // and a failed write below never waits on it
        let excerpt = tokio::spawn(async move { read_excerpt(&mut stderr).await });

        let written = match tokio::io::copy(&mut stdout, out).await {
            Ok(n) => n,
            Err(e) => {
                excerpt.abort();
                let _ = child.kill().await;
                return Err(SnapshotError::Io(e));
            }
        };

        let errors = excerpt.await.unwrap_or_default();
        let status = child.wait().await?;
        if !status.success() {
            return Err(SnapshotError::Exit {
                code: status.code(),
                stderr: endpoint.redact(errors.trim()),
            });
        }

        debug!(bytes = written, "Snapshot process finished");
        Ok(written)
    }
}

async fn read_excerpt<R>(reader: &mut R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    let start = buf.len().saturating_sub(STDERR_EXCERPT_LEN);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}
