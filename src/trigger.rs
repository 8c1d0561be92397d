//! Local wake trigger.
//!
//! A running watcher listens on a unix socket in the data directory, so an
//! external wake-up (a push handler, a scheduled job, `softwake wake`) starts
//! the session in the watcher's engine rather than in a second one.

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    time,
};
use tokio_util::sync::CancellationToken;

use crate::service::SoftWake;

pub const TRIGGER_SOCKET: &str = "softwake.sock";

const WAKE_REQUEST: &str = "wake";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReply {
    Started,
    AlreadyPlaying,
}

impl TriggerReply {
    fn as_str(self) -> &'static str {
        match self {
            TriggerReply::Started => "started",
            TriggerReply::AlreadyPlaying => "already-playing",
        }
    }

    fn parse(reply: &str) -> Option<Self> {
        match reply {
            "started" => Some(TriggerReply::Started),
            "already-playing" => Some(TriggerReply::AlreadyPlaying),
            _ => None,
        }
    }
}

/// Listening end, owned by the watcher. The socket file is removed on drop.
pub struct TriggerListener {
    listener: UnixListener,
    path: PathBuf,
}

impl TriggerListener {
    /// Bind at `path`. A stale socket left by a crashed watcher is replaced;
    /// a live one means another watcher owns the alarms and is an error.
    pub async fn bind(path: PathBuf) -> Result<Self> {
        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                bail!("another watcher is already running ({})", path.display());
            }
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind trigger socket {}", path.display()))?;
        info!("Listening for wake triggers on {}", path.display());
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Answer wake requests until `shutdown` fires.
    pub async fn serve(self, service: SoftWake, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            if let Err(err) = answer(stream, &service).await {
                                warn!("Wake trigger request failed: {err:#}");
                            }
                        });
                    }
                    Err(err) => warn!("Wake trigger accept failed: {err}"),
                },
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

impl Drop for TriggerListener {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

async fn answer(stream: UnixStream, service: &SoftWake) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await?;
    if line.trim() != WAKE_REQUEST {
        bail!("unknown request '{}'", line.trim());
    }

    let reply = if service.trigger_now() {
        TriggerReply::Started
    } else {
        TriggerReply::AlreadyPlaying
    };
    write.write_all(format!("{}\n", reply.as_str()).as_bytes()).await?;
    Ok(())
}

/// Ask the watcher listening at `path` to start a session.
/// `Ok(None)` when no watcher is listening.
pub async fn request_wake(path: &Path) -> Result<Option<TriggerReply>> {
    let stream = match time::timeout(CONNECT_TIMEOUT, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) | Err(_) => return Ok(None),
    };

    let (read, mut write) = stream.into_split();
    write
        .write_all(format!("{WAKE_REQUEST}\n").as_bytes())
        .await
        .context("Failed to send wake request")?;

    let mut line = String::new();
    time::timeout(REPLY_TIMEOUT, BufReader::new(read).read_line(&mut line))
        .await
        .context("watcher did not answer")?
        .context("Failed to read watcher reply")?;

    TriggerReply::parse(line.trim())
        .map(Some)
        .ok_or_else(|| anyhow!("unexpected watcher reply '{}'", line.trim()))
}
