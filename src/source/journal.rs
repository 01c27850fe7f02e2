use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{pump_lines, LogSource, SourceConfig};
use crate::error::WatchError;
use crate::event::Event;
use crate::stats::PipelineStats;
use crate::Result;

const JOURNALCTL: &str = "journalctl";

/// How long `stop` waits after SIGTERM before killing outright.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Follows the systemd journal through a `journalctl` child process.
pub struct JournalSource {
    config: SourceConfig,
    stats: Arc<PipelineStats>,
    program: String,
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl JournalSource {
    pub fn new(config: SourceConfig, stats: Arc<PipelineStats>) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        Self {
            config,
            stats,
            program: JOURNALCTL.to_string(),
            tx: Some(tx),
            rx: Some(rx),
            child: None,
            reader: None,
        }
    }

    /// Use a different executable in place of `journalctl`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// New entries only, one JSON object per line.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-u".to_string(),
            self.config.unit.clone(),
            "-f".to_string(),
            "-o".to_string(),
            "json".to_string(),
            "--since".to_string(),
            "now".to_string(),
        ]
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }
}

#[async_trait]
impl LogSource for JournalSource {
    async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| WatchError::Config("journal source already started".into()))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| WatchError::Spawn {
            command: self.program.clone(),
            source,
        })?;
        info!(pid = ?child.id(), unit = %self.config.unit, "journal reader started");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "oxiwatch::journalctl", "{}", line);
                }
            });
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            WatchError::Io(std::io::Error::other("journalctl stdout was not captured"))
        })?;

        let identifiers = self.config.identifiers.clone();
        let stats = Arc::clone(&self.stats);
        self.reader = Some(tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            match pump_lines(reader, &identifiers, tx, cancel, stats).await {
                Ok(()) => info!("journal reader finished"),
                Err(e) => error!(error = %e, "journal reader error"),
            }
        }));

        self.child = Some(child);
        Ok(())
    }

    fn events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.rx.take()
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                debug!(pid, "sending SIGTERM to journalctl");
                // SAFETY: pid belongs to a child we spawned and have not reaped.
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }
        #[cfg(not(unix))]
        {
            child.start_kill()?;
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "journalctl exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for journalctl"),
            Err(_) => {
                warn!("journalctl did not exit in time, killing");
                child.kill().await?;
            }
        }

        if let Some(reader) = self.reader.take() {
            if !reader.is_finished() {
                reader.abort();
            }
        }
        Ok(())
    }
}
