use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{pump_lines, LogSource, SourceConfig};
use crate::error::WatchError;
use crate::event::Event;
use crate::stats::PipelineStats;
use crate::Result;

/// Replays a fixed set of journal lines through the normal decode, filter
/// and parse path. No process is involved; the channel closes once every
/// line has been consumed.
pub struct MemorySource {
    lines: Vec<String>,
    identifiers: Vec<String>,
    stats: Arc<PipelineStats>,
    tx: Option<mpsc::Sender<Event>>,
    rx: Option<mpsc::Receiver<Event>>,
    task: Option<JoinHandle<()>>,
}

impl MemorySource {
    pub fn new(lines: Vec<String>, config: SourceConfig, stats: Arc<PipelineStats>) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        Self {
            lines,
            identifiers: config.identifiers,
            stats,
            tx: Some(tx),
            rx: Some(rx),
            task: None,
        }
    }
}

#[async_trait]
impl LogSource for MemorySource {
    async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| WatchError::Config("memory source already started".into()))?;

        let input = std::mem::take(&mut self.lines).join("\n").into_bytes();
        let identifiers = self.identifiers.clone();
        let stats = Arc::clone(&self.stats);
        self.task = Some(tokio::spawn(async move {
            // An in-memory cursor cannot fail to read.
            let _ = pump_lines(Cursor::new(input), &identifiers, tx, cancel, stats).await;
        }));
        Ok(())
    }

    fn events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.rx.take()
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}
