//! Live auth-log ingestion.
//!
//! A source turns line-delimited journal JSON into [`Event`]s on a bounded
//! channel. The channel send awaits when full, which is the only
//! back-pressure in the pipeline: a stalled consumer stops the reader, and
//! the reader stops draining the subprocess pipe.

pub mod journal;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::event::Event;
use crate::parser;
use crate::stats::PipelineStats;
use crate::Result;

pub use journal::JournalSource;
pub use memory::MemorySource;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

#[async_trait]
pub trait LogSource: Send {
    /// Begin streaming. Failing to launch the underlying producer is fatal.
    async fn start(&mut self, cancel: CancellationToken) -> Result<()>;

    /// Take the receiving end of the event channel. Returns `None` after the
    /// first call. The channel closes when the producer ends.
    fn events(&mut self) -> Option<mpsc::Receiver<Event>>;

    async fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// systemd unit passed to `journalctl -u`.
    pub unit: String,
    /// `SYSLOG_IDENTIFIER` values to keep; everything else is dropped.
    pub identifiers: Vec<String>,
    pub capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            unit: "ssh".to_string(),
            identifiers: vec!["sshd".to_string()],
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One decoded journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
struct JournalEntry {
    #[serde(rename = "__REALTIME_TIMESTAMP", default)]
    realtime_timestamp: Option<String>,
    #[serde(rename = "MESSAGE", default)]
    message: Option<JournalField>,
    #[serde(rename = "SYSLOG_IDENTIFIER", default)]
    syslog_identifier: Option<String>,
}

// journald emits non-UTF-8 fields as arrays of byte values.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JournalField {
    Text(String),
    Bytes(Vec<u8>),
}

impl JournalField {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        }
    }
}

/// Decode one `journalctl -o json` line.
pub fn decode_record(line: &str) -> std::result::Result<RawRecord, serde_json::Error> {
    let entry: JournalEntry = serde_json::from_str(line)?;
    Ok(RawRecord {
        timestamp: realtime_to_utc(entry.realtime_timestamp.as_deref()),
        message: entry.message.map(JournalField::into_string).unwrap_or_default(),
        identifier: entry.syslog_identifier.unwrap_or_default(),
    })
}

fn realtime_to_utc(micros: Option<&str>) -> DateTime<Utc> {
    micros
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_micros)
        .unwrap_or_else(Utc::now)
}

/// Decode, filter and parse a single line. Anything that is not an event
/// of a monitored identifier is `None`.
pub fn event_from_line(line: &str, identifiers: &[String], stats: &PipelineStats) -> Option<Event> {
    let record = match decode_record(line) {
        Ok(record) => record,
        Err(e) => {
            debug!(error = %e, "skipping undecodable journal record");
            PipelineStats::incr(&stats.records_skipped);
            return None;
        }
    };

    if !identifiers.iter().any(|id| *id == record.identifier) {
        return None;
    }

    let event = parser::parse_message(&record.message, record.timestamp);
    if event.is_none() {
        trace!(message = %record.message, "no event in message");
    }
    event
}

/// Read lines until EOF or cancellation, sending every event in order.
///
/// A line that is not valid UTF-8 counts as one skipped record. Only a
/// read error ends the pump early. Returns when the reader is exhausted,
/// the token fires, or the receiver is gone. Dropping `tx` on return
/// closes the channel.
pub async fn pump_lines<R>(
    reader: R,
    identifiers: &[String],
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut segments = reader.split(b'\n');

    loop {
        let segment = tokio::select! {
            _ = cancel.cancelled() => break,
            segment = segments.next_segment() => segment?,
        };
        let Some(mut bytes) = segment else {
            break;
        };
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "skipping journal line that is not valid UTF-8");
                PipelineStats::incr(&stats.records_skipped);
                continue;
            }
        };
        let Some(event) = event_from_line(&line, identifiers, &stats) else {
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    debug!("event receiver dropped, stopping reader");
                    break;
                }
                PipelineStats::incr(&stats.events_emitted);
            }
        }
    }

    Ok(())
}
