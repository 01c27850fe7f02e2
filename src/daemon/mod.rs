//! OxiWatch daemon - the long-running monitor
//!
//! Handles:
//! - Following the SSH journal and turning entries into events
//! - Enriching, storing and alerting on each event, in arrival order
//! - Recurring jobs (daily report, retention cleanup, GeoIP refresh)
//! - Graceful shutdown on SIGINT/SIGTERM or when the journal stream ends
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                oxiwatch daemon                  │
//! ├────────────────────────────────────────────────┤
//! │ LogSource ──mpsc──▶ event loop   │  Scheduler   │
//! │ (journalctl)        (single      │  (30s tick)  │
//! │                      consumer)   │              │
//! ├────────────────────────────────────────────────┤
//! │  GeoLookup │ EventStore │ Notifier │ Reports   │
//! └────────────────────────────────────────────────┘
//! ```

pub mod server;
pub mod setup;
pub mod tasks;

pub use server::{shutdown_signal, Collaborators, Daemon};
pub use setup::{build, GeoIpMaintenance, Runtime};
