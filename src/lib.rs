pub mod clienv;
pub mod collab;
pub mod completions;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event;
pub mod geoip;
pub mod logging;
pub mod notifier;
pub mod parser;
pub mod report;
pub mod scheduler;
pub mod self_update;
pub mod source;
pub mod stats;
pub mod storage;

pub use error::{Result, WatchError};
pub use event::{AuthMethod, Event, EventKind};
