use anyhow::Result;
use chrono::{Local, Utc};
use console::style;
use oxiwatch::parser::{self, TimestampSource};
use oxiwatch::Event;

use crate::args::DebugCommands;

pub(crate) fn cmd_debug(command: DebugCommands) -> Result<()> {
    match command {
        DebugCommands::Parse { line } => cmd_parse(&line),
    }
}

/// Full syslog lines get their year inferred; anything else is treated as
/// a bare journal message received now.
fn cmd_parse(line: &str) -> Result<()> {
    let source = match parser::syslog_month(line) {
        Some(month) => TimestampSource::Year(parser::infer_syslog_year(Local::now(), month)),
        None => TimestampSource::Instant(Utc::now()),
    };

    match parser::parse_line(line, source) {
        Some(event) => print_event(&event),
        None => println!("{} not an SSH login event", style("✗").red()),
    }
    Ok(())
}

fn print_event(event: &Event) {
    let rows = [
        ("Kind", event.kind.to_string()),
        ("User", event.username.clone()),
        ("IP", event.ip.clone()),
        ("Port", event.port.to_string()),
        ("Method", event.method.to_string()),
        ("Invalid user", event.invalid_user.to_string()),
        ("Time", event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    ];
    for (key, value) in rows {
        println!("  {:<14}{}", style(key).dim(), value);
    }
}
