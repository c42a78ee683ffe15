//! Server console on standard input
//!
//! Only kept for operators used to the old `save` command. Every change is
//! written to the database as it happens, so `save` does nothing.

use crate::error::Result;
use std::io::BufRead;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Deprecated, does nothing
    Save,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "save" => Some(ConsoleCommand::Save),
            other => Some(ConsoleCommand::Unknown(other.to_string())),
        }
    }
}

/// Read console lines until end of input. Blocks; run it on its own thread.
pub fn watch_console<R: BufRead>(reader: R) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Save) => {
                warn!("save is deprecated and does nothing: changes are stored as they happen")
            }
            Some(ConsoleCommand::Unknown(command)) => info!(%command, "unknown console command"),
            None => {}
        }
    }
    Ok(())
}
