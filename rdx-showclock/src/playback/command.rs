//! The closed set of inbound control commands.

use crate::common::{EntryId, Millis};
use crate::error::RejectedCommand;
use std::fmt;
use std::str::FromStr;

/// Address prefix accepted in front of a command name, for control surfaces
/// that speak in OSC-style paths (`/showclock/start`).
const ADDRESS_PREFIX: &str = "/showclock/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Stop,
    Roll,
    Next,
    Previous,
    Reload,
    /// Select the next playable event and start it straight away.
    Go,
    Load(EntryId),
    AddDelay(Millis),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Roll => "roll",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::Reload => "reload",
            Command::Go => "go",
            Command::Load(_) => "load",
            Command::AddDelay(_) => "addDelay",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Load(id) => write!(f, "load {id}"),
            Command::AddDelay(ms) => write!(f, "addDelay {ms}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Parses a control message such as `start`, `load intro`, `addDelay -30000`
/// or `/showclock/next`. Names are case-insensitive.
impl FromStr for Command {
    type Err = RejectedCommand;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let message = message.trim();
        let message = message.strip_prefix(ADDRESS_PREFIX).unwrap_or(message);
        let mut parts = message.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let argument = parts.next();

        let command = match name.to_ascii_lowercase().as_str() {
            "start" | "play" => Command::Start,
            "pause" => Command::Pause,
            "stop" | "unload" => Command::Stop,
            "roll" => Command::Roll,
            "next" => Command::Next,
            "previous" | "prev" => Command::Previous,
            "reload" => Command::Reload,
            "go" | "startnext" => Command::Go,
            "load" => {
                let id = argument.ok_or(RejectedCommand::InvalidArgument {
                    command: "load",
                    reason: "missing event id".to_string(),
                })?;
                Command::Load(EntryId::from(id))
            }
            "adddelay" | "add-delay" | "delay" => {
                let raw = argument.ok_or(RejectedCommand::InvalidArgument {
                    command: "addDelay",
                    reason: "missing milliseconds".to_string(),
                })?;
                let ms = raw.parse::<Millis>().map_err(|e| RejectedCommand::InvalidArgument {
                    command: "addDelay",
                    reason: format!("'{raw}' is not a number of milliseconds: {e}"),
                })?;
                Command::AddDelay(ms)
            }
            _ => return Err(RejectedCommand::Unsupported(message.to_string())),
        };
        Ok(command)
    }
}
