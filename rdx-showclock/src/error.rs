//! Error types for playback commands and rundown edits.
//!
//! Nothing in here is fatal. A `RejectedCommand` goes back to whoever sent
//! the command and leaves the playback state untouched; a `RundownError`
//! goes back to the editor and leaves the rundown untouched.

use crate::common::EntryId;
use crate::playback::Phase;
use thiserror::Error;

/// Why the dispatcher refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectedCommand {
    #[error("'{command}' is not allowed while {phase}")]
    IllegalTransition { command: &'static str, phase: Phase },

    #[error("no rundown entry with id '{0}'")]
    UnknownEntry(EntryId),

    #[error("entry '{0}' is not a playable event")]
    NotPlayable(EntryId),

    #[error("no event is selected")]
    NothingSelected,

    #[error("unsupported command '{0}'")]
    Unsupported(String),

    #[error("invalid argument for '{command}': {reason}")]
    InvalidArgument { command: &'static str, reason: String },

    #[error("playback engine is not running")]
    EngineUnavailable,
}

impl RejectedCommand {
    /// A stable, machine-readable reason code for control surfaces.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RejectedCommand::IllegalTransition { .. } => "illegal_transition",
            RejectedCommand::UnknownEntry(_) => "unknown_entry",
            RejectedCommand::NotPlayable(_) => "not_playable",
            RejectedCommand::NothingSelected => "nothing_selected",
            RejectedCommand::Unsupported(_) => "unsupported_command",
            RejectedCommand::InvalidArgument { .. } => "invalid_argument",
            RejectedCommand::EngineUnavailable => "engine_unavailable",
        }
    }
}

/// Errors raised by the rundown store while applying an edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RundownError {
    #[error("an entry with id '{0}' already exists")]
    DuplicateId(EntryId),

    #[error("no rundown entry with id '{0}'")]
    UnknownEntry(EntryId),

    #[error("cannot insert after '{0}': no such entry")]
    UnknownAnchor(EntryId),

    #[error("entry '{id}' cannot change kind from {from} to {to}")]
    KindMismatch {
        id: EntryId,
        from: &'static str,
        to: &'static str,
    },
}
