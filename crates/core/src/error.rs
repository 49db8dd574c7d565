use cuelight_devices::DeviceId;
use thiserror::Error;

use crate::cue::cue::CueId;
use crate::show::show::PresetId;

/// Coarse error classes surfaced to whatever API layer sits on top of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    InvalidState,
    Internal,
}

/// Errors that prevent an engine operation from starting.
///
/// Failures that happen after a cue has started are logged where they occur
/// and never show up here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a cue is already executing")]
    AlreadyExecuting,

    #[error("cue {0} not found")]
    CueNotFound(CueId),

    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("preset {0} not found")]
    PresetNotFound(PresetId),

    #[error("cue {0} has no steps")]
    EmptyCue(CueId),

    #[error("cue {cue_id} cannot be scheduled: {reason}")]
    InvalidCue { cue_id: CueId, reason: String },

    #[error("cue list has no cue at position {0}")]
    CueListBoundary(usize),

    #[error("show store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::AlreadyExecuting => ErrorKind::Conflict,
            EngineError::CueNotFound(_)
            | EngineError::DeviceNotFound(_)
            | EngineError::PresetNotFound(_) => ErrorKind::NotFound,
            EngineError::EmptyCue(_)
            | EngineError::InvalidCue { .. }
            | EngineError::CueListBoundary(_) => ErrorKind::InvalidState,
            EngineError::Store(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Conflict => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidState => 422,
            ErrorKind::Internal => 500,
        }
    }
}
