use crate::model::file_entry::Path;

/// The sub state machine only ever fails one way: an event referenced a path that isn't the
/// one currently being uploaded.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unexpected file path: expected {expected:?}, got {got:?}")]
pub struct InvalidFileError {
    pub expected: Option<Path>,
    pub got: Path,
}

/// Raised when an event is delivered to [`crate::fusm::FilesUploadSm`] while it is in a state
/// that does not accept it. The transition table is total over the states it lists; this only
/// fires if a caller (executor, supervisor-driven retry) violates the protocol.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FusmError {
    #[error("invalid file in sub state machine: {0}")]
    InvalidFile(#[from] InvalidFileError),
    #[error("event {event} is not valid in state {state}")]
    InvalidTransition { event: &'static str, state: &'static str },
}
