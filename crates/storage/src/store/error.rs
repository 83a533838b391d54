#![forbid(unsafe_code)]

use gv_core::ids::ActorIdError;
use gv_core::{TagError, TagLimitError};

const RESET_REQUIRED_PREFIX: &str = "RESET_REQUIRED";

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Storage(rusqlite::Error),
    NotFound(&'static str),
    InvalidState(&'static str),
    Conflict(&'static str),
    Validation(&'static str),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Storage(_) => "STORAGE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(message) if message.starts_with(RESET_REQUIRED_PREFIX) => {
                RESET_REQUIRED_PREFIX
            }
            Self::Validation(_) => "VALIDATION",
        }
    }

    /// Storage failures are transient from the engine's point of view; the
    /// caller decides whether to retry. Everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Storage(err) => write!(f, "sqlite: {err}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Validation(message) => write!(f, "validation: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<ActorIdError> for StoreError {
    fn from(value: ActorIdError) -> Self {
        Self::Validation(value.message())
    }
}

impl From<TagError> for StoreError {
    fn from(value: TagError) -> Self {
        Self::Validation(value.message())
    }
}

impl From<TagLimitError> for StoreError {
    fn from(value: TagLimitError) -> Self {
        Self::Validation(value.message())
    }
}
