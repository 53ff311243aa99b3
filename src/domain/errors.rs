//! Domain errors - Recoverable call failures and fatal runtime faults

use crate::domain::value_objects::{ChoiceId, FunctionIndex, GroupId, ItemId, LocationId, VariableName};
use thiserror::Error;

/// Errors returned by runtime operations
///
/// Everything except [`MpalError::Fatal`] is a recoverable violation of a
/// call's preconditions and is returned to the immediate caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MpalError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("item {item} is not active")]
    NotActive { item: ItemId },

    #[error("an action is already in progress on item {item}")]
    ActionInProgress { item: ItemId },

    #[error("a dialog is already running")]
    AlreadyRunning,

    #[error("location {location} is already being polled")]
    AlreadyPolling { location: LocationId },

    #[error("location {location} is not being polled")]
    NotPolling { location: LocationId },

    #[error("all {capacity} polling slots are in use")]
    LimitExceeded { capacity: usize },

    #[error("data {data} is not an active selection of choice {choice}")]
    InvalidSelection { choice: ChoiceId, data: i32 },

    #[error("save state size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("save state record {index} is '{actual}', expected '{expected}'")]
    StateMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

/// Faults that leave the runtime in an unusable state
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FatalError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(VariableName),

    #[error("unknown custom function {0}")]
    UnknownFunction(FunctionIndex),

    #[error("unknown dialog group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown dialog choice {0}")]
    UnknownChoice(ChoiceId),

    #[error("malformed command stream: {0}")]
    MalformedCommand(String),

    #[error("expression evaluation failed: {0}")]
    Evaluation(String),

    #[error("consistency error: {0}")]
    Consistency(String),
}

impl MpalError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::Fatal(FatalError::Consistency(reason.into()))
    }

    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Fatal(FatalError::Evaluation(reason.into()))
    }

    pub fn unknown_variable(name: impl Into<VariableName>) -> Self {
        Self::Fatal(FatalError::UnknownVariable(name.into()))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(MpalError::consistency("bad").is_fatal());
        assert!(MpalError::from(FatalError::UnknownFunction(FunctionIndex::new(9))).is_fatal());
        assert!(!MpalError::AlreadyRunning.is_fatal());
        assert!(!MpalError::not_found("item 3").is_fatal());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = MpalError::InvalidSelection {
            choice: ChoiceId::new(4),
            data: 11,
        };
        assert_eq!(err.to_string(), "data 11 is not an active selection of choice 4");

        let err = MpalError::unknown_variable("Flag.9");
        assert_eq!(err.to_string(), "fatal: unknown variable 'Flag.9'");
    }
}
