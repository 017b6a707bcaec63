use thiserror::Error;

use crate::record::{HabitId, TimeGroup};

/// Failures in parsing or validating record data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HabitError {
    #[error("malformed date `{0}`")]
    MalformedDate(String),
    #[error("malformed time of day `{0}`")]
    MalformedTime(String),
    #[error("unknown weekday code `{0}`")]
    UnknownWeekday(String),
    #[error("habit action label must not be empty")]
    EmptyAction,
}

/// Structural chain failures. None of these leave the chain modified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("habit `{0}` not found")]
    NotFound(HabitId),
    #[error("habit `{id}` not found in the {group} group")]
    NotInGroup { id: HabitId, group: TimeGroup },
    #[error("habit `{0}` already exists")]
    DuplicateId(HabitId),
    #[error(transparent)]
    Invalid(#[from] HabitError),
}

impl ChainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound(_) | ChainError::NotInGroup { .. })
    }
}
