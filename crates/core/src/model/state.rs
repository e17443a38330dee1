use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle shared by modules, lessons, and courses.
///
/// `NotStarted` is the absence of a stored record; the other two states are
/// carried by a record's `is_completed` flag. `Completed` is terminal for a
/// fixed catalog membership; there is no "uncomplete" operation at any
/// level, only reopening through catalog growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressState {
    /// State of a stored record with the given completion flag.
    #[must_use]
    pub fn of_record(is_completed: bool) -> Self {
        if is_completed {
            Self::Completed
        } else {
            Self::InProgress
        }
    }

    /// State for a (user, unit) pair with no stored record.
    #[must_use]
    pub fn absent() -> Self {
        Self::NotStarted
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_state_follows_flag() {
        assert_eq!(ProgressState::of_record(false), ProgressState::InProgress);
        assert_eq!(ProgressState::of_record(true), ProgressState::Completed);
        assert_eq!(ProgressState::absent(), ProgressState::NotStarted);
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(ProgressState::NotStarted.to_string(), "not_started");
        assert_eq!(ProgressState::Completed.to_string(), "completed");
    }
}
