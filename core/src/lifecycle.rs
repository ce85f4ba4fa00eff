//! Time-driven lifecycle transitions.
//!
//! ```text
//! OPEN ──(today == start_date)──▶ CLOSE ──(today > end_date)──▶ END
//! ```
//!
//! [`transition`] is a pure function of the study and the date: it decides,
//! it does not mutate. Anything that is not exactly one of the two edges
//! above is a no-op, never an error.

use crate::study::Study;
use crate::types::StudyState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One edge of the lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyTransition {
    /// Applications close on the start date
    OpenToClose,
    /// The study finishes the day after its end date
    CloseToEnd,
}

impl StudyTransition {
    /// State the study must be in for this transition to apply
    #[must_use]
    pub const fn from(self) -> StudyState {
        match self {
            Self::OpenToClose => StudyState::Open,
            Self::CloseToEnd => StudyState::Close,
        }
    }

    /// State the study ends up in
    #[must_use]
    pub const fn to(self) -> StudyState {
        match self {
            Self::OpenToClose => StudyState::Close,
            Self::CloseToEnd => StudyState::End,
        }
    }
}

impl fmt::Display for StudyTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from(), self.to())
    }
}

/// Decides which transition, if any, is due for `study` on `today`.
///
/// `Open` closes only on the exact start date; a study whose start date
/// passed without a sweep stays `Open`. `Close` ends on any day strictly
/// after the end date.
#[must_use]
pub fn transition(study: &Study, today: NaiveDate) -> Option<StudyTransition> {
    match study.state() {
        StudyState::Open if today == study.start_date() => Some(StudyTransition::OpenToClose),
        StudyState::Close if today > study.end_date() => Some(StudyTransition::CloseToEnd),
        _ => None,
    }
}

/// Applies the transition due on `today`, returning it.
pub fn advance(study: &mut Study, today: NaiveDate) -> Option<StudyTransition> {
    let due = transition(study, today)?;
    study.apply_transition(due).then_some(due)
}
