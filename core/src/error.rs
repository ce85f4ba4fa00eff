//! Error types for study operations.
//!
//! Every rejection is detected synchronously and locally, before any
//! mutation is applied, so an `Err` always means "nothing changed".

use crate::types::StudyState;
use std::fmt;
use thiserror::Error;

/// Kind of entity a lookup failed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A study
    Study,
    /// An account
    Account,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Study => f.write_str("study"),
            Self::Account => f.write_str("account"),
        }
    }
}

/// Create/update input failed a cross-field check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Start date is today or earlier
    #[error("start date must be after today")]
    StartDateInPast,

    /// Start date falls after end date
    #[error("start date must not be after end date")]
    DateRangeInvalid,

    /// Start time falls after end time
    #[error("start time must not be after end time")]
    TimeRangeInvalid,

    /// A time was not in `HH:mm` form
    #[error("time {value:?} is not in HH:mm format")]
    TimeParseError {
        /// The rejected input
        value: String,
    },
}

/// Requester is not allowed to perform the operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Only the study's admin may update or delete it
    #[error("account is not the manager of this study")]
    NotManager,
}

/// Operation would break `enrolled_count <= capacity`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// No seats left
    #[error("study is full")]
    StudyFull,

    /// Update would shrink capacity below current enrollment
    #[error("capacity {capacity} is below the {enrolled} members already enrolled")]
    BelowEnrolled {
        /// Requested capacity
        capacity: u32,
        /// Members currently enrolled
        enrolled: u32,
    },
}

/// Operation conflicts with the current membership or lifecycle state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateConflictError {
    /// Account is already linked to an active study
    #[error("account is already enrolled in a study")]
    AlreadyEnrolled,

    /// Account is not a member of the study
    #[error("account is not enrolled in this study")]
    NotEnrolledBefore,

    /// Account already created or joined an open or closed study
    #[error("account already has an open or closed study")]
    AlreadyHasActiveStudy,

    /// Study no longer accepts applications
    #[error("study is {state} and not accepting applications")]
    NotOpenForApplication {
        /// Current state
        state: StudyState,
    },

    /// Update policy forbids editing a study in this state
    #[error("study is {state} and can no longer be edited")]
    NotEditable {
        /// Current state
        state: StudyState,
    },
}

/// Errors reported by the persistence and identity collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: EntityKind,
        /// Identifier that was looked up
        id: String,
    },

    /// Write conflicted with concurrent state held by the backend
    #[error("repository conflict: {0}")]
    Conflict(String),

    /// Backend failure
    #[error("repository backend error: {0}")]
    Backend(String),
}

/// Single error surface for every study operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudyError {
    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: EntityKind,
        /// Identifier that was looked up
        id: String,
    },

    /// Input failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Requester lacks authority
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// Capacity would be exceeded
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Membership or lifecycle conflict
    #[error(transparent)]
    StateConflict(#[from] StateConflictError),

    /// Collaborator failure
    #[error(transparent)]
    Repository(RepositoryError),
}

/// Flat classification of [`StudyError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity lookup failed
    NotFound,
    /// Input failed validation
    Validation,
    /// Requester lacks authority
    Authorization,
    /// Capacity would be exceeded
    Capacity,
    /// Membership or lifecycle conflict
    StateConflict,
    /// Collaborator failure
    Repository,
}

impl ErrorKind {
    /// Stable label, suitable for metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Capacity => "capacity",
            Self::StateConflict => "state_conflict",
            Self::Repository => "repository",
        }
    }
}

impl StudyError {
    /// Study `id` does not exist
    #[must_use]
    pub fn study_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: EntityKind::Study,
            id: id.to_string(),
        }
    }

    /// Account `id` does not exist
    #[must_use]
    pub fn account_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: EntityKind::Account,
            id: id.to_string(),
        }
    }

    /// Classifies the error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::Repository(_) => ErrorKind::Repository,
        }
    }
}

impl From<RepositoryError> for StudyError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repository(other),
        }
    }
}
