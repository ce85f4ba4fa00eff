//! Value objects and referenced entities.
//!
//! Identifiers, capacity, the lifecycle state tag, regions, the raw
//! create/update input, and the externally owned [`Account`].

use crate::study::Study;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a study.
///
/// Allocated by the repository in increasing order, so a larger id means a
/// more recently created study.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudyId(u64);

impl StudyId {
    /// Creates a `StudyId` from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(u64);

impl AccountId {
    /// Creates an `AccountId` from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Maximum number of members a study accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Lifecycle state
// ============================================================================

/// Study lifecycle state.
///
/// Only ever advances `Open → Close → End`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudyState {
    /// Accepting applications
    Open,
    /// Running; applications closed
    Close,
    /// Finished
    End,
}

impl StudyState {
    /// Every state, in lifecycle order
    pub const ALL: [Self; 3] = [Self::Open, Self::Close, Self::End];

    /// True for `Open` and `Close`, the states that bind an account.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Close)
    }

    /// Stable code for the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::End => "END",
        }
    }
}

impl fmt::Display for StudyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseCodeError {
    kind: &'static str,
    value: String,
}

impl FromStr for StudyState {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseCodeError {
                kind: "study state",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Zone
// ============================================================================

/// Region where a study meets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Seoul
    Seoul,
    /// Busan
    Busan,
    /// Incheon
    Incheon,
    /// Daegu
    Daegu,
    /// Daejeon
    Daejeon,
    /// Gwangju
    Gwangju,
    /// Ulsan
    Ulsan,
    /// Gyeonggi province
    Gyeonggi,
    /// Jeju
    Jeju,
}

impl Zone {
    /// Every zone
    pub const ALL: [Self; 9] = [
        Self::Seoul,
        Self::Busan,
        Self::Incheon,
        Self::Daegu,
        Self::Daejeon,
        Self::Gwangju,
        Self::Ulsan,
        Self::Gyeonggi,
        Self::Jeju,
    ];

    /// Stable lowercase code for the zone
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seoul => "seoul",
            Self::Busan => "busan",
            Self::Incheon => "incheon",
            Self::Daegu => "daegu",
            Self::Daejeon => "daejeon",
            Self::Gwangju => "gwangju",
            Self::Ulsan => "ulsan",
            Self::Gyeonggi => "gyeonggi",
            Self::Jeju => "jeju",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|zone| zone.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseCodeError {
                kind: "zone",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Create / update input
// ============================================================================

/// Raw input for creating or updating a study.
///
/// Times arrive as `HH:mm` strings and are parsed during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyInput {
    /// Study name
    pub name: String,
    /// Title of the book being read
    pub book_name: String,
    /// Cover image reference for the book
    pub book_image: String,
    /// Free-form description
    pub description: String,
    /// How to reach the admin
    pub contact: String,
    /// Maximum number of members
    pub capacity: Capacity,
    /// First day of the study
    pub start_date: NaiveDate,
    /// Last day of the study
    pub end_date: NaiveDate,
    /// Meeting start time (`HH:mm`)
    pub start_time: String,
    /// Meeting end time (`HH:mm`)
    pub end_time: String,
    /// Weekday the study meets
    pub day: Weekday,
    /// Region the study meets in
    pub zone: Zone,
}

// ============================================================================
// Account (owned by the identity collaborator)
// ============================================================================

/// An account as returned by the identity collaborator.
///
/// `current_study_id` is the denormalized link to the one study the account
/// created or joined; it is updated in the same unit of work as the study's
/// membership set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,
    /// Login email
    pub email: String,
    /// Display name
    pub name: String,
    /// Nickname
    pub nickname: String,
    /// Study this account created or joined, if any
    pub current_study_id: Option<StudyId>,
}

impl Account {
    /// Creates an account with no study link
    #[must_use]
    pub fn new(id: AccountId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: String::new(),
            nickname: String::new(),
            current_study_id: None,
        }
    }

    /// Sets the display name and nickname
    #[must_use]
    pub fn with_names(mut self, name: impl Into<String>, nickname: impl Into<String>) -> Self {
        self.name = name.into();
        self.nickname = nickname.into();
        self
    }

    /// True when this account is the admin of `study`
    #[must_use]
    pub fn is_manager_of(&self, study: &Study) -> bool {
        study.admin() == self.id
    }

    /// True when this account is an enrolled member of `study`
    #[must_use]
    pub fn is_applier_of(&self, study: &Study) -> bool {
        study.is_member(self.id)
    }

    /// True when this account is linked to `study`
    #[must_use]
    pub fn is_linked_to(&self, study: StudyId) -> bool {
        self.current_study_id == Some(study)
    }
}
