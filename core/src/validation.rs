//! Validation rules gating study creation and update.
//!
//! [`validate_create_or_update`] runs four checks in a fixed order and stops
//! at the first failure:
//!
//! 1. `start_date <= today` → [`ValidationError::StartDateInPast`]
//! 2. `start_date > end_date` → [`ValidationError::DateRangeInvalid`]
//! 3. either time not in `HH:mm` → [`ValidationError::TimeParseError`]
//! 4. `start_time > end_time` → [`ValidationError::TimeRangeInvalid`]
//!
//! Equal times and equal dates are accepted; only a strict "after" is
//! rejected. The checks never touch a study, so a failure cannot leave a
//! partial mutation behind.

use crate::error::{AuthorizationError, StateConflictError, ValidationError};
use crate::study::Study;
use crate::types::{Account, Capacity, StudyInput, StudyState, Zone};
use chrono::{NaiveDate, NaiveTime, Weekday};

/// Format accepted for meeting times
pub const TIME_FORMAT: &str = "%H:%M";

/// Study fields that passed [`validate_create_or_update`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedStudy {
    /// Study name
    pub name: String,
    /// Title of the book being read
    pub book_name: String,
    /// Cover image reference
    pub book_image: String,
    /// Free-form description
    pub description: String,
    /// How to reach the admin
    pub contact: String,
    /// Maximum number of members
    pub capacity: Capacity,
    /// First day
    pub start_date: NaiveDate,
    /// Last day
    pub end_date: NaiveDate,
    /// Meeting start time
    pub start_time: NaiveTime,
    /// Meeting end time
    pub end_time: NaiveTime,
    /// Meeting weekday
    pub day: Weekday,
    /// Meeting region
    pub zone: Zone,
}

/// Validates create/update input against `today`.
///
/// # Errors
///
/// Returns the first failing [`ValidationError`], in the order documented at
/// module level.
pub fn validate_create_or_update(
    input: &StudyInput,
    today: NaiveDate,
) -> Result<ValidatedStudy, ValidationError> {
    if input.start_date <= today {
        return Err(ValidationError::StartDateInPast);
    }

    if input.start_date > input.end_date {
        return Err(ValidationError::DateRangeInvalid);
    }

    let start_time = parse_time(&input.start_time)?;
    let end_time = parse_time(&input.end_time)?;

    if start_time > end_time {
        return Err(ValidationError::TimeRangeInvalid);
    }

    Ok(ValidatedStudy {
        name: input.name.clone(),
        book_name: input.book_name.clone(),
        book_image: input.book_image.clone(),
        description: input.description.clone(),
        contact: input.contact.clone(),
        capacity: input.capacity,
        start_date: input.start_date,
        end_date: input.end_date,
        start_time,
        end_time,
        day: input.day,
        zone: input.zone,
    })
}

/// Parses an `HH:mm` time of day.
///
/// # Errors
///
/// Returns [`ValidationError::TimeParseError`] when `value` is not exactly
/// two digits, a colon and two digits, or is not a valid 24-hour time.
pub fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    let error = || ValidationError::TimeParseError {
        value: value.to_string(),
    };

    // chrono accepts single-digit fields, so the shape is checked first.
    let shaped = matches!(
        value.as_bytes(),
        [h1, h2, b':', m1, m2] if [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit())
    );
    if !shaped {
        return Err(error());
    }

    NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| error())
}

/// Rejects a create when the requester is still bound to an active study.
///
/// `current` is the study the requester's `current_study_id` points at, if
/// it still exists.
///
/// # Errors
///
/// Returns [`StateConflictError::AlreadyHasActiveStudy`] when that study is
/// `Open` or `Close`.
pub fn ensure_no_active_study(current: Option<&Study>) -> Result<(), StateConflictError> {
    match current {
        Some(study) if study.state().is_active() => Err(StateConflictError::AlreadyHasActiveStudy),
        _ => Ok(()),
    }
}

/// Rejects an update or delete by anyone other than the study's admin.
///
/// # Errors
///
/// Returns [`AuthorizationError::NotManager`] when `requester` is not the admin.
pub fn ensure_manager(study: &Study, requester: &Account) -> Result<(), AuthorizationError> {
    if requester.is_manager_of(study) {
        Ok(())
    } else {
        Err(AuthorizationError::NotManager)
    }
}

/// Which lifecycle states may still be edited by their admin
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Only `Open` studies may be edited
    #[default]
    OpenOnly,
    /// Any state may be edited
    AnyState,
}

impl UpdatePolicy {
    /// Checks whether a study in `state` may be edited.
    ///
    /// # Errors
    ///
    /// Returns [`StateConflictError::NotEditable`] when the policy forbids it.
    pub const fn ensure_editable(self, state: StudyState) -> Result<(), StateConflictError> {
        match (self, state) {
            (Self::AnyState, _) | (Self::OpenOnly, StudyState::Open) => Ok(()),
            (Self::OpenOnly, state) => Err(StateConflictError::NotEditable { state }),
        }
    }
}
