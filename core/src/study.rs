//! The study aggregate.
//!
//! A [`Study`] owns its membership set and keeps `enrolled_count` equal to
//! the set's size and never above capacity. Fields are private so every
//! mutation goes through a method that checks first and mutates second.

use crate::error::{CapacityError, StateConflictError, StudyError};
use crate::lifecycle::StudyTransition;
use crate::types::{Account, AccountId, Capacity, StudyId, StudyState, Zone};
use crate::validation::ValidatedStudy;
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A time-boxed, capacity-limited group activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    id: StudyId,
    name: String,
    book_name: String,
    book_image: String,
    admin: AccountId,
    admin_email: String,
    description: String,
    contact: String,
    capacity: Capacity,
    enrolled_count: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    day: Weekday,
    zone: Zone,
    state: StudyState,
    members: BTreeSet<AccountId>,
}

impl Study {
    /// Builds a new study from validated input.
    ///
    /// The creating account becomes admin; the study starts `Open` with no
    /// members.
    #[must_use]
    pub fn create(id: StudyId, details: ValidatedStudy, admin: &Account) -> Self {
        Self {
            id,
            name: details.name,
            book_name: details.book_name,
            book_image: details.book_image,
            admin: admin.id,
            admin_email: admin.email.clone(),
            description: details.description,
            contact: details.contact,
            capacity: details.capacity,
            enrolled_count: 0,
            start_date: details.start_date,
            end_date: details.end_date,
            start_time: details.start_time,
            end_time: details.end_time,
            day: details.day,
            zone: details.zone,
            state: StudyState::Open,
            members: BTreeSet::new(),
        }
    }

    // ========== Accessors ==========

    /// Study identifier
    #[must_use]
    pub const fn id(&self) -> StudyId {
        self.id
    }

    /// Study name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Title of the book being read
    #[must_use]
    pub fn book_name(&self) -> &str {
        &self.book_name
    }

    /// Cover image reference
    #[must_use]
    pub fn book_image(&self) -> &str {
        &self.book_image
    }

    /// Admin account
    #[must_use]
    pub const fn admin(&self) -> AccountId {
        self.admin
    }

    /// Admin's email at creation time
    #[must_use]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Free-form description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// How to reach the admin
    #[must_use]
    pub fn contact(&self) -> &str {
        &self.contact
    }

    /// Maximum number of members
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Members currently enrolled
    #[must_use]
    pub const fn enrolled_count(&self) -> u32 {
        self.enrolled_count
    }

    /// First day
    #[must_use]
    pub const fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last day
    #[must_use]
    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Meeting start time
    #[must_use]
    pub const fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    /// Meeting end time
    #[must_use]
    pub const fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    /// Meeting weekday
    #[must_use]
    pub const fn day(&self) -> Weekday {
        self.day
    }

    /// Meeting region
    #[must_use]
    pub const fn zone(&self) -> Zone {
        self.zone
    }

    /// Lifecycle state
    #[must_use]
    pub const fn state(&self) -> StudyState {
        self.state
    }

    /// Enrolled members, in ascending id order
    pub fn members(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.members.iter().copied()
    }

    // ========== Queries ==========

    /// True when `account` is an enrolled member
    #[must_use]
    pub fn is_member(&self, account: AccountId) -> bool {
        self.members.contains(&account)
    }

    /// True when `account` is the admin
    #[must_use]
    pub fn is_admin(&self, account: AccountId) -> bool {
        self.admin == account
    }

    /// True when no seats are left
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.enrolled_count >= self.capacity.value()
    }

    /// Seats still available
    #[must_use]
    pub const fn remaining_seats(&self) -> u32 {
        self.capacity.value().saturating_sub(self.enrolled_count)
    }

    /// True once `today` has reached the start date.
    ///
    /// Gates member-facing actions; it is not itself a state transition.
    #[must_use]
    pub fn is_already_started(&self, today: NaiveDate) -> bool {
        today >= self.start_date
    }

    /// True while the study is `Open` and has seats left
    #[must_use]
    pub const fn is_open_for_application(&self) -> bool {
        matches!(self.state, StudyState::Open) && !self.is_full()
    }

    /// True once the study has left `Open`
    #[must_use]
    pub const fn is_not_opened(&self) -> bool {
        !matches!(self.state, StudyState::Open)
    }

    // ========== Mutations ==========

    /// Enrolls `account`.
    ///
    /// # Errors
    ///
    /// - [`CapacityError::StudyFull`] when no seats are left
    /// - [`StateConflictError::AlreadyEnrolled`] when `account` is already a member
    pub fn add_member(&mut self, account: AccountId) -> Result<(), StudyError> {
        if self.is_full() {
            return Err(CapacityError::StudyFull.into());
        }

        if self.is_member(account) {
            return Err(StateConflictError::AlreadyEnrolled.into());
        }

        self.members.insert(account);
        self.enrolled_count += 1;
        Ok(())
    }

    /// Removes `account` from the members.
    ///
    /// # Errors
    ///
    /// Returns [`StateConflictError::NotEnrolledBefore`] when `account` is not a member.
    pub fn remove_member(&mut self, account: AccountId) -> Result<(), StudyError> {
        if !self.members.remove(&account) {
            return Err(StateConflictError::NotEnrolledBefore.into());
        }

        self.enrolled_count = self.enrolled_count.saturating_sub(1);
        Ok(())
    }

    /// Replaces the editable fields with validated input.
    ///
    /// Identity, admin, state and membership are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::BelowEnrolled`] when the new capacity is
    /// smaller than the current enrollment; nothing is changed in that case.
    pub fn update_with(&mut self, details: ValidatedStudy) -> Result<(), StudyError> {
        if details.capacity.value() < self.enrolled_count {
            return Err(CapacityError::BelowEnrolled {
                capacity: details.capacity.value(),
                enrolled: self.enrolled_count,
            }
            .into());
        }

        self.name = details.name;
        self.book_name = details.book_name;
        self.book_image = details.book_image;
        self.description = details.description;
        self.contact = details.contact;
        self.capacity = details.capacity;
        self.start_date = details.start_date;
        self.end_date = details.end_date;
        self.start_time = details.start_time;
        self.end_time = details.end_time;
        self.day = details.day;
        self.zone = details.zone;
        Ok(())
    }

    /// Sets the state to the transition's target.
    ///
    /// Does nothing unless the study is currently in the transition's source
    /// state, so state can never regress or skip.
    pub fn apply_transition(&mut self, transition: StudyTransition) -> bool {
        if self.state != transition.from() {
            return false;
        }

        self.state = transition.to();
        true
    }
}
