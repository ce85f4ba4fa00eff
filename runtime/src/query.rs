//! Read-side queries over the study collection.
//!
//! Listings are newest first. Queries take no locks; they see each study as
//! of its last committed write.

use crate::StudyEnvironment;
use bookclub_core::filter::sort_newest_first;
use bookclub_core::{
    AccountId, Page, PageRequest, Study, StudyError, StudyFilter, StudyId, StudyState,
};
use serde::Serialize;
use tracing::warn;

/// Number of studies per state, plus the overall total
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StudyCounts {
    /// Every study
    pub all: usize,
    /// Studies accepting applications
    pub open: usize,
    /// Running studies
    pub close: usize,
    /// Finished studies
    pub end: usize,
}

/// Public profile of a study member
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    /// Account id
    pub id: AccountId,
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Nickname
    pub nickname: String,
}

/// A study together with the accounts enrolled in it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StudyDetail {
    /// The study
    pub study: Study,
    /// Enrolled members, in ascending id order
    pub members: Vec<MemberSummary>,
}

/// Filtered, paginated and counted listings
#[derive(Clone, Debug)]
pub struct QueryService {
    env: StudyEnvironment,
}

impl QueryService {
    /// Creates the service
    #[must_use]
    pub const fn new(env: StudyEnvironment) -> Self {
        Self { env }
    }

    /// Every study, newest first
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn list_all(&self) -> Result<Vec<Study>, StudyError> {
        let mut studies = self.env.studies.find_all().await?;
        sort_newest_first(&mut studies);
        Ok(studies)
    }

    /// Studies in `state`, newest first
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn list_by_state(&self, state: StudyState) -> Result<Vec<Study>, StudyError> {
        let mut studies = self.env.studies.find_by_state(state).await?;
        sort_newest_first(&mut studies);
        Ok(studies)
    }

    /// Studies whose name contains `fragment`, newest first
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn search_by_name(&self, fragment: &str) -> Result<Vec<Study>, StudyError> {
        let mut studies = self.env.studies.find_by_name_containing(fragment).await?;
        sort_newest_first(&mut studies);
        Ok(studies)
    }

    /// Studies whose name or book name contains `keyword`, newest first.
    ///
    /// An empty keyword lists every study.
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn search_by_keyword(&self, keyword: &str) -> Result<Vec<Study>, StudyError> {
        self.search(&StudyFilter::all().with_keyword(keyword)).await
    }

    /// Studies matching every criterion of `filter`, newest first
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn search(&self, filter: &StudyFilter) -> Result<Vec<Study>, StudyError> {
        Ok(self.env.studies.find_matching(filter).await?)
    }

    /// One page of studies matching `filter`
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn page(
        &self,
        filter: &StudyFilter,
        request: PageRequest,
    ) -> Result<Page<Study>, StudyError> {
        Ok(self.env.studies.find_page(filter, request).await?)
    }

    /// Number of studies matching `filter`, independent of paging
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn count(&self, filter: &StudyFilter) -> Result<usize, StudyError> {
        Ok(self.env.studies.count(filter).await?)
    }

    /// Totals per state and overall
    ///
    /// # Errors
    ///
    /// `Repository` when the backend fails.
    pub async fn counts(&self) -> Result<StudyCounts, StudyError> {
        let (all, open, close, end) = futures::try_join!(
            self.count_state(None),
            self.count_state(Some(StudyState::Open)),
            self.count_state(Some(StudyState::Close)),
            self.count_state(Some(StudyState::End)),
        )?;

        Ok(StudyCounts {
            all,
            open,
            close,
            end,
        })
    }

    /// A study with its members' public profiles.
    ///
    /// Members whose account can no longer be resolved are left out.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` does not exist.
    pub async fn detail(&self, id: StudyId) -> Result<StudyDetail, StudyError> {
        let study = self.env.studies.find_by_id(id).await?;

        let mut members = Vec::new();
        for account_id in study.members() {
            match self.env.accounts.find_by_id(account_id).await {
                Ok(account) => members.push(MemberSummary {
                    id: account.id,
                    name: account.name,
                    email: account.email,
                    nickname: account.nickname,
                }),
                Err(e) => {
                    warn!(
                        study_id = %id,
                        account_id = %account_id,
                        error = %e,
                        "Skipping unresolved member"
                    );
                }
            }
        }

        Ok(StudyDetail { study, members })
    }

    async fn count_state(&self, state: Option<StudyState>) -> Result<usize, StudyError> {
        let filter = StudyFilter {
            state,
            ..StudyFilter::default()
        };
        self.count(&filter).await
    }
}
