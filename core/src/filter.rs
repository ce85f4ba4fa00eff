//! Filter criteria and pagination values for study queries.
//!
//! A [`StudyFilter`] combines its criteria with logical AND. Repositories
//! may translate it into a storage query; [`StudyFilter::matches`] is the
//! reference semantics every backend must agree with.

use crate::study::Study;
use crate::types::StudyState;
use serde::{Deserialize, Serialize};

/// Criteria for listing studies
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyFilter {
    /// Only studies in this state
    pub state: Option<StudyState>,
    /// Substring of the study name or book name
    pub keyword: Option<String>,
    /// Exact book name
    pub book_title: Option<String>,
}

impl StudyFilter {
    /// Matches every study
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to `state`
    #[must_use]
    pub fn with_state(mut self, state: StudyState) -> Self {
        self.state = Some(state);
        self
    }

    /// Restricts to studies whose name or book name contains `keyword`.
    ///
    /// An empty keyword clears the restriction.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.keyword = (!keyword.is_empty()).then_some(keyword);
        self
    }

    /// Restricts to studies reading exactly `title`
    #[must_use]
    pub fn with_book_title(mut self, title: impl Into<String>) -> Self {
        self.book_title = Some(title.into());
        self
    }

    /// True when `study` satisfies every supplied criterion
    #[must_use]
    pub fn matches(&self, study: &Study) -> bool {
        let state_ok = self.state.is_none_or(|state| study.state() == state);

        let keyword_ok = self
            .keyword
            .as_deref()
            .filter(|k| !k.is_empty())
            .is_none_or(|k| study.name().contains(k) || study.book_name().contains(k));

        let title_ok = self
            .book_title
            .as_deref()
            .is_none_or(|title| study.book_name() == title);

        state_ok && keyword_ok && title_ok
    }
}

/// A window into an ordered result set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of matching items to skip
    pub offset: usize,
    /// Maximum number of items to return
    pub size: usize,
}

impl PageRequest {
    /// Page of `size` items starting at `offset`
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// The zero-based page `number` of `size` items
    #[must_use]
    pub const fn page(number: usize, size: usize) -> Self {
        Self {
            offset: number.saturating_mul(size),
            size,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 10)
    }
}

/// One page of results plus the total match count
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Matches across all pages
    pub total: usize,
    /// Offset this page starts at
    pub offset: usize,
    /// Requested page size
    pub size: usize,
}

impl<T> Page<T> {
    /// True when more matches follow this page
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }

    /// Converts the items, keeping the paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Orders studies most recently created first
pub fn sort_newest_first(studies: &mut [Study]) {
    studies.sort_by(|a, b| b.id().cmp(&a.id()));
}

/// Filters, orders newest first and cuts one page out of `studies`.
///
/// Shared by in-memory backends so their paging matches the reference
/// semantics exactly.
#[must_use]
pub fn paginate(
    studies: impl IntoIterator<Item = Study>,
    filter: &StudyFilter,
    request: PageRequest,
) -> Page<Study> {
    let mut matching: Vec<Study> = studies.into_iter().filter(|s| filter.matches(s)).collect();
    sort_newest_first(&mut matching);

    let total = matching.len();
    let items = matching
        .into_iter()
        .skip(request.offset)
        .take(request.size)
        .collect();

    Page {
        items,
        total,
        offset: request.offset,
        size: request.size,
    }
}
