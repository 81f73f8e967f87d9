//! Free-text search and data-type filtering over table rows
//!
//! There is no persistent index: every evaluation is a linear scan over all
//! rows and cells. Callers debounce evaluation while the user is typing.

use crate::core::{Row, RowId};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{trace, warn};

/// Result of a search evaluation
///
/// `Unfiltered` means no predicate is active and every row is shown. It is
/// distinct from `Matches` with an empty set, which hides every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SearchOutcome {
    #[default]
    Unfiltered,
    Matches(HashSet<RowId>),
}

impl SearchOutcome {
    pub fn contains(&self, id: &RowId) -> bool {
        match self {
            SearchOutcome::Unfiltered => true,
            SearchOutcome::Matches(ids) => ids.contains(id),
        }
    }

    /// Rows of `rows` admitted by this outcome, in their original order
    pub fn apply<'a>(&self, rows: &'a [Row]) -> Vec<&'a Row> {
        rows.iter().filter(|row| self.contains(&row.id)).collect()
    }
}

/// Search parameters for a single evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Literal text, matched case-insensitively against every cell
    pub text: String,
    /// Exact value the type-bearing cell must have
    pub type_filter: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, type_filter: Option<String>) -> Self {
        Self {
            text: text.into(),
            type_filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.type_filter.is_none()
    }
}

/// Service for row search operations
pub struct SearchService;

impl SearchService {
    /// Compute the ids of the rows matching both the query and the type filter
    ///
    /// `type_column` is the position of the type-bearing cell.
    pub fn search(rows: &[Row], query: &SearchQuery, type_column: usize) -> SearchOutcome {
        if query.is_empty() {
            return SearchOutcome::Unfiltered;
        }

        let matcher = match Self::build_matcher(query.text.trim()) {
            Ok(matcher) => matcher,
            Err(e) => {
                // Escaped input only fails on size limits
                warn!("Search pattern rejected: {e}");
                return SearchOutcome::Matches(HashSet::new());
            }
        };
        let type_filter = query.type_filter.as_deref();

        let ids: HashSet<RowId> = rows
            .iter()
            .filter(|row| Self::matches_type(row, type_filter, type_column))
            .filter(|row| match &matcher {
                Some(re) => row.cells.iter().any(|cell| re.is_match(cell)),
                None => true,
            })
            .map(|row| row.id.clone())
            .collect();

        trace!(
            query = %query.text,
            type_filter = ?query.type_filter,
            matched = ids.len(),
            total = rows.len(),
            "Evaluated search"
        );
        SearchOutcome::Matches(ids)
    }

    /// Case-insensitive literal matcher; `None` when the text is empty
    fn build_matcher(text: &str) -> Result<Option<Regex>, regex::Error> {
        if text.is_empty() {
            return Ok(None);
        }
        RegexBuilder::new(&regex::escape(text))
            .case_insensitive(true)
            .build()
            .map(Some)
    }

    fn matches_type(row: &Row, type_filter: Option<&str>, type_column: usize) -> bool {
        match type_filter {
            None => true,
            Some(expected) => row.cells.get(type_column).is_some_and(|cell| cell == expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<Row> {
        vec![
            Row::new("0", vec!["Likes".into(), "Apple".into()]),
            Row::new("1", vec!["Shares".into(), "banana".into()]),
            Row::new("2", vec!["Likes".into(), "a+b (c)".into()]),
            Row::new("3", vec!["Shares".into(), "PINEAPPLE".into()]),
        ]
    }

    fn matched(outcome: SearchOutcome) -> Vec<String> {
        let SearchOutcome::Matches(ids) = outcome else {
            panic!("expected a filtered outcome");
        };
        let mut ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_empty_query_is_unfiltered() {
        assert_eq!(
            SearchService::search(&rows(), &SearchQuery::new("", None), 0),
            SearchOutcome::Unfiltered
        );
        assert_eq!(
            SearchService::search(&rows(), &SearchQuery::new("  \t", None), 0),
            SearchOutcome::Unfiltered
        );
    }

    #[test]
    fn test_case_insensitive_substring() {
        let rows = vec![
            Row::new("0", vec!["Apple".into()]),
            Row::new("1", vec!["banana".into()]),
        ];
        let outcome = SearchService::search(&rows, &SearchQuery::new("APPLE", None), 0);
        assert_eq!(matched(outcome), vec!["0"]);
    }

    #[test]
    fn test_substring_matches_inside_cells() {
        let outcome = SearchService::search(&rows(), &SearchQuery::new("apple", None), 0);
        assert_eq!(matched(outcome), vec!["0", "3"]);
    }

    #[test]
    fn test_query_is_literal() {
        let outcome = SearchService::search(&rows(), &SearchQuery::new("a+b (", None), 0);
        assert_eq!(matched(outcome), vec!["2"]);

        let outcome = SearchService::search(&rows(), &SearchQuery::new(".*", None), 0);
        assert!(matched(outcome).is_empty());
    }

    #[test]
    fn test_type_filter_exact() {
        let outcome = SearchService::search(&rows(), &SearchQuery::new("", Some("Likes".into())), 0);
        assert_eq!(matched(outcome), vec!["0", "2"]);

        let outcome = SearchService::search(&rows(), &SearchQuery::new("", Some("likes".into())), 0);
        assert!(matched(outcome).is_empty());
    }

    #[test]
    fn test_query_and_type_filter_combine() {
        let outcome = SearchService::search(
            &rows(),
            &SearchQuery::new("apple", Some("Shares".into())),
            0,
        );
        assert_eq!(matched(outcome), vec!["3"]);
    }

    #[test]
    fn test_whitespace_query_filters_by_type_only() {
        let outcome = SearchService::search(
            &rows(),
            &SearchQuery::new("   ", Some("Likes".into())),
            0,
        );
        assert_eq!(matched(outcome), vec!["0", "2"]);
    }

    #[test]
    fn test_type_column_out_of_range_matches_nothing() {
        let outcome = SearchService::search(&rows(), &SearchQuery::new("", Some("Likes".into())), 9);
        assert!(matched(outcome).is_empty());
    }

    #[test]
    fn test_outcome_apply_keeps_order() {
        let rows = rows();
        let outcome = SearchService::search(&rows, &SearchQuery::new("a", None), 0);
        let visible: Vec<&str> = outcome.apply(&rows).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(visible, vec!["0", "1", "2", "3"]);

        assert_eq!(SearchOutcome::Unfiltered.apply(&rows).len(), 4);
    }
}
