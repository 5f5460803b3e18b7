// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

use crate::ids::{RowId, TableId};
use crate::model::Row;

/// One table's search: the live pattern, whether a search is active, and the
/// ids of the matching rows on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSearch {
    pub pattern: String,
    pub active: bool,
    pub matched: Vec<RowId>,
}

impl TableSearch {
    pub fn match_count(&self) -> usize {
        self.matched.len()
    }
}

/// Per-table search states. Each table keeps its own pattern and result set;
/// switching tables never leaks or clears another table's search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchStates(BTreeMap<TableId, TableSearch>);

impl SearchStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table_id: TableId) -> Option<&TableSearch> {
        self.0.get(&table_id)
    }

    pub fn active(&self, table_id: TableId) -> Option<&TableSearch> {
        self.get(table_id).filter(|search| search.active)
    }

    pub fn state_mut(&mut self, table_id: TableId) -> &mut TableSearch {
        self.0.entry(table_id).or_default()
    }

    /// Run `pattern` against the page and record the result. An invalid
    /// pattern is a recoverable error: the previous state is left untouched.
    pub fn apply(&mut self, table_id: TableId, pattern: &str, rows: &[Row]) -> Result<usize> {
        let matched = run_search(pattern, rows)?;
        let count = matched.len();
        let state = self.state_mut(table_id);
        state.pattern = pattern.to_owned();
        state.active = true;
        state.matched = matched;
        Ok(count)
    }

    /// Recompute an active search against a freshly loaded page. The pattern
    /// was valid when applied, so a compile failure here deactivates rather
    /// than erroring.
    pub fn refresh(&mut self, table_id: TableId, rows: &[Row]) {
        let Some(state) = self.0.get_mut(&table_id) else {
            return;
        };
        if !state.active {
            return;
        }
        match run_search(&state.pattern, rows) {
            Ok(matched) => state.matched = matched,
            Err(_) => {
                state.active = false;
                state.matched.clear();
            }
        }
    }

    pub fn clear(&mut self, table_id: TableId) {
        self.0.remove(&table_id);
    }
}

pub fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid search pattern {pattern:?}"))
}

/// A row matches when any field's resolved display text matches, or the raw
/// creation timestamp does. Link targets are never searched.
pub fn row_matches(regex: &Regex, row: &Row) -> bool {
    row.fields
        .values()
        .any(|cell| regex.is_match(&cell.display()))
        || regex.is_match(&row.created_at_raw())
}

pub fn run_search(pattern: &str, rows: &[Row]) -> Result<Vec<RowId>> {
    let regex = compile(pattern)?;
    Ok(rows
        .iter()
        .filter(|row| row_matches(&regex, row))
        .map(|row| row.id)
        .collect())
}

/// Byte ranges of pattern matches inside rendered display text, recomputed
/// from the live pattern. The stored value is never altered; rendering wraps
/// these spans only.
pub fn highlight_spans(pattern: &str, text: &str) -> Vec<(usize, usize)> {
    let Ok(regex) = compile(pattern) else {
        return Vec::new();
    };
    regex
        .find_iter(text)
        .filter(|found| !found.is_empty())
        .map(|found| (found.start(), found.end()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SearchStates, highlight_spans, run_search};
    use crate::cell::CellValue;
    use crate::ids::{RowId, TableId};
    use crate::model::Row;
    use anyhow::Result;
    use time::macros::datetime;

    fn row(id: i64, fields: &[(&str, CellValue)]) -> Row {
        Row {
            id: RowId::new(id),
            table_id: TableId::new(1),
            created_at: datetime!(2026-02-11 08:00 UTC),
            fields: fields
                .iter()
                .map(|(name, value)| ((*name).to_owned(), value.clone()))
                .collect(),
        }
    }

    fn matched(rows: &[Row], pattern: &str) -> Vec<i64> {
        run_search(pattern, rows)
            .expect("valid pattern")
            .iter()
            .map(|id| id.get())
            .collect()
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let rows = [
            row(1, &[("name", CellValue::text("Torque Wrench"))]),
            row(2, &[("name", CellValue::text("Socket Set"))]),
        ];
        assert_eq!(matched(&rows, "torque"), vec![1]);
        assert_eq!(matched(&rows, "SET"), vec![2]);
    }

    #[test]
    fn regex_patterns_are_supported() {
        let rows = [
            row(1, &[("sku", CellValue::text("A-100"))]),
            row(2, &[("sku", CellValue::text("B-200"))]),
        ];
        assert_eq!(matched(&rows, "^a-[0-9]+$"), vec![1]);
    }

    #[test]
    fn link_cells_match_on_text_never_target() {
        let rows = [row(
            1,
            &[("vendor", CellValue::text("Acme").with_link("https://secret-host.example"))],
        )];
        assert_eq!(matched(&rows, "acme"), vec![1]);
        assert!(matched(&rows, "secret-host").is_empty());
    }

    #[test]
    fn creation_timestamp_matches_in_raw_form() {
        let rows = [row(1, &[("name", CellValue::text("widget"))])];
        assert_eq!(matched(&rows, "2026-02-11"), vec![1]);
    }

    #[test]
    fn invalid_pattern_is_recoverable_and_keeps_prior_results() -> Result<()> {
        let table = TableId::new(4);
        let rows = [row(1, &[("name", CellValue::text("widget"))])];
        let mut states = SearchStates::new();
        states.apply(table, "widget", &rows)?;

        let error = states.apply(table, "wid(", &rows);
        assert!(error.is_err());

        let state = states.get(table).expect("state retained");
        assert_eq!(state.pattern, "widget");
        assert!(state.active);
        assert_eq!(state.matched, vec![RowId::new(1)]);
        Ok(())
    }

    #[test]
    fn searches_are_isolated_per_table() -> Result<()> {
        let rows_a = [row(1, &[("name", CellValue::text("abc item"))])];
        let rows_b = [row(9, &[("name", CellValue::text("xyz item"))])];
        let (table_a, table_b) = (TableId::new(1), TableId::new(2));

        let mut states = SearchStates::new();
        states.apply(table_b, "xyz", &rows_b)?;
        states.apply(table_a, "abc", &rows_a)?;

        let b = states.get(table_b).expect("table b state");
        assert_eq!(b.pattern, "xyz");
        assert_eq!(b.matched, vec![RowId::new(9)]);

        states.clear(table_a);
        assert!(states.get(table_a).is_none());
        assert!(states.active(table_b).is_some());
        Ok(())
    }

    #[test]
    fn refresh_recomputes_against_the_new_page() -> Result<()> {
        let table = TableId::new(1);
        let mut states = SearchStates::new();
        states.apply(table, "bolt", &[row(1, &[("name", CellValue::text("bolt"))])])?;

        states.refresh(
            table,
            &[
                row(5, &[("name", CellValue::text("Bolt M8"))]),
                row(6, &[("name", CellValue::text("washer"))]),
            ],
        );
        assert_eq!(
            states.get(table).expect("state").matched,
            vec![RowId::new(5)]
        );
        Ok(())
    }

    #[test]
    fn search_is_page_scoped_by_design() {
        // Only the fetched page is searched; rows on other pages are simply
        // not found. Preserved behavior, not a bug.
        let fetched_page = [row(1, &[("name", CellValue::text("hammer"))])];
        assert!(matched(&fetched_page, "drill").is_empty());
    }

    #[test]
    fn highlight_spans_cover_matches_only() {
        assert_eq!(highlight_spans("o", "tool root"), vec![(1, 2), (2, 3), (6, 7), (7, 8)]);
        assert_eq!(highlight_spans("xyz", "tool"), Vec::<(usize, usize)>::new());
        assert_eq!(highlight_spans("boom(", "boom"), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn empty_fields_do_not_match_everything() {
        let rows = [row(1, &[("name", CellValue::null())])];
        assert!(matched(&rows, "anything").is_empty());
    }
}
