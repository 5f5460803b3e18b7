// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::ids::{RowId, TableId};

pub const HIGHLIGHT_DURATION: Duration = Duration::seconds(6);

/// Single-use handoff record for a cross-table jump. It lives in the durable
/// client store between the emit and consume phases and must be taken with a
/// read-and-clear so a stale intent can never re-trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    pub table_id: TableId,
    pub row_id: RowId,
}

/// Time-bounded row emphasis created when an intent resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightState {
    pub row_id: RowId,
    pub expires_at: OffsetDateTime,
}

impl HighlightState {
    pub fn begin(row_id: RowId, now: OffsetDateTime) -> Self {
        Self {
            row_id,
            expires_at: now + HIGHLIGHT_DURATION,
        }
    }

    pub fn expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Found(RowId),
    Missing,
}

/// Resolve a consumed intent against the freshly loaded page. `Missing`
/// covers a deleted row, a row on another page, and an intent addressed to a
/// different table; all of them degrade silently.
pub fn resolve_intent(
    intent: NavigationIntent,
    active_table: TableId,
    page_rows: &[RowId],
) -> IntentOutcome {
    if intent.table_id != active_table {
        return IntentOutcome::Missing;
    }
    if page_rows.contains(&intent.row_id) {
        IntentOutcome::Found(intent.row_id)
    } else {
        IntentOutcome::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::{HighlightState, IntentOutcome, NavigationIntent, resolve_intent};
    use crate::ids::{RowId, TableId};
    use time::Duration;
    use time::macros::datetime;

    fn intent() -> NavigationIntent {
        NavigationIntent {
            table_id: TableId::new(7),
            row_id: RowId::new(42),
        }
    }

    #[test]
    fn intent_resolves_when_row_is_on_page() {
        let page = [RowId::new(41), RowId::new(42)];
        assert_eq!(
            resolve_intent(intent(), TableId::new(7), &page),
            IntentOutcome::Found(RowId::new(42))
        );
    }

    #[test]
    fn missing_row_and_wrong_table_degrade_silently() {
        let page = [RowId::new(1)];
        assert_eq!(
            resolve_intent(intent(), TableId::new(7), &page),
            IntentOutcome::Missing
        );
        let page = [RowId::new(42)];
        assert_eq!(
            resolve_intent(intent(), TableId::new(9), &page),
            IntentOutcome::Missing
        );
    }

    #[test]
    fn highlight_expires_after_six_seconds() {
        let started = datetime!(2026-01-05 09:30 UTC);
        let highlight = HighlightState::begin(RowId::new(42), started);
        assert!(!highlight.expired(started + Duration::seconds(5)));
        assert!(highlight.expired(started + Duration::seconds(6)));
    }
}
