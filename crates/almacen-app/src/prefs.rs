// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;

use crate::ids::TableId;
use crate::nav::NavigationIntent;
use crate::resolve::VisibilityOverrides;

/// Durable client-side key-value state, injected into the grid rather than
/// hidden behind a global. Implementations are constructed for one user and
/// namespace their keys by (user, table) internally.
///
/// Lifecycle: overrides are written on every toggle and never deleted; the
/// navigation intent is strictly single-use via `take_intent`; search text is
/// written on every applied search.
pub trait ClientStore {
    fn load_overrides(&mut self, table_id: TableId) -> Result<VisibilityOverrides>;

    fn save_overrides(
        &mut self,
        table_id: TableId,
        overrides: &VisibilityOverrides,
    ) -> Result<()>;

    fn store_intent(&mut self, intent: &NavigationIntent) -> Result<()>;

    /// Atomic read-and-clear. Whatever the caller does with the returned
    /// intent, it is already gone from the store.
    fn take_intent(&mut self) -> Result<Option<NavigationIntent>>;

    fn load_search_text(&mut self, table_id: TableId) -> Result<Option<String>>;

    fn save_search_text(&mut self, table_id: TableId, text: &str) -> Result<()>;
}
