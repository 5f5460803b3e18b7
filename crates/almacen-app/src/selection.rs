// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::ids::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickModifiers {
    Plain,
    Shift,
    Ctrl,
}

/// Multi-row selection over the current page. Reset whenever the page is
/// replaced; the anchor index is only valid against the page it was set on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    selected: BTreeSet<RowId>,
    last_touched: Option<usize>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &BTreeSet<RowId> {
        &self.selected
    }

    pub fn ids(&self) -> Vec<RowId> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, row_id: RowId) -> bool {
        self.selected.contains(&row_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<usize> {
        self.last_touched
    }

    pub fn reset(&mut self) {
        self.selected.clear();
        self.last_touched = None;
    }

    /// Shift takes range semantics, ctrl/cmd additive-toggle, and a plain
    /// click funnels through the same additive path, so checking one more row
    /// never clears an existing multi-selection.
    pub fn click(&mut self, page: &[RowId], row_id: RowId, index: usize, modifiers: ClickModifiers) {
        match modifiers {
            ClickModifiers::Shift => self.range_select(page, row_id, index),
            ClickModifiers::Ctrl => self.additive_toggle(row_id, index),
            ClickModifiers::Plain => self.toggle(row_id, index),
        }
    }

    pub fn toggle(&mut self, row_id: RowId, index: usize) {
        if !self.selected.remove(&row_id) {
            self.selected.insert(row_id);
        }
        self.last_touched = Some(index);
    }

    pub fn additive_toggle(&mut self, row_id: RowId, index: usize) {
        self.toggle(row_id, index);
    }

    /// Replace the selection with the contiguous index range between the
    /// anchor and `index` in page order. Without an anchor this degrades to a
    /// plain toggle.
    pub fn range_select(&mut self, page: &[RowId], row_id: RowId, index: usize) {
        let Some(anchor) = self.last_touched else {
            self.toggle(row_id, index);
            return;
        };

        let start = anchor.min(index).min(page.len());
        let end = anchor.max(index).min(page.len().saturating_sub(1));
        self.selected = page
            .get(start..=end)
            .unwrap_or_default()
            .iter()
            .copied()
            .collect();
        self.last_touched = Some(index);
    }

    /// Toggle the whole current page: everything selected clears, anything
    /// else selects the full page. Never reaches beyond the page.
    pub fn select_all(&mut self, page: &[RowId]) {
        if !page.is_empty() && page.iter().all(|id| self.selected.contains(id)) {
            self.selected.clear();
        } else {
            self.selected = page.iter().copied().collect();
        }
    }
}
