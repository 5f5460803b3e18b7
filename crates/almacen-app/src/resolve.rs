// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ColumnDef;

pub const CREATED_AT_KEY: &str = "created_at";
pub const ACTIONS_KEY: &str = "actions";
pub const SELECTION_KEY: &str = "selection";

pub const SELECTION_WIDTH_PX: u16 = 32;
pub const SELECTION_WIDTH_NARROW_PX: u16 = 24;
pub const ACTIONS_WIDTH_PX: u16 = 250;
pub const ACTIONS_WIDTH_NARROW_PX: u16 = 180;

/// One rendered column: two structural columns bracket the schema columns,
/// and the created-at column is injected unless the user hid it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridColumn {
    Selection { width_px: u16 },
    CreatedAt,
    Data(ColumnDef),
    Actions { width_px: u16 },
}

impl GridColumn {
    pub fn key(&self) -> &str {
        match self {
            Self::Selection { .. } => SELECTION_KEY,
            Self::CreatedAt => CREATED_AT_KEY,
            Self::Data(column) => &column.name,
            Self::Actions { .. } => ACTIONS_KEY,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Selection { .. } => "",
            Self::CreatedAt => "created",
            Self::Data(column) => &column.name,
            Self::Actions { .. } => "actions",
        }
    }

    pub fn fixed_width_px(&self) -> Option<u16> {
        match self {
            Self::Selection { width_px } | Self::Actions { width_px } => Some(*width_px),
            Self::CreatedAt | Self::Data(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnPlan {
    pub inline: Vec<GridColumn>,
    pub auxiliary: Vec<GridColumn>,
}

impl ColumnPlan {
    pub fn inline_keys(&self) -> Vec<&str> {
        self.inline.iter().map(GridColumn::key).collect()
    }

    pub fn auxiliary_keys(&self) -> Vec<&str> {
        self.auxiliary.iter().map(GridColumn::key).collect()
    }
}

/// Per-user, per-table visibility toggles, keyed by column name plus the
/// reserved `created_at`/`actions` keys. Absent entries fall back to the
/// schema default (`!auxiliary`; structural columns default visible).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilityOverrides(BTreeMap<String, bool>);

impl VisibilityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self, key: &str, default: bool) -> bool {
        self.0.get(key).copied().unwrap_or(default)
    }

    pub fn effective_visible(&self, column: &ColumnDef) -> bool {
        self.visible(&column.name, !column.auxiliary)
    }

    pub fn set(&mut self, key: &str, visible: bool) {
        self.0.insert(key.to_owned(), visible);
    }

    pub fn toggle(&mut self, key: &str, default: bool) -> bool {
        let next = !self.visible(key, default);
        self.set(key, next);
        next
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(key, visible)| (key.as_str(), *visible))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Partition the schema into inline and auxiliary columns.
///
/// The schema-declared auxiliary flag is authoritative: such a column is never
/// promoted inline, not even on wide viewports. Hidden columns are routed to
/// the auxiliary panel rather than dropped. Pure function; callers persist the
/// overrides separately.
pub fn resolve(
    schema: &[ColumnDef],
    overrides: &VisibilityOverrides,
    viewport_is_narrow: bool,
) -> ColumnPlan {
    let mut plan = ColumnPlan::default();

    plan.inline.push(GridColumn::Selection {
        width_px: if viewport_is_narrow {
            SELECTION_WIDTH_NARROW_PX
        } else {
            SELECTION_WIDTH_PX
        },
    });

    for column in schema {
        if !column.auxiliary && overrides.effective_visible(column) {
            plan.inline.push(GridColumn::Data(column.clone()));
        } else {
            plan.auxiliary.push(GridColumn::Data(column.clone()));
        }
    }

    if overrides.visible(CREATED_AT_KEY, true) {
        plan.inline.push(GridColumn::CreatedAt);
    } else {
        plan.auxiliary.push(GridColumn::CreatedAt);
    }

    let actions = GridColumn::Actions {
        width_px: if viewport_is_narrow {
            ACTIONS_WIDTH_NARROW_PX
        } else {
            ACTIONS_WIDTH_PX
        },
    };
    if overrides.visible(ACTIONS_KEY, true) {
        plan.inline.push(actions);
    } else {
        plan.auxiliary.push(actions);
    }

    plan
}
