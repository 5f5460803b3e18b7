// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use unicode_width::UnicodeWidthStr;

use crate::model::Row;
use crate::resolve::GridColumn;

pub const MIN_COLUMN_PX: u16 = 100;
pub const MAX_COLUMN_PX: u16 = 500;

const CHAR_PX: u16 = 8;
const TITLE_MARGIN_PX: u16 = 40;
const VALUE_PADDING_PX: u16 = 20;

/// Pixel width of a run of text. Wide (CJK) characters count double, matching
/// the mixed-width data the grid renders.
pub fn text_px(text: &str) -> u16 {
    u16::try_from(text.width())
        .unwrap_or(u16::MAX)
        .saturating_mul(CHAR_PX)
}

/// Estimate a width per estimatable inline column from the current page.
///
/// Structural columns carry fixed widths from the resolver and are skipped.
/// Date cells are measured at their rendered date-only precision, not the raw
/// timestamp. Idempotent; cost is bounded by page size.
pub fn estimate(columns: &[GridColumn], rows: &[Row]) -> BTreeMap<String, u16> {
    let mut widths = BTreeMap::new();
    for column in columns {
        if column.fixed_width_px().is_some() {
            continue;
        }

        let mut width = text_px(column.title()).saturating_add(TITLE_MARGIN_PX);
        for row in rows {
            let text = match column {
                GridColumn::CreatedAt => row.created_at_date(),
                GridColumn::Data(def) => row.display_field(&def.name),
                GridColumn::Selection { .. } | GridColumn::Actions { .. } => continue,
            };
            width = width.max(text_px(&text).saturating_add(VALUE_PADDING_PX));
        }

        widths.insert(
            column.key().to_owned(),
            width.clamp(MIN_COLUMN_PX, MAX_COLUMN_PX),
        );
    }
    widths
}
