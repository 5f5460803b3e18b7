// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cell::CellValue;
use crate::ids::{RowId, TableId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub auxiliary: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub auto_increment_prefix: Option<String>,
}

impl ColumnDef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auxiliary: false,
            auto_increment: false,
            auto_increment_prefix: None,
        }
    }

    pub fn auxiliary(name: impl Into<String>) -> Self {
        Self {
            auxiliary: true,
            ..Self::named(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub table_id: TableId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "data")]
    pub fields: BTreeMap<String, CellValue>,
}

impl Row {
    /// Resolved display text for one field; absent fields render empty.
    pub fn display_field(&self, column: &str) -> String {
        self.fields
            .get(column)
            .map(CellValue::display)
            .unwrap_or_default()
    }

    /// Creation timestamp at date-only precision, as rendered in the grid.
    pub fn created_at_date(&self) -> String {
        format_date_only(self.created_at)
    }

    /// The raw timestamp string the search engine matches against.
    pub fn created_at_raw(&self) -> String {
        self.created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| format_date_only(self.created_at))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    pub items: Vec<Row>,
    pub total: usize,
}

impl RowPage {
    pub fn row_ids(&self) -> Vec<RowId> {
        self.items.iter().map(|row| row.id).collect()
    }
}

pub fn format_date_only(moment: OffsetDateTime) -> String {
    let date = moment.date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[cfg(test)]
mod tests {
    use super::{ColumnDef, Row, format_date_only};
    use crate::cell::CellValue;
    use crate::ids::{RowId, TableId};
    use std::collections::BTreeMap;
    use time::macros::datetime;

    #[test]
    fn date_only_strips_time_of_day() {
        assert_eq!(
            format_date_only(datetime!(2026-03-07 14:45:09 UTC)),
            "2026-03-07"
        );
    }

    #[test]
    fn display_field_handles_absent_columns() {
        let row = Row {
            id: RowId::new(1),
            table_id: TableId::new(1),
            created_at: datetime!(2026-01-05 09:30 UTC),
            fields: BTreeMap::from([("sku".to_owned(), CellValue::text("A100"))]),
        };
        assert_eq!(row.display_field("sku"), "A100");
        assert_eq!(row.display_field("gone"), "");
    }

    #[test]
    fn created_at_raw_keeps_full_timestamp() {
        let row = Row {
            id: RowId::new(1),
            table_id: TableId::new(1),
            created_at: datetime!(2026-01-05 09:30:15 UTC),
            fields: BTreeMap::new(),
        };
        assert_eq!(row.created_at_raw(), "2026-01-05T09:30:15Z");
        assert_eq!(row.created_at_date(), "2026-01-05");
    }

    #[test]
    fn column_constructors_set_flags() {
        assert!(!ColumnDef::named("sku").auxiliary);
        assert!(ColumnDef::auxiliary("notes").auxiliary);
    }
}
