// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use url::Url;

use crate::cell::CellValue;
use crate::ids::{RowId, TableId};
use crate::model::{ColumnDef, Row};

/// One editable field of the record form. `keep_link` is derived from the
/// cell's link presence at the moment the form opens and governs whether a
/// text edit carries the link target forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    pub column: String,
    pub value: String,
    pub auto_increment: bool,
    pub had_link: bool,
    pub keep_link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForm {
    pub table_id: TableId,
    pub row_id: Option<RowId>,
    pub fields: Vec<FieldInput>,
}

impl RecordForm {
    /// Blank form for a new row. Auto-increment columns are generated by the
    /// data service and never offered for input.
    pub fn for_new(table_id: TableId, schema: &[ColumnDef]) -> Self {
        let fields = schema
            .iter()
            .filter(|column| !column.auto_increment)
            .map(|column| FieldInput {
                column: column.name.clone(),
                value: String::new(),
                auto_increment: false,
                had_link: false,
                keep_link: false,
            })
            .collect();
        Self {
            table_id,
            row_id: None,
            fields,
        }
    }

    /// Form pre-filled from an existing row. Auto-increment fields show their
    /// value but stay read-only; `keep_link` defaults on only for cells that
    /// carry a link right now, re-derived on every open.
    pub fn for_edit(table_id: TableId, schema: &[ColumnDef], row: &Row) -> Self {
        let fields = schema
            .iter()
            .map(|column| {
                let had_link = row
                    .fields
                    .get(&column.name)
                    .is_some_and(CellValue::has_link);
                FieldInput {
                    column: column.name.clone(),
                    value: row.display_field(&column.name),
                    auto_increment: column.auto_increment,
                    had_link,
                    keep_link: had_link,
                }
            })
            .collect();
        Self {
            table_id,
            row_id: Some(row.id),
            fields,
        }
    }

    pub fn is_edit(&self) -> bool {
        self.row_id.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            if field.auto_increment {
                continue;
            }
            if field.value.trim().is_empty() {
                bail!(
                    "{} is required -- enter a value and retry",
                    field.column
                );
            }
        }
        Ok(())
    }

    /// Produce the field map for the single persistence call. Auto-increment
    /// values are preserved verbatim from the original row; other fields go
    /// through the edit funnel, which downgrades links unless `keep_link`.
    pub fn into_fields(self, original: Option<&Row>) -> BTreeMap<String, CellValue> {
        let mut fields = BTreeMap::new();
        for field in self.fields {
            let previous = original.and_then(|row| row.fields.get(&field.column));
            let cell = if field.auto_increment {
                previous
                    .cloned()
                    .unwrap_or_else(|| CellValue::text(field.value))
            } else {
                match previous {
                    Some(cell) => cell.clone().edited(&field.value, field.keep_link),
                    None => CellValue::text(field.value),
                }
            };
            fields.insert(field.column, cell);
        }
        fields
    }
}

/// Input for the set-link operation; the URL is validated before any network
/// call is made.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkForm {
    pub url: String,
}

impl LinkForm {
    pub fn validate(&self) -> Result<Url> {
        let trimmed = self.url.trim();
        if trimmed.is_empty() {
            bail!("link URL is required -- enter a URL and retry");
        }
        let parsed = Url::parse(trimmed)
            .with_context(|| format!("invalid link URL {trimmed:?}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("link URL must use http or https, got {:?}", parsed.scheme());
        }
        Ok(parsed)
    }
}

/// Input for linking a cell to a row in another table. The table comes from
/// the table picker; the row id is typed and validated before any request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowRefForm {
    pub table_id: Option<TableId>,
    pub row_id: String,
}

impl RowRefForm {
    pub fn validate(&self) -> Result<(TableId, RowId)> {
        let Some(table_id) = self.table_id else {
            bail!("target table is required -- choose a table and retry");
        };
        let trimmed = self.row_id.trim();
        if trimmed.is_empty() {
            bail!("target row id is required -- enter a row id and retry");
        }
        let row_id: i64 = trimmed
            .parse()
            .with_context(|| format!("invalid row id {trimmed:?}"))?;
        if row_id <= 0 {
            bail!("target row id must be positive, got {row_id}");
        }
        Ok((table_id, RowId::new(row_id)))
    }
}
