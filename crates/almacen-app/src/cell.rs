// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::{RowId, TableId};

/// A cell is either a bare scalar or display text layered over a link target.
/// The link target is navigation metadata only; the text is the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireCell", into = "WireCell")]
pub enum CellValue {
    Scalar(ScalarValue),
    Link { text: String, target: LinkTarget },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Number(f64),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    External(String),
    RowRef { table_id: TableId, row_id: RowId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayCell {
    pub text: String,
    pub anchor: Option<AnchorSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnchorSpec {
    OpenExternal(String),
    ActivateRowRef { table_id: TableId, row_id: RowId },
}

impl ScalarValue {
    pub fn display(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", *value as i64)
            }
            Self::Number(value) => value.to_string(),
            Self::Null => String::new(),
        }
    }
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::Text(value.into()))
    }

    pub fn number(value: f64) -> Self {
        Self::Scalar(ScalarValue::Number(value))
    }

    pub fn null() -> Self {
        Self::Scalar(ScalarValue::Null)
    }

    /// The canonical searchable/copyable text of the cell.
    pub fn display(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.display(),
            Self::Link { text, .. } => text.clone(),
        }
    }

    pub fn target(&self) -> Option<&LinkTarget> {
        match self {
            Self::Scalar(_) => None,
            Self::Link { target, .. } => Some(target),
        }
    }

    pub fn has_link(&self) -> bool {
        self.target().is_some()
    }

    pub fn resolve_for_display(&self) -> DisplayCell {
        let anchor = match self {
            Self::Scalar(_) => None,
            Self::Link {
                target: LinkTarget::External(url),
                ..
            } => Some(AnchorSpec::OpenExternal(url.clone())),
            Self::Link {
                target: LinkTarget::RowRef { table_id, row_id },
                ..
            } => Some(AnchorSpec::ActivateRowRef {
                table_id: *table_id,
                row_id: *row_id,
            }),
        };
        DisplayCell {
            text: self.display(),
            anchor,
        }
    }

    /// Attach an external-URL target, preserving the display text verbatim.
    pub fn with_link(self, url: impl Into<String>) -> Self {
        Self::Link {
            text: self.display(),
            target: LinkTarget::External(url.into()),
        }
    }

    /// Attach a row-reference target, preserving the display text verbatim.
    pub fn with_row_ref(self, table_id: TableId, row_id: RowId) -> Self {
        Self::Link {
            text: self.display(),
            target: LinkTarget::RowRef { table_id, row_id },
        }
    }

    /// Collapse a linked cell back to its display text; the target is gone.
    pub fn unlink(self) -> Self {
        match self {
            Self::Scalar(_) => self,
            Self::Link { text, .. } => Self::Scalar(ScalarValue::Text(text)),
        }
    }

    /// Apply a text edit from the generic record form. The target survives
    /// only when the caller opted into `keep_link`; otherwise the cell
    /// downgrades to a plain scalar.
    pub fn edited(self, new_text: &str, keep_link: bool) -> Self {
        match self {
            Self::Link { target, .. } if keep_link => Self::Link {
                text: new_text.to_owned(),
                target,
            },
            _ => Self::Scalar(ScalarValue::Text(new_text.to_owned())),
        }
    }
}

/// Wire mapping: scalars travel as plain JSON values, linked cells as the
/// `_text`/`_link` object shape the data service stores.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireCell {
    Linked {
        #[serde(rename = "_text")]
        text: String,
        #[serde(rename = "_link")]
        link: WireTarget,
    },
    Scalar(serde_json::Value),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireTarget {
    External(String),
    Row { table_id: i64, row_id: i64 },
}

impl From<WireCell> for CellValue {
    fn from(wire: WireCell) -> Self {
        match wire {
            WireCell::Linked { text, link } => Self::Link {
                text,
                target: link.into(),
            },
            WireCell::Scalar(value) => Self::Scalar(value.into()),
        }
    }
}

impl From<CellValue> for WireCell {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Scalar(scalar) => Self::Scalar(scalar.into()),
            CellValue::Link { text, target } => Self::Linked {
                text,
                link: target.into(),
            },
        }
    }
}

impl From<WireTarget> for LinkTarget {
    fn from(wire: WireTarget) -> Self {
        match wire {
            WireTarget::External(url) => Self::External(url),
            WireTarget::Row { table_id, row_id } => Self::RowRef {
                table_id: TableId::new(table_id),
                row_id: RowId::new(row_id),
            },
        }
    }
}

impl From<LinkTarget> for WireTarget {
    fn from(target: LinkTarget) -> Self {
        match target {
            LinkTarget::External(url) => Self::External(url),
            LinkTarget::RowRef { table_id, row_id } => Self::Row {
                table_id: table_id.get(),
                row_id: row_id.get(),
            },
        }
    }
}

impl From<serde_json::Value> for ScalarValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Number(number) => {
                Self::Number(number.as_f64().unwrap_or_default())
            }
            serde_json::Value::Bool(flag) => Self::Text(flag.to_string()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<ScalarValue> for serde_json::Value {
    fn from(scalar: ScalarValue) -> Self {
        match scalar {
            ScalarValue::Null => Self::Null,
            ScalarValue::Text(text) => Self::String(text),
            ScalarValue::Number(number) => serde_json::Number::from_f64(number)
                .map(Self::Number)
                .unwrap_or(Self::Null),
        }
    }
}
