// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;

use crate::cell::CellValue;
use crate::ids::{RowId, TableId};
use crate::model::{ColumnDef, Row, RowPage, TableInfo};

/// Boundary to the external persistence service that owns all row data. The
/// grid only ever holds one fetched page; every mutation round-trips through
/// this interface and is followed by a refetch.
pub trait DataService {
    fn fetch_table_list(&mut self) -> Result<Vec<TableInfo>>;

    fn fetch_schema(&mut self, table_id: TableId) -> Result<Vec<ColumnDef>>;

    fn fetch_rows(&mut self, table_id: TableId, page: usize, page_size: usize) -> Result<RowPage>;

    fn insert_row(
        &mut self,
        table_id: TableId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row>;

    /// Single persistence call behind record edits, link set, and unlink: the
    /// provided fields replace the stored cell values.
    fn update_cell(
        &mut self,
        table_id: TableId,
        row_id: RowId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row>;

    fn delete_rows(&mut self, table_id: TableId, ids: &[RowId]) -> Result<()>;
}
