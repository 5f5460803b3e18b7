// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

use almacen_app::{
    CellValue, ClientStore, ColumnDef, DataService, NavigationIntent, Row, RowId, RowPage,
    TableId, TableInfo, VisibilityOverrides,
};

/// The value handed to the grid: a data service plus a client store, with
/// trace logging at the I/O boundary.
pub struct Runtime<S, C> {
    service: S,
    store: C,
}

impl<S, C> Runtime<S, C> {
    pub fn new(service: S, store: C) -> Self {
        Self { service, store }
    }
}

impl<S: DataService, C> DataService for Runtime<S, C> {
    fn fetch_table_list(&mut self) -> Result<Vec<TableInfo>> {
        self.service.fetch_table_list()
    }

    fn fetch_schema(&mut self, table_id: TableId) -> Result<Vec<ColumnDef>> {
        self.service.fetch_schema(table_id)
    }

    fn fetch_rows(&mut self, table_id: TableId, page: usize, page_size: usize) -> Result<RowPage> {
        debug!(table = table_id.get(), page, page_size, "fetch rows");
        self.service.fetch_rows(table_id, page, page_size)
    }

    fn insert_row(
        &mut self,
        table_id: TableId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        self.service.insert_row(table_id, fields)
    }

    fn update_cell(
        &mut self,
        table_id: TableId,
        row_id: RowId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        debug!(
            table = table_id.get(),
            row = row_id.get(),
            columns = fields.len(),
            "update cell"
        );
        self.service.update_cell(table_id, row_id, fields)
    }

    fn delete_rows(&mut self, table_id: TableId, ids: &[RowId]) -> Result<()> {
        debug!(table = table_id.get(), count = ids.len(), "delete rows");
        self.service.delete_rows(table_id, ids)
    }
}

impl<S, C: ClientStore> ClientStore for Runtime<S, C> {
    fn load_overrides(&mut self, table_id: TableId) -> Result<VisibilityOverrides> {
        self.store.load_overrides(table_id)
    }

    fn save_overrides(
        &mut self,
        table_id: TableId,
        overrides: &VisibilityOverrides,
    ) -> Result<()> {
        self.store.save_overrides(table_id, overrides)
    }

    fn store_intent(&mut self, intent: &NavigationIntent) -> Result<()> {
        debug!(
            table = intent.table_id.get(),
            row = intent.row_id.get(),
            "store navigation intent"
        );
        self.store.store_intent(intent)
    }

    fn take_intent(&mut self) -> Result<Option<NavigationIntent>> {
        self.store.take_intent()
    }

    fn load_search_text(&mut self, table_id: TableId) -> Result<Option<String>> {
        self.store.load_search_text(table_id)
    }

    fn save_search_text(&mut self, table_id: TableId, text: &str) -> Result<()> {
        self.store.save_search_text(table_id, text)
    }
}
