// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};
use time::macros::datetime;

use almacen_app::{
    CellValue, ClientStore, ColumnDef, DataService, NavigationIntent, Row, RowId, RowPage,
    TableId, TableInfo, VisibilityOverrides,
};

const SEED_EPOCH: OffsetDateTime = datetime!(2026-01-05 09:30 UTC);

const HARDWARE_ROWS: [(&str, &str, &str, i64); 6] = [
    ("Impact driver", "DeWalt", "Aisle 2", 4),
    ("Torque wrench", "Tekton", "Aisle 2", 2),
    ("Bench grinder", "Metabo", "倉庫A", 1),
    ("Shop vacuum", "Ridgid", "Aisle 5", 3),
    ("Air compressor", "Makita", "倉庫B", 1),
    ("Label printer", "Brother", "Front desk", 2),
];

const SUPPLIER_ROWS: [(&str, &str, &str); 3] = [
    ("Acme Industrial", "Rowan Diaz", "https://acme.example"),
    ("Harbor Supply", "Casey Reed", "https://harbor.example"),
    ("東京工具", "Kai Flores", "https://tokyo-tools.example"),
];

/// In-memory stand-in for the persistence service: same interface, no
/// network. Rows live per table with the same page/total semantics.
#[derive(Debug, Clone, Default)]
pub struct MemoryService {
    tables: Vec<TableInfo>,
    schemas: BTreeMap<TableId, Vec<ColumnDef>>,
    rows: BTreeMap<TableId, Vec<Row>>,
    next_table_id: i64,
    next_row_id: i64,
    pub fail_deletes: bool,
    pub fail_fetches: bool,
    pub fail_updates: bool,
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            next_table_id: 1,
            next_row_id: 1,
            ..Self::default()
        }
    }

    /// Two linked inventory tables with mixed-width text: `hardware` rows
    /// point at `suppliers` rows, supplier sites are external links.
    pub fn with_demo_data() -> Self {
        let mut service = Self::new();

        let suppliers = service.add_table(
            "suppliers",
            "vendors we buy from",
            vec![
                ColumnDef::named("name"),
                ColumnDef::named("contact"),
                ColumnDef::named("site"),
                ColumnDef::auxiliary("notes"),
            ],
        );
        let mut supplier_ids = Vec::new();
        for (name, contact, site) in SUPPLIER_ROWS {
            let id = service.add_row(
                suppliers,
                [
                    ("name", CellValue::text(name)),
                    ("contact", CellValue::text(contact)),
                    ("site", CellValue::text(site).with_link(site)),
                    ("notes", CellValue::text("net-30 terms")),
                ],
            );
            supplier_ids.push(id);
        }

        let hardware = service.add_table(
            "hardware",
            "bench stock and power tools",
            vec![
                ColumnDef {
                    name: "asset_tag".to_owned(),
                    auxiliary: false,
                    auto_increment: true,
                    auto_increment_prefix: Some("AT".to_owned()),
                },
                ColumnDef::named("name"),
                ColumnDef::named("supplier"),
                ColumnDef::named("location"),
                ColumnDef::named("qty"),
                ColumnDef::auxiliary("notes"),
                ColumnDef::auxiliary("manual"),
            ],
        );
        for (index, (name, brand, location, qty)) in HARDWARE_ROWS.into_iter().enumerate() {
            let supplier_id = supplier_ids[index % supplier_ids.len()];
            let supplier_name = SUPPLIER_ROWS[index % supplier_ids.len()].0;
            service.add_row(
                hardware,
                [
                    (
                        "asset_tag",
                        CellValue::text(format!("AT{:04}", index + 1)),
                    ),
                    ("name", CellValue::text(name)),
                    (
                        "supplier",
                        CellValue::text(supplier_name).with_row_ref(suppliers, supplier_id),
                    ),
                    ("location", CellValue::text(location)),
                    ("qty", CellValue::number(qty as f64)),
                    ("notes", CellValue::text(format!("{brand}; inspected"))),
                    (
                        "manual",
                        CellValue::text("manual").with_link("https://manuals.example"),
                    ),
                ],
            );
        }

        service
    }

    pub fn add_table(
        &mut self,
        name: &str,
        description: &str,
        schema: Vec<ColumnDef>,
    ) -> TableId {
        let id = TableId::new(self.next_table_id);
        self.next_table_id += 1;
        self.tables.push(TableInfo {
            id,
            name: name.to_owned(),
            description: description.to_owned(),
        });
        self.schemas.insert(id, schema);
        self.rows.insert(id, Vec::new());
        id
    }

    pub fn add_row<'a>(
        &mut self,
        table_id: TableId,
        fields: impl IntoIterator<Item = (&'a str, CellValue)>,
    ) -> RowId {
        let id = RowId::new(self.next_row_id);
        self.next_row_id += 1;
        let row = Row {
            id,
            table_id,
            created_at: SEED_EPOCH + Duration::minutes(id.get()),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        };
        self.rows.entry(table_id).or_default().push(row);
        id
    }

    pub fn row(&self, table_id: TableId, row_id: RowId) -> Option<&Row> {
        self.rows
            .get(&table_id)
            .and_then(|rows| rows.iter().find(|row| row.id == row_id))
    }

    pub fn row_count(&self, table_id: TableId) -> usize {
        self.rows.get(&table_id).map_or(0, Vec::len)
    }

    pub fn table_named(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .map(|table| table.id)
    }
}

impl DataService for MemoryService {
    fn fetch_table_list(&mut self) -> Result<Vec<TableInfo>> {
        Ok(self.tables.clone())
    }

    fn fetch_schema(&mut self, table_id: TableId) -> Result<Vec<ColumnDef>> {
        match self.schemas.get(&table_id) {
            Some(schema) => Ok(schema.clone()),
            None => bail!("unknown table {}", table_id.get()),
        }
    }

    fn fetch_rows(&mut self, table_id: TableId, page: usize, page_size: usize) -> Result<RowPage> {
        if self.fail_fetches {
            bail!("simulated fetch failure");
        }
        let Some(rows) = self.rows.get(&table_id) else {
            bail!("unknown table {}", table_id.get());
        };
        let start = page.saturating_sub(1).saturating_mul(page_size);
        let items = rows.iter().skip(start).take(page_size).cloned().collect();
        Ok(RowPage {
            items,
            total: rows.len(),
        })
    }

    fn insert_row(
        &mut self,
        table_id: TableId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        if !self.rows.contains_key(&table_id) {
            bail!("unknown table {}", table_id.get());
        }
        let id = self.add_row(
            table_id,
            fields.iter().map(|(name, value)| (name.as_str(), value.clone())),
        );
        self.row(table_id, id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("inserted row {} missing", id.get()))
    }

    fn update_cell(
        &mut self,
        table_id: TableId,
        row_id: RowId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        if self.fail_updates {
            bail!("simulated update failure");
        }
        let Some(rows) = self.rows.get_mut(&table_id) else {
            bail!("unknown table {}", table_id.get());
        };
        let Some(row) = rows.iter_mut().find(|row| row.id == row_id) else {
            bail!("row {} not found in table {}", row_id.get(), table_id.get());
        };
        for (name, value) in fields {
            row.fields.insert(name.clone(), value.clone());
        }
        Ok(row.clone())
    }

    fn delete_rows(&mut self, table_id: TableId, ids: &[RowId]) -> Result<()> {
        if self.fail_deletes {
            bail!("simulated delete failure");
        }
        let Some(rows) = self.rows.get_mut(&table_id) else {
            bail!("unknown table {}", table_id.get());
        };
        rows.retain(|row| !ids.contains(&row.id));
        Ok(())
    }
}

/// In-memory `ClientStore` with the same single-use intent semantics as the
/// SQLite store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    overrides: BTreeMap<TableId, VisibilityOverrides>,
    intent: Option<NavigationIntent>,
    search: BTreeMap<TableId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_intent(&self) -> Option<NavigationIntent> {
        self.intent
    }
}

impl ClientStore for MemoryStore {
    fn load_overrides(&mut self, table_id: TableId) -> Result<VisibilityOverrides> {
        Ok(self.overrides.get(&table_id).cloned().unwrap_or_default())
    }

    fn save_overrides(
        &mut self,
        table_id: TableId,
        overrides: &VisibilityOverrides,
    ) -> Result<()> {
        self.overrides.insert(table_id, overrides.clone());
        Ok(())
    }

    fn store_intent(&mut self, intent: &NavigationIntent) -> Result<()> {
        self.intent = Some(*intent);
        Ok(())
    }

    fn take_intent(&mut self) -> Result<Option<NavigationIntent>> {
        Ok(self.intent.take())
    }

    fn load_search_text(&mut self, table_id: TableId) -> Result<Option<String>> {
        Ok(self.search.get(&table_id).cloned())
    }

    fn save_search_text(&mut self, table_id: TableId, text: &str) -> Result<()> {
        self.search.insert(table_id, text.to_owned());
        Ok(())
    }
}

/// Combined fake runtime for grid tests: one value implementing both injected
/// interfaces, the way the CLI runtime does.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    pub service: MemoryService,
    pub store: MemoryStore,
}

impl MemoryRuntime {
    pub fn with_demo_data() -> Self {
        Self {
            service: MemoryService::with_demo_data(),
            store: MemoryStore::new(),
        }
    }
}

impl DataService for MemoryRuntime {
    fn fetch_table_list(&mut self) -> Result<Vec<TableInfo>> {
        self.service.fetch_table_list()
    }

    fn fetch_schema(&mut self, table_id: TableId) -> Result<Vec<ColumnDef>> {
        self.service.fetch_schema(table_id)
    }

    fn fetch_rows(&mut self, table_id: TableId, page: usize, page_size: usize) -> Result<RowPage> {
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
        self.service.update_cell(table_id, row_id, fields)
    }

    fn delete_rows(&mut self, table_id: TableId, ids: &[RowId]) -> Result<()> {
        self.service.delete_rows(table_id, ids)
    }
}

impl ClientStore for MemoryRuntime {
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
