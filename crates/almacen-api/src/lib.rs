// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use almacen_app::{
    CellValue, ColumnDef, DataService, Row, RowId, RowPage, TableId, TableInfo,
};

/// Blocking client for the persistence service that owns tables and rows.
/// Every response travels in a `{code, message, data}` envelope; a non-200
/// envelope code surfaces `message` as the error.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TableListData {
    items: Vec<TableInfo>,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        Url::parse(&base_url)
            .with_context(|| format!("invalid api.base_url {base_url:?}"))?;

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Startup reachability check used by `--check`.
    pub fn ping(&mut self) -> Result<()> {
        self.fetch_table_list().map(|_| ())
    }

    fn decode<T: DeserializeOwned>(&self, response: Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .with_context(|| format!("decode {what} response"))?;
        if envelope.code != 200 {
            bail!("data service rejected {what}: {}", envelope.message);
        }
        envelope
            .data
            .ok_or_else(|| anyhow!("data service returned no data for {what}"))
    }

    fn decode_empty(&self, response: Response, what: &str) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        let envelope: Envelope<serde_json::Value> = response
            .json()
            .with_context(|| format!("decode {what} response"))?;
        if envelope.code != 200 {
            bail!("data service rejected {what}: {}", envelope.message);
        }
        Ok(())
    }
}

impl DataService for Client {
    fn fetch_table_list(&mut self) -> Result<Vec<TableInfo>> {
        let response = self
            .http
            .get(format!("{}/tables", self.base_url))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let data: TableListData = self.decode(response, "table list")?;
        Ok(data.items)
    }

    fn fetch_schema(&mut self, table_id: TableId) -> Result<Vec<ColumnDef>> {
        let response = self
            .http
            .get(format!("{}/tables/{}/schema", self.base_url, table_id.get()))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        self.decode(response, "schema")
    }

    fn fetch_rows(&mut self, table_id: TableId, page: usize, page_size: usize) -> Result<RowPage> {
        let response = self
            .http
            .get(format!("{}/tables/{}/data", self.base_url, table_id.get()))
            .query(&[("page", page), ("per_page", page_size)])
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        self.decode(response, "row page")
    }

    fn insert_row(
        &mut self,
        table_id: TableId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        let response = self
            .http
            .post(format!("{}/tables/{}/data", self.base_url, table_id.get()))
            .json(&serde_json::json!({ "data": fields }))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        self.decode(response, "row insert")
    }

    fn update_cell(
        &mut self,
        table_id: TableId,
        row_id: RowId,
        fields: &BTreeMap<String, CellValue>,
    ) -> Result<Row> {
        let response = self
            .http
            .put(format!(
                "{}/tables/{}/data/{}",
                self.base_url,
                table_id.get(),
                row_id.get()
            ))
            .json(&serde_json::json!({ "data": fields }))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        self.decode(response, "row update")
    }

    fn delete_rows(&mut self, table_id: TableId, ids: &[RowId]) -> Result<()> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let response = self
            .http
            .delete(format!("{}/tables/{}/data", self.base_url, table_id.get()))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        self.decode_empty(response, "row delete")
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach data service at {base_url} -- check [api].base_url and that the server is running: {error}"
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        anyhow!("data service returned {status}")
    } else {
        anyhow!("data service returned {status}: {trimmed}")
    }
}
