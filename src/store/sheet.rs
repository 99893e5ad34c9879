//! Google Sheets question store (REST v4).
//!
//! One row per question: `timestamp | sender_id | sender_name | text`,
//! below a header row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::intake::record::TIMESTAMP_FORMAT;
use crate::intake::QuestionRecord;
use crate::store::{QuestionStore, StoreError, TokenSource};

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Header row written on initialization.
pub const HEADER_ROW: [&str; 4] = ["timestamp", "sender_id", "sender_name", "text"];

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetQuestionStore {
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl SheetQuestionStore {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            base_url: SHEETS_API_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            http,
            tokens,
        }
    }

    /// Point the store at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// A1 range on this sheet, with the sheet name quoted.
    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.sheet_name.replace('\'', "''"), cells)
    }

    fn values_url(&self, cells: &str, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}{}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&self.range(cells)),
            suffix
        )
    }

    async fn call(&self, method: Method, url: &str, body: Option<Value>) -> Result<reqwest::Response, StoreError> {
        let token = self.tokens.token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::unavailable(format!("spreadsheet request timed out: {e}"))
            } else {
                StoreError::unavailable(format!("spreadsheet request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("spreadsheet API returned {status}: {body}");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.tokens.invalidate().await;
                Err(StoreError::auth(message))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(StoreError::unavailable(message)),
            s if s.is_server_error() => Err(StoreError::unavailable(message)),
            _ => Err(StoreError::unknown(message)),
        }
    }

    async fn read(&self, cells: &str) -> Result<Vec<Vec<Value>>, StoreError> {
        let url = self.values_url(cells, "");
        let response = self.call(Method::GET, &url, None).await?;
        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| StoreError::unknown(format!("malformed spreadsheet response: {e}")))?;
        Ok(range.values)
    }
}

fn cell_text(row: &[Value], idx: usize) -> String {
    match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn row_to_record(row: &[Value]) -> Option<QuestionRecord> {
    let timestamp = NaiveDateTime::parse_from_str(cell_text(row, 0).trim(), TIMESTAMP_FORMAT).ok()?;
    let sender_id = cell_text(row, 1).trim().parse().ok()?;
    let sender_name = cell_text(row, 2);
    let text = cell_text(row, 3);
    QuestionRecord::new(timestamp, sender_id, &sender_name, &text)
}

fn is_header(row: &[Value]) -> bool {
    row.first()
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case(HEADER_ROW[0]))
}

#[async_trait]
impl QuestionStore for SheetQuestionStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        let header = self.read("A1:D1").await?;
        if header.first().is_some_and(|row| !row.is_empty()) {
            debug!("Sheet '{}' already has a header row", self.sheet_name);
            return Ok(());
        }

        let url = self.values_url("A1:D1", "?valueInputOption=RAW");
        self.call(Method::PUT, &url, Some(json!({ "values": [HEADER_ROW] })))
            .await?;
        info!("Wrote header row to sheet '{}'", self.sheet_name);
        Ok(())
    }

    async fn append(&self, record: &QuestionRecord) -> Result<(), StoreError> {
        let url = self.values_url(
            "A:D",
            ":append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
        );
        let row = json!({
            "values": [[
                record.timestamp_string(),
                record.sender_id().to_string(),
                record.sender_name(),
                record.text(),
            ]]
        });
        self.call(Method::POST, &url, Some(row)).await?;
        debug!("Appended question from {} to sheet '{}'", record.sender_id(), self.sheet_name);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        let rows = self.read("A:D").await?;
        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            if idx == 0 && is_header(row) {
                continue;
            }
            if row.is_empty() {
                continue;
            }
            match row_to_record(row) {
                Some(record) => records.push(record),
                None => warn!("Skipping malformed row {} in sheet '{}'", idx + 1, self.sheet_name),
            }
        }
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("spreadsheet {} (sheet '{}')", self.spreadsheet_id, self.sheet_name)
    }
}
