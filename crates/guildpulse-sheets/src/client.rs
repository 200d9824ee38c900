use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use guildpulse_core::{
    config::Config,
    metrics::MetricsSnapshot,
    sink::{header_row, plan_upsert, snapshot_row, ReportSink, UpsertOutcome, UpsertPlan, FIRST_DATA_ROW, SHEET_HEADER},
};

use crate::{
    auth::{AccessTokenSource, ServiceAccountKey, ServiceAccountTokens},
    error::SheetsError,
};

const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Quote a sheet title for A1 notation when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Spreadsheet column letter of the last report column.
fn last_column() -> char {
    (b'A' + (SHEET_HEADER.len() as u8 - 1)) as char
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// [`ReportSink`] writing one row per report window into a Google Sheet.
pub struct SheetsSink {
    http: reqwest::Client,
    base: Url,
    spreadsheet_id: String,
    sheet_name: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SheetsSink {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, SheetsError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(SheetsError::BaseUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            tokens,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, SheetsError> {
        let key = ServiceAccountKey::load(&cfg.service_account_json)?;
        info!(client_email = %key.client_email, "Loaded Sheets service account");
        let tokens = ServiceAccountTokens::new(key)?;
        Self::new(
            &cfg.sheets_api_base,
            &cfg.spreadsheet_id,
            &cfg.sheet_name,
            Arc::new(tokens),
        )
    }

    /// `{base}/v4/spreadsheets/{id}` followed by `segments`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SheetsError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    fn a1_range(&self, cells: &str) -> String {
        format!("{}!{cells}", quote_sheet_name(&self.sheet_name))
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Value, SheetsError> {
        let token = self.tokens.access_token().await?;
        let response = builder.bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if let Some((index, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
                body.truncate(index);
            }
            return Err(SheetsError::RemoteApi {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SheetsError::Decode(format!("{path}: {e}")))
    }

    /// Column A of the sheet, header included. Blank cells read as "".
    pub async fn first_column(&self) -> Result<Vec<String>, SheetsError> {
        let range = self.a1_range("A:A");
        let url = self.endpoint(&[&self.spreadsheet_id, "values", &range])?;
        let path = url.path().to_string();
        let body = self.send(self.http.request(Method::GET, url), &path).await?;
        let range: ValueRange = serde_json::from_value(body)
            .map_err(|e| SheetsError::Decode(format!("{path}: {e}")))?;
        Ok(range
            .values
            .iter()
            .map(|row| row.first().map(cell_text).unwrap_or_default())
            .collect())
    }

    /// Write `rows` starting at 1-based sheet row `start_row`.
    pub async fn write_rows(&self, start_row: usize, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let end_row = start_row + rows.len().saturating_sub(1);
        let range = self.a1_range(&format!("A{start_row}:{}{end_row}", last_column()));
        let mut url = self.endpoint(&[&self.spreadsheet_id, "values", &range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let path = url.path().to_string();
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.send(self.http.request(Method::PUT, url).json(&body), &path)
            .await?;
        debug!(range = %range, rows = rows.len(), "Wrote sheet rows");
        Ok(())
    }

    /// Numeric id of the configured tab, needed by structural updates.
    pub async fn sheet_id(&self) -> Result<i64, SheetsError> {
        let mut url = self.endpoint(&[&self.spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let path = url.path().to_string();
        let body = self.send(self.http.request(Method::GET, url), &path).await?;
        let meta: SpreadsheetMeta = serde_json::from_value(body)
            .map_err(|e| SheetsError::Decode(format!("{path}: {e}")))?;
        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == self.sheet_name)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| SheetsError::SheetNotFound(self.sheet_name.clone()))
    }

    /// Insert one empty row directly below the header.
    pub async fn insert_row_below_header(&self) -> Result<(), SheetsError> {
        let sheet_id = self.sheet_id().await?;
        let batch = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.endpoint(&[&batch])?;
        let path = url.path().to_string();
        let body = json!({
            "requests": [{
                "insertDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": FIRST_DATA_ROW - 1,
                        "endIndex": FIRST_DATA_ROW,
                    },
                    "inheritFromBefore": false,
                }
            }]
        });
        self.send(self.http.request(Method::POST, url).json(&body), &path)
            .await?;
        Ok(())
    }

    pub async fn upsert_row(
        &self,
        label: &str,
        snapshot: &MetricsSnapshot,
    ) -> Result<UpsertOutcome, SheetsError> {
        let row = snapshot_row(label, snapshot);
        let first_column = self.first_column().await?;
        let outcome = match plan_upsert(&first_column, label) {
            UpsertPlan::WriteHeaderThenRow => {
                self.write_rows(1, &[header_row(), row]).await?;
                UpsertOutcome::Inserted {
                    row: FIRST_DATA_ROW,
                }
            }
            UpsertPlan::Overwrite { row: sheet_row } => {
                self.write_rows(sheet_row, &[row]).await?;
                UpsertOutcome::Updated { row: sheet_row }
            }
            UpsertPlan::InsertBelowHeader => {
                self.insert_row_below_header().await?;
                self.write_rows(FIRST_DATA_ROW, &[row]).await?;
                UpsertOutcome::Inserted {
                    row: FIRST_DATA_ROW,
                }
            }
        };
        info!(
            spreadsheet_id = %self.spreadsheet_id,
            sheet = %self.sheet_name,
            label,
            ?outcome,
            "Report row written to sheet"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl ReportSink for SheetsSink {
    async fn upsert(
        &self,
        label: &str,
        snapshot: &MetricsSnapshot,
    ) -> anyhow::Result<UpsertOutcome> {
        Ok(self.upsert_row(label, snapshot).await?)
    }
}
