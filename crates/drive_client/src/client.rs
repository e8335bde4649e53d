//! Blocking HTTP client with retry / backoff / error classification.

use std::thread;
use std::time::Duration;

use kpiboard_sync::addressing::CellRange;
use kpiboard_sync::service::{
    CellValue, CellWrite, ContentFilter, FileRef, ServiceError, SheetHandle, SheetService, WorkbookHandle,
};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use crate::wire;

pub const DEFAULT_DRIVE_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com/v4";
pub const MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("kpiboard/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct DriveOptions {
    pub drive_base: String,
    pub sheets_base: String,
    pub timeout: Duration,
    /// First retry delay; doubles on every attempt.
    pub retry_backoff: Duration,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            drive_base: DEFAULT_DRIVE_BASE.to_string(),
            sheets_base: DEFAULT_SHEETS_BASE.to_string(),
            timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Drive + Sheets API client (blocking), authenticated with a bearer token.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    options: DriveOptions,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_options(token, DriveOptions::default())
    }

    pub fn with_options(token: impl Into<String>, options: DriveOptions) -> Result<Self, ServiceError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ServiceError::NotAuthenticated);
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http, options, token })
    }

    /// Point both APIs at one server (`{base}/drive/v3`, `{base}/v4`) and
    /// retry without sleeping. For tests against a mock server.
    pub fn with_base_url(token: impl Into<String>, base: &str) -> Result<Self, ServiceError> {
        let base = base.trim_end_matches('/');
        Self::with_options(
            token,
            DriveOptions {
                drive_base: format!("{base}/drive/v3"),
                sheets_base: format!("{base}/v4"),
                retry_backoff: Duration::ZERO,
                ..DriveOptions::default()
            },
        )
    }

    fn spreadsheet_url(&self, id: &str) -> String {
        format!("{}/spreadsheets/{}", self.options.sheets_base, id)
    }

    /// Send with retry + exponential backoff.
    ///
    /// `build_request` is called once per attempt. 401/403 and other 4xx
    /// fail immediately; 429, 5xx and transport errors are retried up to
    /// [`MAX_RETRIES`] times, honouring `Retry-After` on 429.
    fn request_with_retry(&self, build_request: impl Fn(&Client) -> RequestBuilder) -> Result<Value, ServiceError> {
        let mut backoff = self.options.retry_backoff;

        for attempt in 0..=MAX_RETRIES {
            let result = build_request(&self.http).bearer_auth(&self.token).send();

            let (wait, failure) = match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        let text = resp.text().map_err(|e| ServiceError::Parse(e.to_string()))?;
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&text).map_err(|e| ServiceError::Parse(e.to_string()));
                    }

                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    let msg = wire::error_message(&resp.text().unwrap_or_default(), status);

                    match status {
                        401 | 403 => return Err(ServiceError::Auth(msg)),
                        429 => (
                            retry_wait(retry_after, backoff, self.options.timeout),
                            ServiceError::RateLimited(msg),
                        ),
                        s if s >= 500 => (backoff, ServiceError::Http(s, msg)),
                        s => return Err(ServiceError::Http(s, msg)),
                    }
                }
                Err(e) if e.is_timeout() => (backoff, ServiceError::Timeout(e.to_string())),
                Err(e) => (backoff, ServiceError::Network(e.to_string())),
            };

            if attempt == MAX_RETRIES {
                return Err(failure);
            }
            log::warn!("retry {}/{} in {:?} ({})", attempt + 1, MAX_RETRIES, wait, failure);
            thread::sleep(wait);
            backoff *= 2;
        }

        unreachable!()
    }
}

/// Delay before retrying a 429: the server's `Retry-After` when given,
/// never longer than `cap`.
fn retry_wait(retry_after: Option<Duration>, backoff: Duration, cap: Duration) -> Duration {
    retry_after.unwrap_or(backoff).min(cap)
}

impl SheetService for DriveClient {
    fn find(&self, name: &str, parent: Option<&str>, filter: ContentFilter) -> Result<Vec<FileRef>, ServiceError> {
        let url = format!("{}/files", self.options.drive_base);
        let q = wire::drive_query(name, parent, filter);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let body = self.request_with_retry(|http| {
                let mut req = http.get(&url).query(&[
                    ("q", q.as_str()),
                    ("fields", wire::FILE_FIELDS),
                    ("orderBy", "createdTime desc"),
                    ("pageSize", "100"),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]);
                if let Some(token) = &page_token {
                    req = req.query(&[("pageToken", token.as_str())]);
                }
                req
            })?;

            if let Some(items) = body["files"].as_array() {
                files.extend(items.iter().filter_map(wire::parse_file));
            }
            match body["nextPageToken"].as_str() {
                Some(next) if !next.is_empty() => page_token = Some(next.to_string()),
                _ => break,
            }
        }

        log::debug!("files.list [{}] → {} match(es)", name, files.len());
        Ok(files)
    }

    fn open(&self, file_id: &str) -> Result<WorkbookHandle, ServiceError> {
        let url = self.spreadsheet_url(file_id);
        let body = self.request_with_retry(|http| {
            http.get(&url)
                .query(&[("fields", "spreadsheetId,spreadsheetUrl,properties.title")])
        })?;
        let name = body["properties"]["title"]
            .as_str()
            .ok_or_else(|| ServiceError::Parse("spreadsheet response missing properties.title".into()))?;
        Ok(WorkbookHandle {
            id: body["spreadsheetId"].as_str().unwrap_or(file_id).to_string(),
            name: name.to_string(),
            url: body["spreadsheetUrl"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("https://docs.google.com/spreadsheets/d/{file_id}")),
        })
    }

    fn list_sheets(&self, workbook: &WorkbookHandle) -> Result<Vec<String>, ServiceError> {
        let url = self.spreadsheet_url(&workbook.id);
        let body = self.request_with_retry(|http| http.get(&url).query(&[("fields", "sheets.properties.title")]))?;
        Ok(body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_range(&self, sheet: &SheetHandle, range: &CellRange) -> Result<Vec<Vec<CellValue>>, ServiceError> {
        let mut url = reqwest::Url::parse(&self.spreadsheet_url(&sheet.workbook_id))
            .map_err(|e| ServiceError::Parse(format!("invalid sheets base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Parse("sheets base url cannot take a path".into()))?
            .push("values")
            .push(&wire::sheet_range(&sheet.title, range));

        let body = self.request_with_retry(|http| {
            http.get(url.clone()).query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ])
        })?;
        Ok(wire::grid_from_json(&body))
    }

    // RAW absolute values: replaying the same batch after a retry is harmless.
    fn batch_write(&self, sheet: &SheetHandle, writes: &[CellWrite]) -> Result<(), ServiceError> {
        if writes.is_empty() {
            return Ok(());
        }
        let url = format!("{}/values:batchUpdate", self.spreadsheet_url(&sheet.workbook_id));
        let body = wire::batch_update_body(&sheet.title, writes);
        self.request_with_retry(|http| http.post(&url).json(&body))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> DriveClient {
        DriveClient::with_base_url("test-token", &server.base_url()).unwrap()
    }

    fn sheet() -> SheetHandle {
        SheetHandle {
            workbook_id: "wb1".into(),
            title: "小明".into(),
        }
    }

    #[test]
    fn empty_token_is_not_authenticated() {
        assert!(matches!(DriveClient::new("  "), Err(ServiceError::NotAuthenticated)));
    }

    #[test]
    fn find_sends_scoped_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .header("authorization", "Bearer test-token")
                .query_param(
                    "q",
                    "name = '2026_01_東門店業績日報表' and trashed = false and 'root' in parents \
                     and mimeType = 'application/vnd.google-apps.spreadsheet'",
                )
                .query_param("orderBy", "createdTime desc");
            then.status(200).json_body(json!({
                "files": [
                    { "id": "a", "name": "2026_01_東門店業績日報表",
                      "mimeType": "application/vnd.google-apps.spreadsheet",
                      "createdTime": "2026-01-03T00:00:00Z" }
                ]
            }));
        });

        let files = client(&server)
            .find("2026_01_東門店業績日報表", Some("root"), ContentFilter::Spreadsheet)
            .unwrap();
        mock.assert();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "a");
    }

    #[test]
    fn find_follows_pages() {
        let server = MockServer::start();
        let second = server.mock(|when, then| {
            when.method(GET).path("/drive/v3/files").query_param("pageToken", "p2");
            then.status(200).json_body(json!({
                "files": [{ "id": "b", "name": "202601", "mimeType": "application/vnd.google-apps.folder" }]
            }));
        });
        let first = server.mock(|when, then| {
            when.method(GET).path("/drive/v3/files").query_param_missing("pageToken");
            then.status(200).json_body(json!({
                "nextPageToken": "p2",
                "files": [{ "id": "a", "name": "202601", "mimeType": "application/vnd.google-apps.folder" }]
            }));
        });

        let files = client(&server).find("202601", Some("root"), ContentFilter::Folder).unwrap();
        first.assert();
        second.assert();
        assert_eq!(files.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn open_and_list_sheets() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/wb1")
                .query_param("fields", "spreadsheetId,spreadsheetUrl,properties.title");
            then.status(200).json_body(json!({
                "spreadsheetId": "wb1",
                "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/wb1/edit",
                "properties": { "title": "2026_01_東門店業績日報表" }
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/wb1")
                .query_param("fields", "sheets.properties.title");
            then.status(200).json_body(json!({
                "sheets": [ { "properties": { "title": "總表" } }, { "properties": { "title": "小明" } } ]
            }));
        });

        let c = client(&server);
        let wb = c.open("wb1").unwrap();
        assert_eq!(wb.name, "2026_01_東門店業績日報表");
        assert!(wb.url.ends_with("/edit"));
        assert_eq!(c.list_sheets(&wb).unwrap(), vec!["總表", "小明"]);
        assert_eq!(c.get_sheet(&wb, "小明").unwrap(), Some(sheet()));
        assert_eq!(c.get_sheet(&wb, "小華").unwrap(), None);
    }

    #[test]
    fn read_range_unformatted() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path_includes("/v4/spreadsheets/wb1/values/")
                .query_param("valueRenderOption", "UNFORMATTED_VALUE");
            then.status(200).json_body(json!({
                "range": "'小明'!B19:P19",
                "majorDimension": "ROWS",
                "values": [[1000, "", 2]]
            }));
        });

        let grid = client(&server).read_range(&sheet(), &CellRange::new(19, 2, 19, 16)).unwrap();
        mock.assert();
        assert_eq!(grid[0][0], CellValue::Number(1000.0));
        assert_eq!(grid[0][1], CellValue::Empty);
        assert_eq!(grid[0][2], CellValue::Number(2.0));
    }

    #[test]
    fn read_cell_of_blank_row() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path_includes("/values/");
            then.status(200).json_body(json!({ "range": "'小明'!B19" }));
        });
        assert_eq!(client(&server).read_cell(&sheet(), 19, 2).unwrap(), CellValue::Empty);
    }

    #[test]
    fn batch_write_posts_all_cells_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v4/spreadsheets/wb1/values:batchUpdate")
                .json_body(json!({
                    "valueInputOption": "RAW",
                    "data": [
                        { "range": "'小明'!B19", "majorDimension": "ROWS", "values": [[1500.0]] },
                        { "range": "'小明'!N19", "majorDimension": "ROWS", "values": [[0.75]] }
                    ]
                }));
            then.status(200).json_body(json!({ "totalUpdatedCells": 2 }));
        });

        client(&server)
            .batch_write(
                &sheet(),
                &[
                    CellWrite { row: 19, col: 2, value: CellValue::Number(1500.0) },
                    CellWrite { row: 19, col: 14, value: CellValue::Number(0.75) },
                ],
            )
            .unwrap();
        mock.assert_calls(1);
    }

    #[test]
    fn auth_failure_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/drive/v3/files");
            then.status(401).json_body(json!({ "error": { "code": 401, "message": "Invalid Credentials" } }));
        });

        let err = client(&server).find("x", None, ContentFilter::Any).unwrap_err();
        mock.assert_calls(1);
        assert_eq!(err, ServiceError::Auth("Invalid Credentials".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_retried_then_reported() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/wb1");
            then.status(503).body("backend unavailable");
        });

        let err = client(&server).open("wb1").unwrap_err();
        mock.assert_calls(MAX_RETRIES as usize + 1);
        assert_eq!(err, ServiceError::Http(503, "backend unavailable".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn quota_exhaustion_is_rate_limited() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/drive/v3/files");
            then.status(429).json_body(json!({ "error": { "message": "Quota exceeded" } }));
        });

        let err = client(&server).find("x", None, ContentFilter::Any).unwrap_err();
        assert_eq!(err, ServiceError::RateLimited("Quota exceeded".into()));
    }

    #[test]
    fn retry_after_is_capped() {
        let cap = Duration::from_secs(30);
        assert_eq!(retry_wait(Some(Duration::from_secs(3600)), Duration::from_secs(1), cap), cap);
        assert_eq!(retry_wait(Some(Duration::from_secs(5)), Duration::from_secs(1), cap), Duration::from_secs(5));
        assert_eq!(retry_wait(None, Duration::from_secs(2), cap), Duration::from_secs(2));
    }

    #[test]
    fn long_retry_after_does_not_stall() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/wb-1");
            then.status(429).header("Retry-After", "3600").body("quota");
        });
        let client = DriveClient::with_options(
            "tok",
            DriveOptions {
                drive_base: format!("{}/drive/v3", server.base_url()),
                sheets_base: format!("{}/v4", server.base_url()),
                timeout: Duration::from_millis(200),
                retry_backoff: Duration::ZERO,
            },
        )
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.open("wb-1").unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
        mock.assert_calls((MAX_RETRIES + 1) as usize);
    }

    #[test]
    fn not_found_fails_fast() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/missing");
            then.status(404).json_body(json!({ "error": { "message": "Requested entity was not found." } }));
        });

        let err = client(&server).open("missing").unwrap_err();
        mock.assert_calls(1);
        assert!(matches!(err, ServiceError::Http(404, _)));
    }
}
