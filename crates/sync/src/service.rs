//! Narrow interface to the remote spreadsheet service.
//!
//! The engine never talks HTTP. Everything it needs from the backend goes
//! through [`SheetService`]: exact-name file search, workbook/sheet lookup,
//! raw range reads and batch cell writes. Cell values are untyped at this
//! level; numeric coercion happens in [`crate::coerce`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::addressing::CellRange;

pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Content-type restriction for [`SheetService::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFilter {
    Any,
    Spreadsheet,
    Folder,
}

impl ContentFilter {
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Spreadsheet => Some(SPREADSHEET_MIME),
            Self::Folder => Some(FOLDER_MIME),
        }
    }

    pub fn accepts(&self, mime_type: &str) -> bool {
        self.mime_type().map_or(true, |m| m == mime_type)
    }
}

/// A file or folder as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
}

impl FileRef {
    pub fn is_spreadsheet(&self) -> bool {
        self.mime_type == SPREADSHEET_MIME
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// One store's one-month workbook, opened by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkbookHandle {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A sheet (tab) inside a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetHandle {
    pub workbook_id: String,
    pub title: String,
}

/// Raw cell content as it comes off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        Self::Empty
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One staged cell write (1-based row/column).
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

/// Grid cell lookup tolerant of ragged rows (trailing blanks are often
/// omitted by the backend).
pub fn grid_cell(grid: &[Vec<CellValue>], row_idx: usize, col_idx: usize) -> &CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    grid.get(row_idx).and_then(|r| r.get(col_idx)).unwrap_or(&EMPTY)
}

/// Error type for remote service operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// No access token configured
    NotAuthenticated,
    /// Token rejected (401/403)
    Auth(String),
    /// Network error (connection refused, DNS, reset)
    Network(String),
    /// Request timed out
    Timeout(String),
    /// Quota exhausted (429) after retries
    RateLimited(String),
    /// HTTP error with status code
    Http(u16, String),
    /// Response body could not be decoded
    Parse(String),
}

impl ServiceError {
    /// Network, timeout, quota and 5xx failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Http(code, _) => *code >= 500,
            Self::NotAuthenticated | Self::Auth(_) | Self::Parse(_) => false,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "no access token configured"),
            Self::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Timeout(msg) => write!(f, "timed out: {msg}"),
            Self::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            Self::Http(code, msg) => write!(f, "HTTP {code}: {msg}"),
            Self::Parse(msg) => write!(f, "unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Operations the engine consumes from the spreadsheet backend.
pub trait SheetService: Send + Sync {
    /// Exact-name search, optionally scoped to a parent folder.
    fn find(
        &self,
        name: &str,
        parent: Option<&str>,
        filter: ContentFilter,
    ) -> Result<Vec<FileRef>, ServiceError>;

    fn open(&self, file_id: &str) -> Result<WorkbookHandle, ServiceError>;

    fn list_sheets(&self, workbook: &WorkbookHandle) -> Result<Vec<String>, ServiceError>;

    fn get_sheet(
        &self,
        workbook: &WorkbookHandle,
        name: &str,
    ) -> Result<Option<SheetHandle>, ServiceError> {
        let sheets = self.list_sheets(workbook)?;
        Ok(sheets.into_iter().find(|s| s == name).map(|title| SheetHandle {
            workbook_id: workbook.id.clone(),
            title,
        }))
    }

    /// Row-major grid starting at the range's top-left cell. Rows and
    /// columns past the last non-blank cell may be missing.
    fn read_range(
        &self,
        sheet: &SheetHandle,
        range: &CellRange,
    ) -> Result<Vec<Vec<CellValue>>, ServiceError>;

    fn read_cell(&self, sheet: &SheetHandle, row: u32, col: u32) -> Result<CellValue, ServiceError> {
        let grid = self.read_range(sheet, &CellRange::single(row, col))?;
        Ok(grid_cell(&grid, 0, 0).clone())
    }

    /// Apply all writes in one request; either all land or none do.
    fn batch_write(&self, sheet: &SheetHandle, writes: &[CellWrite]) -> Result<(), ServiceError>;
}
