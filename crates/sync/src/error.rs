use std::fmt;

use crate::service::ServiceError;

#[derive(Debug)]
pub enum KpiError {
    /// Missing or malformed input, caught before any remote call.
    Validation(String),
    /// Metric schema rejected (parse error, duplicate name/offset, bad anchor).
    Schema(String),
    /// No spreadsheet with the derived name in the searched folder(s).
    WorkbookNotFound { name: String, searched: Vec<String> },
    /// A file with the workbook name exists but is not a native spreadsheet.
    FormatMismatch { name: String, mime_type: String },
    /// The staff member has no sheet in the workbook.
    SheetNotFound { workbook: String, sheet: String, available: Vec<String> },
    /// Day of month lies outside the rows provisioned by the template.
    RowOutOfRange { day: u32, provisioned: u32 },
    /// Day column of the target row holds another day.
    TemplateMismatch { sheet: String, row: u32, expected: u32, found: String },
    /// The signed-in role may not perform the operation.
    AccessDenied(String),
    /// Remote spreadsheet service failure.
    Remote(ServiceError),
}

impl KpiError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Suggested next step for the user, when there is a useful one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::WorkbookNotFound { .. } => Some(
                "check that the file is uploaded to the shared folder, that its name follows \
                 YYYY_MM_<store>業績日報表, and that the report month is correct"
                    .to_string(),
            ),
            Self::FormatMismatch { .. } => Some(
                "open the file in the spreadsheet service and save it as a native spreadsheet \
                 (File > Save as Google Sheets), then retry"
                    .to_string(),
            ),
            Self::SheetNotFound { .. } => {
                Some("the sheet tab must match the staff name in the roster exactly".to_string())
            }
            Self::RowOutOfRange { .. } => {
                Some("extend the workbook template or correct the report date".to_string())
            }
            Self::TemplateMismatch { .. } => {
                Some("the sheet's day rows do not line up with the template; fix the sheet layout".to_string())
            }
            Self::AccessDenied(_) => Some("pass the store password, or the admin password, with --password".to_string()),
            Self::Remote(ServiceError::NotAuthenticated) | Self::Remote(ServiceError::Auth(_)) => {
                Some("refresh the access token with `kpi token set`".to_string())
            }
            Self::Remote(err) if err.is_retryable() => Some("temporary failure; retry shortly".to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for KpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid submission: {msg}"),
            Self::Schema(msg) => write!(f, "metric schema error: {msg}"),
            Self::WorkbookNotFound { name, searched } => {
                write!(f, "workbook not found: [{name}] (searched {})", searched.join(", "))
            }
            Self::FormatMismatch { name, mime_type } => {
                write!(f, "[{name}] exists but is not a spreadsheet document ({mime_type}); convert it first")
            }
            Self::SheetNotFound { workbook, sheet, available } => {
                if available.is_empty() {
                    write!(f, "sheet '{sheet}' not found in [{workbook}] (workbook has no sheets)")
                } else {
                    write!(f, "sheet '{sheet}' not found in [{workbook}]; available: {}", available.join(", "))
                }
            }
            Self::RowOutOfRange { day, provisioned } => {
                write!(f, "day {day} is outside the template's {provisioned} provisioned day rows")
            }
            Self::TemplateMismatch { sheet, row, expected, found } => {
                write!(f, "sheet '{sheet}' row {row}: expected day {expected}, found '{found}'")
            }
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::Remote(err) => write!(f, "spreadsheet service error: {err}"),
        }
    }
}

impl std::error::Error for KpiError {}

impl From<ServiceError> for KpiError {
    fn from(err: ServiceError) -> Self {
        Self::Remote(err)
    }
}
