use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::KpiError;
use crate::schema::{AggregationMode, MetricSchema};
use crate::score::{breakdown, TargetSet};
use crate::service::WorkbookHandle;

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// A reporting month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReportPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, KpiError> {
        if !(1..=12).contains(&month) {
            return Err(KpiError::Validation(format!("month must be 1-12, got {month}")));
        }
        if !(1900..=9999).contains(&year) {
            return Err(KpiError::Validation(format!("year out of range: {year}")));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Accepts `2026-01`, `2026/01` or `202601`.
    pub fn parse(input: &str) -> Result<Self, KpiError> {
        let s = input.trim();
        let (year, month) = if let Some((y, m)) = s.split_once(|c: char| c == '-' || c == '/') {
            (y, m)
        } else if s.len() == 6 && s.chars().all(|c| c.is_ascii_digit()) {
            s.split_at(4)
        } else {
            return Err(KpiError::Validation(format!("cannot parse month '{input}' (expected YYYY-MM)")));
        };
        let year: i32 = year
            .parse()
            .map_err(|_| KpiError::Validation(format!("cannot parse year in '{input}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| KpiError::Validation(format!("cannot parse month in '{input}'")))?;
        Self::new(year, month)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Number of calendar days in the month.
    pub fn days(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        match (self.first_day(), NaiveDate::from_ymd_opt(next_year, next_month, 1)) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 31,
        }
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One confirmed daily report, consumed by a single write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSubmission {
    pub store: String,
    pub staff: String,
    pub report_date: NaiveDate,
    pub metrics: BTreeMap<String, f64>,
}

impl ReportSubmission {
    pub fn new(
        store: impl Into<String>,
        staff: impl Into<String>,
        report_date: NaiveDate,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            store: store.into(),
            staff: staff.into(),
            report_date,
            metrics,
        }
    }

    pub fn period(&self) -> ReportPeriod {
        ReportPeriod::from_date(self.report_date)
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        if self.store.trim().is_empty() {
            return Err(KpiError::Validation("store is required".into()));
        }
        if self.staff.trim().is_empty() {
            return Err(KpiError::Validation("staff name is required".into()));
        }
        if self.metrics.is_empty() {
            return Err(KpiError::Validation("no metric values entered".into()));
        }
        if let Some((name, value)) = self.metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(KpiError::Validation(format!("value for '{name}' is not a number: {value}")));
        }
        Ok(())
    }
}

/// One cell written by a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedWrite {
    pub metric: String,
    pub cell: String,
    pub mode: AggregationMode,
    /// Coerced value read before an accumulate; `None` for overwrites.
    pub previous: Option<f64>,
    pub written: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub workbook: WorkbookHandle,
    pub sheet: String,
    pub row: u32,
    pub writes: Vec<AppliedWrite>,
    /// Submitted names with no column in the schema.
    pub dropped: Vec<String>,
}

impl SubmissionOutcome {
    pub fn message(&self) -> String {
        format!("saved to [{}] ({} cells, sheet '{}')", self.workbook.name, self.writes.len(), self.sheet)
    }

    pub fn written(&self, metric: &str) -> Option<f64> {
        self.writes.iter().find(|w| w.metric == metric).map(|w| w.written)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// A store and its staff sheet names, in roster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreRoster {
    pub name: String,
    pub staff: Vec<String>,
}

impl StoreRoster {
    pub fn new(name: impl Into<String>, staff: Vec<String>) -> Self {
        Self { name: name.into(), staff }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Reported,
    NotFound,
    FormatMismatch,
    Failed,
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reported => write!(f, "reported"),
            Self::NotFound => write!(f, "not_found"),
            Self::FormatMismatch => write!(f, "format_mismatch"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where a store's figures were read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "sheets", rename_all = "snake_case")]
pub enum SheetSource {
    None,
    Summary(String),
    StaffSheets(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub store: String,
    pub status: AggregateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workbook: Option<String>,
    pub source: SheetSource,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_sheets: Vec<String>,
    pub values: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl AggregateRow {
    /// Row with every schema metric at zero.
    pub fn zeroed(store: &str, schema: &MetricSchema, status: AggregateStatus) -> Self {
        Self {
            store: store.to_string(),
            status,
            detail: None,
            workbook: None,
            source: SheetSource::None,
            missing_sheets: Vec::new(),
            values: schema.iter().map(|m| (m.name.clone(), 0.0)).collect(),
            score: None,
        }
    }

    pub fn value(&self, metric: &str) -> f64 {
        self.values.get(metric).copied().unwrap_or(0.0)
    }

    pub fn is_reported(&self) -> bool {
        self.status == AggregateStatus::Reported
    }

    /// Attach the composite score of this row's figures.
    pub fn apply_targets(&mut self, targets: &TargetSet) {
        self.score = Some(breakdown(&self.values, targets).total);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub period: ReportPeriod,
    pub rows: Vec<AggregateRow>,
    /// Company-wide figures, same fold rules as the per-store rows.
    pub totals: BTreeMap<String, f64>,
}

impl AggregateReport {
    pub fn unreported(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| !r.is_reported())
            .map(|r| r.store.as_str())
            .collect()
    }
}
