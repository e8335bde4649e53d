use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::KpiError;

pub const BUILTIN_SCHEMA_VERSION: u32 = 1;
/// Row holding day 1 of the month (1-based).
pub const DEFAULT_ANCHOR_ROW: u32 = 15;
/// Column of offset 0 (1-based; column B).
pub const DEFAULT_ANCHOR_COLUMN: u32 = 2;
/// Column holding the day number (column A).
pub const DEFAULT_DAY_COLUMN: u32 = 1;
pub const DEFAULT_PROVISIONED_DAYS: u32 = 31;
/// Largest grid the spreadsheet service allows.
pub const MAX_ROWS: u32 = 10_000_000;
pub const MAX_COLUMNS: u32 = 18_278;

// ---------------------------------------------------------------------------
// Metric definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Count,
    Currency,
    Percentage,
    Score,
}

/// How a new submission combines with the value already in the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Add to the existing cell value.
    Accumulate,
    /// Replace the existing cell value (ratios, running gaps, computed scores).
    Overwrite,
}

impl std::fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accumulate => write!(f, "accumulate"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Presentation grouping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Finance,
    Hardware,
    Service,
    Project,
    Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub column_offset: u32,
    pub value_kind: ValueKind,
    pub aggregation_mode: AggregationMode,
    pub category: Category,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Ordered metric registry plus the grid anchors of the workbook template.
///
/// Offsets are part of the on-sheet data layout: once a month's data has been
/// written under a version, an offset must never be reassigned to another
/// metric. New metrics go after the current highest offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSchema {
    pub version: u32,
    #[serde(default = "default_anchor_row")]
    pub anchor_row: u32,
    #[serde(default = "default_anchor_column")]
    pub anchor_column: u32,
    #[serde(default = "default_day_column")]
    pub day_column: u32,
    #[serde(default = "default_provisioned_days")]
    pub provisioned_days: u32,
    pub metrics: Vec<MetricDefinition>,
}

fn default_anchor_row() -> u32 {
    DEFAULT_ANCHOR_ROW
}

fn default_anchor_column() -> u32 {
    DEFAULT_ANCHOR_COLUMN
}

fn default_day_column() -> u32 {
    DEFAULT_DAY_COLUMN
}

fn default_provisioned_days() -> u32 {
    DEFAULT_PROVISIONED_DAYS
}

const BUILTIN_METRICS: &[(&str, ValueKind, AggregationMode, Category)] = &[
    ("毛利", ValueKind::Currency, AggregationMode::Accumulate, Category::Finance),
    ("門號", ValueKind::Count, AggregationMode::Accumulate, Category::Service),
    ("保險營收", ValueKind::Currency, AggregationMode::Accumulate, Category::Finance),
    ("配件營收", ValueKind::Currency, AggregationMode::Accumulate, Category::Finance),
    ("庫存手機", ValueKind::Count, AggregationMode::Accumulate, Category::Hardware),
    ("蘋果手機", ValueKind::Count, AggregationMode::Accumulate, Category::Hardware),
    ("蘋果平板+手錶", ValueKind::Count, AggregationMode::Accumulate, Category::Hardware),
    ("VIVO手機", ValueKind::Count, AggregationMode::Accumulate, Category::Hardware),
    ("生活圈", ValueKind::Count, AggregationMode::Accumulate, Category::Project),
    ("GOOGLE 評論", ValueKind::Count, AggregationMode::Accumulate, Category::Project),
    ("來客數", ValueKind::Count, AggregationMode::Accumulate, Category::Service),
    ("遠傳續約累積GAP", ValueKind::Count, AggregationMode::Overwrite, Category::Project),
    ("遠傳升續率", ValueKind::Percentage, AggregationMode::Overwrite, Category::Project),
    ("遠傳平續率", ValueKind::Percentage, AggregationMode::Overwrite, Category::Project),
    ("綜合達成率", ValueKind::Score, AggregationMode::Overwrite, Category::Score),
];

impl MetricSchema {
    /// Version 1 of the daily report template: offsets 0..=13 are the
    /// first fourteen columns B..O, the composite score sits in column P.
    pub fn builtin() -> Self {
        let metrics = BUILTIN_METRICS
            .iter()
            .enumerate()
            .map(|(offset, &(name, value_kind, aggregation_mode, category))| MetricDefinition {
                name: name.to_string(),
                column_offset: offset as u32,
                value_kind,
                aggregation_mode,
                category,
            })
            .collect();

        Self {
            version: BUILTIN_SCHEMA_VERSION,
            anchor_row: DEFAULT_ANCHOR_ROW,
            anchor_column: DEFAULT_ANCHOR_COLUMN,
            day_column: DEFAULT_DAY_COLUMN,
            provisioned_days: DEFAULT_PROVISIONED_DAYS,
            metrics,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, KpiError> {
        let schema: MetricSchema =
            toml::from_str(input).map_err(|e| KpiError::Schema(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        if self.version == 0 {
            return Err(KpiError::Schema("version must be >= 1".into()));
        }
        if self.anchor_row == 0 || self.anchor_column == 0 || self.day_column == 0 {
            return Err(KpiError::Schema("anchor row/columns are 1-based and must be >= 1".into()));
        }
        if self.provisioned_days == 0 {
            return Err(KpiError::Schema("provisioned_days must be >= 1".into()));
        }
        if self.metrics.is_empty() {
            return Err(KpiError::Schema("at least one metric is required".into()));
        }

        let mut names = HashSet::new();
        let mut offsets = HashSet::new();
        for metric in &self.metrics {
            if metric.name.trim().is_empty() {
                return Err(KpiError::Schema("metric name must not be empty".into()));
            }
            if !names.insert(metric.name.as_str()) {
                return Err(KpiError::Schema(format!("duplicate metric name '{}'", metric.name)));
            }
            if !offsets.insert(metric.column_offset) {
                return Err(KpiError::Schema(format!(
                    "column offset {} assigned to more than one metric (second: '{}')",
                    metric.column_offset, metric.name
                )));
            }
        }

        let last_row = u64::from(self.anchor_row) + u64::from(self.provisioned_days) - 1;
        if last_row > u64::from(MAX_ROWS) {
            return Err(KpiError::Schema(format!(
                "day block ends at row {last_row}, past the {MAX_ROWS}-row grid limit"
            )));
        }
        let last_col = u64::from(self.anchor_column) + u64::from(self.max_offset());
        if last_col > u64::from(MAX_COLUMNS) || self.day_column > MAX_COLUMNS {
            return Err(KpiError::Schema(format!(
                "metric columns end at column {last_col}, past the {MAX_COLUMNS}-column grid limit"
            )));
        }

        if self.metrics.iter().any(|m| self.column_of(m) == self.day_column) {
            return Err(KpiError::Schema(format!(
                "day column {} overlaps a metric column",
                self.day_column
            )));
        }

        Ok(())
    }

    /// Exact-name lookup.
    pub fn resolve(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn max_offset(&self) -> u32 {
        self.metrics.iter().map(|m| m.column_offset).max().unwrap_or(0)
    }

    /// Absolute column of a metric (1-based).
    pub fn column_of(&self, metric: &MetricDefinition) -> u32 {
        self.anchor_column.saturating_add(metric.column_offset)
    }

    /// Next free offset for appending a metric.
    pub fn next_offset(&self) -> u32 {
        if self.metrics.is_empty() {
            0
        } else {
            self.max_offset().saturating_add(1)
        }
    }
}

impl Default for MetricSchema {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
