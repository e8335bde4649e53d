//! Date → row and metric → column mapping on the daily report grid.
//!
//! The template is a fixed calendar block: day 1 sits on `anchor_row`, every
//! following day one row lower, `provisioned_days` rows in total regardless
//! of month length. Rows and columns are 1-based throughout.

use chrono::{Datelike, NaiveDate};

use crate::error::KpiError;
use crate::schema::MetricSchema;

/// Destination row for a day of month. Days outside the provisioned block
/// are rejected instead of spilling into the rows below it.
pub fn target_row(schema: &MetricSchema, day_of_month: u32) -> Result<u32, KpiError> {
    if day_of_month == 0 || day_of_month > schema.provisioned_days {
        return Err(KpiError::RowOutOfRange {
            day: day_of_month,
            provisioned: schema.provisioned_days,
        });
    }
    schema
        .anchor_row
        .checked_add(day_of_month - 1)
        .ok_or_else(|| {
            KpiError::Schema(format!(
                "anchor row {} leaves no room for day {}",
                schema.anchor_row, day_of_month
            ))
        })
}

pub fn row_for_date(schema: &MetricSchema, date: NaiveDate) -> Result<u32, KpiError> {
    target_row(schema, date.day())
}

/// Inverse of [`target_row`], for rows inside the block.
pub fn day_for_row(schema: &MetricSchema, row: u32) -> Option<u32> {
    let day = row.checked_sub(schema.anchor_row)?.checked_add(1)?;
    (day <= schema.provisioned_days).then_some(day)
}

/// Destination column for a metric name, `None` if the schema lacks it.
pub fn target_column(schema: &MetricSchema, metric_name: &str) -> Option<u32> {
    schema.resolve(metric_name).map(|m| schema.column_of(m))
}

/// Column letters for a 1-based index: 1 → A, 26 → Z, 27 → AA.
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

pub fn a1(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Inclusive rectangular range, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl CellRange {
    pub fn new(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    pub fn single(row: u32, col: u32) -> Self {
        Self::new(row, col, row, col)
    }

    /// Metric columns of one day row.
    pub fn day_row(schema: &MetricSchema, row: u32) -> Self {
        Self::new(row, schema.anchor_column, row, schema.anchor_column.saturating_add(schema.max_offset()))
    }

    /// Metric columns for the first `days` days of the block.
    pub fn period(schema: &MetricSchema, days: u32) -> Self {
        let days = days.clamp(1, schema.provisioned_days);
        Self::new(
            schema.anchor_row,
            schema.anchor_column,
            schema.anchor_row.saturating_add(days - 1),
            schema.anchor_column.saturating_add(schema.max_offset()),
        )
    }

    pub fn rows(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    pub fn cols(&self) -> u32 {
        self.last_col - self.first_col + 1
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.first_row..=self.last_row).contains(&row) && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn to_a1(&self) -> String {
        if self.first_row == self.last_row && self.first_col == self.last_col {
            a1(self.first_row, self.first_col)
        } else {
            format!("{}:{}", a1(self.first_row, self.first_col), a1(self.last_row, self.last_col))
        }
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_one_is_anchor_row() {
        let schema = MetricSchema::builtin();
        assert_eq!(target_row(&schema, 1).unwrap(), 15);
        assert_eq!(target_row(&schema, 5).unwrap(), 19);
        assert_eq!(target_row(&schema, 31).unwrap(), 45);
    }

    #[test]
    fn unvalidated_anchor_does_not_overflow() {
        let mut schema = MetricSchema::builtin();
        schema.anchor_row = u32::MAX;
        schema.anchor_column = u32::MAX;
        assert!(matches!(target_row(&schema, 5), Err(KpiError::Schema(_))));
        assert_eq!(target_row(&schema, 1).unwrap(), u32::MAX);

        let range = CellRange::period(&schema, 31);
        assert_eq!(range.last_row, u32::MAX);
        assert_eq!(range.last_col, u32::MAX);
        assert_eq!(CellRange::day_row(&schema, 1).last_col, u32::MAX);
    }

    #[test]
    fn out_of_block_days_rejected() {
        let mut schema = MetricSchema::builtin();
        assert!(matches!(target_row(&schema, 0), Err(KpiError::RowOutOfRange { day: 0, .. })));
        assert!(matches!(target_row(&schema, 32), Err(KpiError::RowOutOfRange { day: 32, .. })));

        schema.provisioned_days = 30;
        let err = target_row(&schema, 31).unwrap_err();
        assert!(err.to_string().contains("30 provisioned"));
    }

    #[test]
    fn row_for_date_uses_day_of_month() {
        let schema = MetricSchema::builtin();
        let date = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(row_for_date(&schema, date).unwrap(), 42);
        assert_eq!(day_for_row(&schema, 42), Some(28));
        assert_eq!(day_for_row(&schema, 14), None);
        assert_eq!(day_for_row(&schema, 46), None);
    }

    #[test]
    fn target_column_via_schema() {
        let schema = MetricSchema::builtin();
        assert_eq!(target_column(&schema, "毛利"), Some(2));
        assert_eq!(target_column(&schema, "來客數"), Some(12));
        assert_eq!(target_column(&schema, "不存在欄位"), None);
    }

    #[test]
    fn letters() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(2), "B");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(52), "AZ");
        assert_eq!(column_letters(703), "AAA");
        assert_eq!(a1(15, 2), "B15");
    }

    #[test]
    fn period_range_covers_metric_block() {
        let schema = MetricSchema::builtin();
        let range = CellRange::period(&schema, 31);
        assert_eq!(range.to_a1(), "B15:P45");
        assert_eq!(range.rows(), 31);
        assert_eq!(range.cols(), 15);

        let feb = CellRange::period(&schema, 28);
        assert_eq!(feb.to_a1(), "B15:P42");
        assert!(feb.contains(42, 16));
        assert!(!feb.contains(43, 2));

        assert_eq!(CellRange::day_row(&schema, 19).to_a1(), "B19:P19");
        assert_eq!(CellRange::single(19, 1).to_a1(), "A19");
    }
}
