//! Read-modify-write of one staff member's day row.
//!
//! Overwrite metrics are written as given. Accumulate metrics read the
//! current cell, coerce it with [`safe_numeric`] and write the sum. All
//! staged cells go out in a single batch write. Nothing here makes the cycle
//! atomic against other writers: two submitters racing on the same row from
//! different processes can still lose an update.

use std::collections::BTreeMap;

use crate::addressing::{a1, day_for_row, CellRange};
use crate::coerce::{safe_numeric, safe_numeric_str};
use crate::error::KpiError;
use crate::locks::{RowKey, RowLocks};
use crate::model::{AppliedWrite, SubmissionOutcome};
use crate::schema::{AggregationMode, MetricDefinition, MetricSchema};
use crate::service::{grid_cell, CellValue, CellWrite, SheetHandle, SheetService, WorkbookHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Check the day number in the day column before writing the row.
    pub verify_day_column: bool,
}

pub struct Synchronizer<'a> {
    service: &'a dyn SheetService,
    schema: &'a MetricSchema,
    locks: Option<&'a RowLocks>,
    options: SyncOptions,
}

impl<'a> Synchronizer<'a> {
    pub fn new(service: &'a dyn SheetService, schema: &'a MetricSchema) -> Self {
        Self {
            service,
            schema,
            locks: None,
            options: SyncOptions::default(),
        }
    }

    pub fn with_locks(mut self, locks: &'a RowLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply `updates` to `row` of the `staff` sheet in `workbook`.
    ///
    /// Names missing from the schema are dropped with a warning and listed
    /// in the outcome. Fails if no known metric remains.
    pub fn submit(
        &self,
        workbook: &WorkbookHandle,
        staff: &str,
        row: u32,
        updates: &BTreeMap<String, f64>,
    ) -> Result<SubmissionOutcome, KpiError> {
        if let Some((name, value)) = updates.iter().find(|(_, v)| !v.is_finite()) {
            return Err(KpiError::Validation(format!("value for '{name}' is not a number: {value}")));
        }

        let (known, dropped) = self.partition(updates);
        if known.is_empty() {
            return Err(KpiError::Validation(format!(
                "none of the submitted metrics are known: {}",
                dropped.join(", ")
            )));
        }

        let sheet = match self.service.get_sheet(workbook, staff)? {
            Some(sheet) => sheet,
            None => {
                let available = self.service.list_sheets(workbook)?;
                return Err(KpiError::SheetNotFound {
                    workbook: workbook.name.clone(),
                    sheet: staff.to_string(),
                    available,
                });
            }
        };

        let _guard = self
            .locks
            .map(|locks| locks.acquire(RowKey::new(workbook.id.as_str(), sheet.title.as_str(), row)));

        if self.options.verify_day_column {
            self.check_day_column(&sheet, row)?;
        }

        let existing = if known.iter().any(|(m, _)| m.aggregation_mode == AggregationMode::Accumulate) {
            let range = CellRange::day_row(self.schema, row);
            Some((range, self.service.read_range(&sheet, &range)?))
        } else {
            None
        };

        let mut writes = Vec::with_capacity(known.len());
        let mut applied = Vec::with_capacity(known.len());
        for (metric, value) in known {
            let col = self.schema.column_of(metric);
            let (previous, written) = match (metric.aggregation_mode, &existing) {
                (AggregationMode::Accumulate, Some((range, grid))) => {
                    let old = safe_numeric(grid_cell(grid, 0, (col - range.first_col) as usize));
                    (Some(old), old + value)
                }
                _ => (None, value),
            };
            writes.push(CellWrite {
                row,
                col,
                value: CellValue::Number(written),
            });
            applied.push(AppliedWrite {
                metric: metric.name.clone(),
                cell: a1(row, col),
                mode: metric.aggregation_mode,
                previous,
                written,
            });
        }

        self.service.batch_write(&sheet, &writes)?;
        log::info!(
            "wrote {} cells to [{}] sheet '{}' row {}",
            writes.len(),
            workbook.name,
            sheet.title,
            row
        );

        Ok(SubmissionOutcome {
            workbook: workbook.clone(),
            sheet: sheet.title,
            row,
            writes: applied,
            dropped,
        })
    }

    fn partition(&self, updates: &BTreeMap<String, f64>) -> (Vec<(&'a MetricDefinition, f64)>, Vec<String>) {
        let mut known = Vec::new();
        let mut dropped = Vec::new();
        for (name, value) in updates {
            match self.schema.resolve(name) {
                Some(metric) => known.push((metric, *value)),
                None => {
                    log::warn!("dropping unknown metric '{}' (value {})", name, value);
                    dropped.push(name.clone());
                }
            }
        }
        (known, dropped)
    }

    fn check_day_column(&self, sheet: &SheetHandle, row: u32) -> Result<(), KpiError> {
        let Some(expected) = day_for_row(self.schema, row) else {
            return Ok(());
        };
        let cell = self.service.read_cell(sheet, row, self.schema.day_column)?;
        let found = match &cell {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(t) if !t.trim().is_empty() => {
                let n = safe_numeric_str(t);
                (n != 0.0).then_some(n)
            }
            _ => None,
        };
        match found {
            Some(n) if n != f64::from(expected) => Err(KpiError::TemplateMismatch {
                sheet: sheet.title.clone(),
                row,
                expected,
                found: cell.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
