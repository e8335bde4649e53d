//! Cross-store monthly aggregation.
//!
//! Every configured store yields exactly one row, whether or not its
//! workbook could be read. Per metric column, accumulate metrics are summed
//! over the day rows; overwrite metrics keep the last non-zero value seen.
//! "Last" means read order: day rows top to bottom, staff sheets in roster
//! order, which only matches "latest" while the template keeps dates
//! ascending.

use std::collections::BTreeMap;

use crate::addressing::CellRange;
use crate::coerce::safe_numeric;
use crate::error::KpiError;
use crate::locator::WorkbookLocator;
use crate::model::{AggregateReport, AggregateRow, AggregateStatus, ReportPeriod, SheetSource, StoreRoster};
use crate::naming::pick_summary_sheet;
use crate::schema::{AggregationMode, MetricSchema};
use crate::score::TargetSet;
use crate::service::{grid_cell, SheetHandle, SheetService};

pub struct Aggregator<'a> {
    service: &'a dyn SheetService,
    schema: &'a MetricSchema,
    root_folder: &'a str,
    targets: Option<&'a BTreeMap<String, TargetSet>>,
}

impl<'a> Aggregator<'a> {
    pub fn new(service: &'a dyn SheetService, schema: &'a MetricSchema, root_folder: &'a str) -> Self {
        Self {
            service,
            schema,
            root_folder,
            targets: None,
        }
    }

    /// Score each store against its targets (keyed by store name).
    pub fn with_targets(mut self, targets: &'a BTreeMap<String, TargetSet>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// One row per store in `stores`, in order, plus company totals.
    /// Stores are read one after another.
    pub fn aggregate(&self, stores: &[StoreRoster], period: ReportPeriod) -> AggregateReport {
        let rows: Vec<AggregateRow> = stores
            .iter()
            .map(|roster| {
                let mut row = self.store_row(roster, period).unwrap_or_else(|err| {
                    log::warn!("{}: {}", roster.name, err);
                    let status = match err {
                        KpiError::WorkbookNotFound { .. } => AggregateStatus::NotFound,
                        KpiError::FormatMismatch { .. } => AggregateStatus::FormatMismatch,
                        _ => AggregateStatus::Failed,
                    };
                    let mut row = AggregateRow::zeroed(&roster.name, self.schema, status);
                    row.detail = Some(err.to_string());
                    row
                });
                if let Some(goals) = self.targets.and_then(|t| t.get(&roster.name)) {
                    row.apply_targets(goals);
                }
                row
            })
            .collect();

        let mut totals = zero_values(self.schema);
        for row in &rows {
            for metric in self.schema.iter() {
                fold(&mut totals, &metric.name, metric.aggregation_mode, row.value(&metric.name));
            }
        }

        AggregateReport { period, rows, totals }
    }

    fn store_row(&self, roster: &StoreRoster, period: ReportPeriod) -> Result<AggregateRow, KpiError> {
        let workbook = WorkbookLocator::new(self.service, self.root_folder).locate(&roster.name, period)?;
        let sheets = self.service.list_sheets(&workbook)?;
        let range = CellRange::period(self.schema, period.days());

        let mut row = AggregateRow::zeroed(&roster.name, self.schema, AggregateStatus::Reported);
        row.workbook = Some(workbook.name.clone());

        if let Some(summary) = pick_summary_sheet(&sheets) {
            let handle = SheetHandle {
                workbook_id: workbook.id.clone(),
                title: summary.to_string(),
            };
            self.fold_sheet(&handle, &range, &mut row.values)?;
            row.source = SheetSource::Summary(summary.to_string());
            return Ok(row);
        }

        let wanted: Vec<String> = if roster.staff.is_empty() {
            sheets.clone()
        } else {
            roster.staff.clone()
        };
        let mut read = Vec::new();
        for staff in wanted {
            if !sheets.contains(&staff) {
                log::warn!("[{}] has no sheet for '{}'", workbook.name, staff);
                row.missing_sheets.push(staff);
                continue;
            }
            let handle = SheetHandle {
                workbook_id: workbook.id.clone(),
                title: staff.clone(),
            };
            self.fold_sheet(&handle, &range, &mut row.values)?;
            read.push(staff);
        }
        row.source = SheetSource::StaffSheets(read);
        Ok(row)
    }

    fn fold_sheet(
        &self,
        sheet: &SheetHandle,
        range: &CellRange,
        values: &mut BTreeMap<String, f64>,
    ) -> Result<(), KpiError> {
        let grid = self.service.read_range(sheet, range)?;
        for metric in self.schema.iter() {
            let col_idx = (self.schema.column_of(metric) - range.first_col) as usize;
            for row_idx in 0..range.rows() as usize {
                let v = safe_numeric(grid_cell(&grid, row_idx, col_idx));
                fold(values, &metric.name, metric.aggregation_mode, v);
            }
        }
        Ok(())
    }
}

fn zero_values(schema: &MetricSchema) -> BTreeMap<String, f64> {
    schema.iter().map(|m| (m.name.clone(), 0.0)).collect()
}

fn fold(values: &mut BTreeMap<String, f64>, metric: &str, mode: AggregationMode, v: f64) {
    let slot = values.entry(metric.to_string()).or_insert(0.0);
    match mode {
        AggregationMode::Accumulate => *slot += v,
        AggregationMode::Overwrite => {
            if v != 0.0 {
                *slot = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;
    use crate::score::Goal;
    use crate::service::{CellValue, ServiceError, SPREADSHEET_MIME};

    fn jan() -> ReportPeriod {
        ReportPeriod::new(2026, 1).unwrap()
    }

    fn roster(name: &str, staff: &[&str]) -> StoreRoster {
        StoreRoster::new(name, staff.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn summary_sheet_preferred() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        let wb = svc.add_workbook("2026_01_東門店業績日報表", Some("root"), &["小明", "總計", "總表"]);
        svc.set_cell(&wb, "總表", 15, 2, CellValue::Number(100.0));
        svc.set_cell(&wb, "總計", 15, 2, CellValue::Number(999.0));
        svc.set_cell(&wb, "小明", 15, 2, CellValue::Number(7.0));

        let report = Aggregator::new(&svc, &schema, "root").aggregate(&[roster("東門店", &["小明"])], jan());
        let row = &report.rows[0];
        assert_eq!(row.source, SheetSource::Summary("總表".into()));
        assert_eq!(row.value("毛利"), 100.0);
    }

    #[test]
    fn staff_sheets_summed_without_summary() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        let wb = svc.add_workbook("2026_01_東門店業績日報表", Some("root"), &["小明", "小華"]);
        let rate = schema.column_of(schema.resolve("遠傳升續率").unwrap());
        svc.set_cell(&wb, "小明", 15, 2, CellValue::Number(1000.0));
        svc.set_cell(&wb, "小明", 16, 2, CellValue::Text("500".into()));
        svc.set_cell(&wb, "小華", 20, 2, CellValue::Number(250.0));
        svc.set_cell(&wb, "小明", 15, rate, CellValue::Number(0.8));
        svc.set_cell(&wb, "小明", 18, rate, CellValue::Number(0.75));
        svc.set_cell(&wb, "小明", 19, rate, CellValue::Number(0.0));

        let report = Aggregator::new(&svc, &schema, "root")
            .aggregate(&[roster("東門店", &["小明", "小華", "阿土"])], jan());
        let row = &report.rows[0];
        assert!(row.is_reported());
        assert_eq!(row.value("毛利"), 1750.0);
        assert_eq!(row.value("遠傳升續率"), 0.75);
        assert_eq!(row.missing_sheets, vec!["阿土".to_string()]);
        assert_eq!(row.source, SheetSource::StaffSheets(vec!["小明".into(), "小華".into()]));
    }

    #[test]
    fn rows_beyond_month_end_ignored() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        let wb = svc.add_workbook("2026_02_東門店業績日報表", Some("root"), &["總表"]);
        svc.set_cell(&wb, "總表", 15 + 27, 2, CellValue::Number(1.0)); // Feb 28
        svc.set_cell(&wb, "總表", 15 + 28, 2, CellValue::Number(50.0)); // no Feb 29 in 2026

        let report = Aggregator::new(&svc, &schema, "root")
            .aggregate(&[roster("東門店", &[])], ReportPeriod::new(2026, 2).unwrap());
        assert_eq!(report.rows[0].value("毛利"), 1.0);
    }

    #[test]
    fn one_row_per_store_with_status() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        svc.add_workbook("2026_01_東門店業績日報表", Some("root"), &["總表"]);
        svc.add_file_at("2026_01_西門店業績日報表.xlsx", Some("root"), "application/vnd.ms-excel", None);

        let stores = [roster("東門店", &[]), roster("西門店", &[]), roster("北門店", &[])];
        let report = Aggregator::new(&svc, &schema, "root").aggregate(&stores, jan());

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].status, AggregateStatus::Reported);
        assert_eq!(report.rows[1].status, AggregateStatus::FormatMismatch);
        assert_eq!(report.rows[2].status, AggregateStatus::NotFound);
        assert!(report.rows[2].values.values().all(|v| *v == 0.0));
        assert_eq!(report.unreported(), vec!["西門店", "北門店"]);
    }

    #[test]
    fn remote_failure_becomes_failed_row() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        svc.add_file_at("2026_01_東門店業績日報表", Some("root"), SPREADSHEET_MIME, None);
        svc.fail_next(ServiceError::Timeout("files.list".into()));

        let report = Aggregator::new(&svc, &schema, "root")
            .aggregate(&[roster("東門店", &[]), roster("西門店", &[])], jan());
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].status, AggregateStatus::Failed);
        assert!(report.rows[0].detail.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn totals_and_scores() {
        let svc = MemoryService::new();
        let schema = MetricSchema::builtin();
        let rate = schema.column_of(schema.resolve("遠傳升續率").unwrap());
        let east = svc.add_workbook("2026_01_東門店業績日報表", Some("root"), &["總表"]);
        let west = svc.add_workbook("2026_01_西門店業績日報表", Some("root"), &["總表"]);
        svc.set_cell(&east, "總表", 15, 2, CellValue::Number(1000.0));
        svc.set_cell(&west, "總表", 15, 2, CellValue::Number(3000.0));
        svc.set_cell(&east, "總表", 15, rate, CellValue::Number(0.6));

        let mut goals = TargetSet::new();
        goals.insert("毛利".into(), Goal { target: 2000.0, weight: 1.0 });
        let mut targets = BTreeMap::new();
        targets.insert("東門店".to_string(), goals);

        let report = Aggregator::new(&svc, &schema, "root")
            .with_targets(&targets)
            .aggregate(&[roster("東門店", &[]), roster("西門店", &[])], jan());
        assert_eq!(report.totals["毛利"], 4000.0);
        assert_eq!(report.totals["遠傳升續率"], 0.6);
        assert_eq!(report.rows[0].score, Some(0.5));
        assert_eq!(report.rows[1].score, None);
    }
}
