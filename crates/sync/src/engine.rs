//! Submission pipeline: preview, then locate → address → synchronize.

use serde::Serialize;

use crate::addressing::row_for_date;
use crate::error::KpiError;
use crate::locator::WorkbookLocator;
use crate::locks::RowLocks;
use crate::model::{ReportSubmission, SubmissionOutcome};
use crate::schema::{AggregationMode, MetricSchema};
use crate::score::{breakdown, ScoreBreakdown, TargetSet};
use crate::service::SheetService;
use crate::synchronizer::{SyncOptions, Synchronizer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewLine {
    pub metric: String,
    pub value: f64,
    pub mode: AggregationMode,
}

/// What a submission would write, computed without touching the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub submission: ReportSubmission,
    pub row: u32,
    pub lines: Vec<PreviewLine>,
    pub dropped: Vec<String>,
    pub score: ScoreBreakdown,
}

/// At least one submitted name must map to a column, otherwise there is
/// nothing to write.
fn require_known_metric(submission: &ReportSubmission, schema: &MetricSchema) -> Result<(), KpiError> {
    if submission.metrics.keys().any(|name| schema.resolve(name).is_some()) {
        return Ok(());
    }
    let names: Vec<&str> = submission.metrics.keys().map(String::as_str).collect();
    Err(KpiError::Validation(format!(
        "none of the submitted metrics are known: {}",
        names.join(", ")
    )))
}

/// Validate a submission and score the entered figures against `targets`.
pub fn preview(
    submission: &ReportSubmission,
    schema: &MetricSchema,
    targets: &TargetSet,
) -> Result<Preview, KpiError> {
    submission.validate()?;
    require_known_metric(submission, schema)?;
    let row = row_for_date(schema, submission.report_date)?;

    let mut lines = Vec::new();
    let mut dropped = Vec::new();
    for (name, value) in &submission.metrics {
        match schema.resolve(name) {
            Some(metric) => lines.push(PreviewLine {
                metric: metric.name.clone(),
                value: *value,
                mode: metric.aggregation_mode,
            }),
            None => {
                log::warn!("preview: ignoring unknown metric '{}'", name);
                dropped.push(name.clone());
            }
        }
    }

    let score = breakdown(&submission.metrics, targets);
    Ok(Preview {
        submission: submission.clone(),
        row,
        lines,
        dropped,
        score,
    })
}

/// Write a confirmed submission. The submission is consumed: a retry must
/// be an explicit new submission.
pub fn submit_report(
    service: &dyn SheetService,
    schema: &MetricSchema,
    root_folder: &str,
    submission: ReportSubmission,
    locks: Option<&RowLocks>,
    options: SyncOptions,
) -> Result<SubmissionOutcome, KpiError> {
    submission.validate()?;
    require_known_metric(&submission, schema)?;
    let row = row_for_date(schema, submission.report_date)?;
    let workbook = WorkbookLocator::new(service, root_folder).locate(&submission.store, submission.period())?;

    let mut sync = Synchronizer::new(service, schema).with_options(options);
    if let Some(locks) = locks {
        sync = sync.with_locks(locks);
    }
    sync.submit(&workbook, &submission.staff, row, &submission.metrics)
}
