//! `kpiboard-sync`: store KPI workbook synchronization.
//!
//! Locates the per-store monthly workbook, maps metrics onto the daily grid,
//! applies read-modify-write batches, aggregates across stores and scores
//! results against targets. The remote spreadsheet backend is only reached
//! through [`service::SheetService`]; no HTTP or CLI dependencies here.

pub mod addressing;
pub mod aggregate;
pub mod coerce;
pub mod context;
pub mod engine;
pub mod error;
pub mod locator;
pub mod locks;
pub mod memory;
pub mod model;
pub mod naming;
pub mod schema;
pub mod score;
pub mod service;
pub mod synchronizer;

pub use aggregate::Aggregator;
pub use coerce::safe_numeric;
pub use context::{AccessRole, AppContext, AuthState};
pub use engine::{preview, submit_report, Preview};
pub use error::KpiError;
pub use locator::WorkbookLocator;
pub use memory::MemoryService;
pub use model::{AggregateReport, AggregateRow, ReportPeriod, ReportSubmission, StoreRoster, SubmissionOutcome};
pub use locks::RowLocks;
pub use schema::{AggregationMode, MetricDefinition, MetricSchema};
pub use score::{Goal, ScoreBreakdown, TargetSet};
pub use service::{CellValue, ServiceError, SheetService};
pub use synchronizer::{SyncOptions, Synchronizer};
