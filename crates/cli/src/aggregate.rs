//! `kpi aggregate` - month roll-up across the configured stores.

use kpiboard_sync::{AccessRole, KpiError, ReportPeriod};

use crate::backend::Backend;
use crate::render;
use crate::report::print_json;
use crate::{CliError, Invocation};

pub fn cmd_aggregate(inv: &Invocation, month: &str, password: Option<&str>, json: bool) -> Result<(), CliError> {
    let period = ReportPeriod::parse(month)?;
    let settings = inv.load_settings()?;

    let role = password
        .and_then(|p| settings.authenticate(None, p))
        .filter(|r| *r == AccessRole::Admin)
        .ok_or_else(|| KpiError::AccessDenied("the aggregate view needs the admin password".into()))?;

    let rosters = settings.rosters();
    if rosters.is_empty() {
        return Err(CliError::args("no stores configured")
            .with_hint(format!("add [[stores]] entries to {}", inv.settings_path().display())));
    }

    let backend = Backend::select(inv, &settings)?;
    let mut app = backend.context(&settings);
    app.sign_in(role);

    let report = app.aggregate(&rosters, period, &settings.store_targets())?;
    for store in report.unreported() {
        log::warn!("{}: no figures for {}", store, period);
    }

    if json {
        print_json(&report)
    } else {
        print!("{}", render::aggregate_table(&report, app.schema()));
        Ok(())
    }
}
