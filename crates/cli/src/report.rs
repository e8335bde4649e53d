//! Per-store commands: schema, locate, preview, submit.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use chrono::{Local, NaiveDate};
use kpiboard_config::Settings;
use kpiboard_sync::{preview, KpiError, MetricSchema, ReportPeriod, ReportSubmission, WorkbookLocator};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::Backend;
use crate::exit_codes::*;
use crate::render;
use crate::{CliError, EntryArgs, Invocation};

// ── Schema ──────────────────────────────────────────────────────────

pub fn cmd_schema(inv: &Invocation, json: bool) -> Result<(), CliError> {
    let schema = inv
        .try_load_settings()?
        .map(|s| s.schema())
        .unwrap_or_else(MetricSchema::builtin);

    if json {
        print_json(&schema)
    } else {
        print!("{}", render::schema_table(&schema));
        Ok(())
    }
}

// ── Locate ──────────────────────────────────────────────────────────

pub fn cmd_locate(inv: &Invocation, store: &str, month: &str, json: bool) -> Result<(), CliError> {
    let period = ReportPeriod::parse(month)?;
    let settings = inv.load_settings()?;
    let backend = Backend::select(inv, &settings)?;
    let app = backend.context(&settings);

    let client = app.client()?;
    let handle = WorkbookLocator::new(client.as_ref(), app.root_folder()).locate(store, period)?;
    let sheets = client.list_sheets(&handle)?;

    if json {
        print_json(&serde_json::json!({
            "workbook": handle,
            "sheets": sheets,
        }))
    } else {
        println!("{}", handle.name);
        println!("  id:     {}", handle.id);
        println!("  url:    {}", handle.url);
        println!("  sheets: {}", sheets.join(", "));
        Ok(())
    }
}

// ── Preview / submit ────────────────────────────────────────────────

/// `--input` file layout. Every field may be overridden by flags.
#[derive(Debug, Default, Deserialize)]
struct EntryFile {
    store: Option<String>,
    staff: Option<String>,
    date: Option<String>,
    #[serde(default)]
    metrics: BTreeMap<String, Value>,
}

fn read_entry_file(path: &Path) -> Result<EntryFile, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| CliError::args(format!("{}: {}", path.display(), e)))
}

/// Strict number parsing for typed-in values. Thousands separators are
/// allowed; anything else unparsable is a usage error rather than zero.
fn parse_value(name: &str, raw: &str) -> Result<f64, CliError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CliError::args(format!("value for '{}' is not a number: '{}'", name, raw)))
}

fn json_value(name: &str, value: &Value) -> Result<f64, CliError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CliError::args(format!("value for '{}' is out of range", name))),
        Value::String(s) => parse_value(name, s),
        other => Err(CliError::args(format!("value for '{}' must be a number, got {}", name, other))),
    }
}

fn parse_metric_flag(flag: &str) -> Result<(String, f64), CliError> {
    let (name, raw) = flag
        .split_once('=')
        .ok_or_else(|| CliError::args(format!("expected NAME=VALUE, got '{}'", flag)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::args(format!("metric name missing in '{}'", flag)));
    }
    Ok((name.to_string(), parse_value(name, raw)?))
}

fn parse_date(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::args(format!("cannot parse date '{}' (expected YYYY-MM-DD)", raw)))
}

/// Merge `--input` and flags into one submission.
pub fn build_submission(entry: &EntryArgs) -> Result<ReportSubmission, CliError> {
    let file = match &entry.input {
        Some(path) => read_entry_file(path)?,
        None => EntryFile::default(),
    };

    let store = entry
        .store
        .clone()
        .or(file.store)
        .ok_or_else(|| CliError::args("--store is required"))?;
    let staff = entry
        .staff
        .clone()
        .or(file.staff)
        .ok_or_else(|| CliError::args("--staff is required"))?;
    let report_date = match entry.date.as_deref().or(file.date.as_deref()) {
        Some(raw) => parse_date(raw)?,
        None => Local::now().date_naive(),
    };

    let mut metrics = BTreeMap::new();
    for (name, value) in &file.metrics {
        metrics.insert(name.trim().to_string(), json_value(name, value)?);
    }
    for flag in &entry.metrics {
        let (name, value) = parse_metric_flag(flag)?;
        metrics.insert(name, value);
    }
    if metrics.is_empty() {
        return Err(CliError::args("no metric values given").with_hint("pass --metric NAME=VALUE or --input FILE"));
    }

    Ok(ReportSubmission::new(store, staff, report_date, metrics))
}

pub fn cmd_preview(inv: &Invocation, entry: &EntryArgs, json: bool) -> Result<(), CliError> {
    let submission = build_submission(entry)?;
    let settings = inv.try_load_settings()?;
    let (schema, targets) = match &settings {
        Some(s) => (s.schema(), s.targets_for(&submission.store, Some(&submission.staff))),
        None => (MetricSchema::builtin(), Default::default()),
    };

    let preview = preview(&submission, &schema, &targets)?;
    if json {
        print_json(&preview)
    } else {
        print!("{}", render::preview(&preview, &schema));
        Ok(())
    }
}

pub fn cmd_submit(
    inv: &Invocation,
    entry: &EntryArgs,
    password: Option<&str>,
    yes: bool,
    json: bool,
) -> Result<(), CliError> {
    let submission = build_submission(entry)?;
    let settings = inv.load_settings()?;

    let role = authenticate(&settings, &submission.store, password)?;
    let backend = Backend::select(inv, &settings)?;
    let mut app = backend.context(&settings);
    app.sign_in(role);

    let targets = settings.targets_for(&submission.store, Some(&submission.staff));
    let preview = preview(&submission, app.schema(), &targets)?;
    if !json {
        print!("{}", render::preview(&preview, app.schema()));
    }

    app.stage(submission)?;
    if !yes && !confirm()? {
        app.take_pending();
        return Err(CliError {
            code: EXIT_CANCELLED,
            message: "cancelled; nothing was written".into(),
            hint: None,
        });
    }

    let outcome = app.confirm()?;
    backend.persist()?;

    if json {
        print_json(&outcome)
    } else {
        print!("{}", render::outcome(&outcome));
        Ok(())
    }
}

fn authenticate(
    settings: &Settings,
    store: &str,
    password: Option<&str>,
) -> Result<kpiboard_sync::AccessRole, CliError> {
    let password = password.ok_or_else(|| {
        CliError::from(KpiError::AccessDenied(format!("a password is required to submit for '{}'", store)))
    })?;
    settings
        .authenticate(Some(store), password)
        .ok_or_else(|| KpiError::AccessDenied(format!("wrong password for '{}'", store)).into())
}

fn confirm() -> Result<bool, CliError> {
    if !atty::is(atty::Stream::Stdin) {
        return Err(CliError::args("confirmation needed but stdin is not a TTY")
            .with_hint("review with `kpi preview`, then submit with --yes"));
    }
    eprint!("Write this report? [y/N] ");
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .map_err(|e| CliError::io(e.to_string()))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(metrics: &[&str]) -> EntryArgs {
        EntryArgs {
            store: Some("東門店".into()),
            staff: Some("小明".into()),
            date: Some("2026-01-05".into()),
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            input: None,
        }
    }

    #[test]
    fn metric_flags_parsed() {
        let s = build_submission(&entry(&["毛利=1,500", "遠傳升續率=0.8"])).unwrap();
        assert_eq!(s.metrics["毛利"], 1500.0);
        assert_eq!(s.metrics["遠傳升續率"], 0.8);
        assert_eq!(s.report_date, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn bad_values_are_usage_errors() {
        for bad in ["毛利", "毛利=abc", "=5", "毛利=NaN"] {
            let err = build_submission(&entry(&[bad])).unwrap_err();
            assert_eq!(err.code, EXIT_USAGE, "{bad}");
        }
        assert_eq!(build_submission(&entry(&[])).unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn flags_override_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{"store": "西門店", "staff": "阿土", "date": "2026-01-09",
                "metrics": {"毛利": 2000, "門號": "3"}}"#,
        )
        .unwrap();

        let args = EntryArgs {
            staff: Some("小明".into()),
            metrics: vec!["毛利=2500".into()],
            input: Some(path),
            ..EntryArgs::default()
        };
        let s = build_submission(&args).unwrap();
        assert_eq!(s.store, "西門店");
        assert_eq!(s.staff, "小明");
        assert_eq!(s.metrics["毛利"], 2500.0);
        assert_eq!(s.metrics["門號"], 3.0);
        assert_eq!(s.report_date.to_string(), "2026-01-09");
    }

    #[test]
    fn date_format_enforced() {
        let mut args = entry(&["毛利=1"]);
        args.date = Some("05/01/2026".into());
        assert_eq!(build_submission(&args).unwrap_err().code, EXIT_USAGE);
    }
}
