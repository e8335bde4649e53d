//! Plain-text output. Column padding uses display width so CJK names line up.

use std::fmt::Write as _;

use kpiboard_sync::addressing::{a1, column_letters};
use kpiboard_sync::{AggregateReport, MetricSchema, Preview, SubmissionOutcome};
use unicode_width::UnicodeWidthStr;

fn pad(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    let mut out = s.to_string();
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(w)));
    out
}

fn pad_left(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    let mut out: String = std::iter::repeat(' ').take(width.saturating_sub(w)).collect();
    out.push_str(s);
    out
}

pub fn number(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        let s = format!("{:.4}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn percent(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

fn widest<'a>(items: impl Iterator<Item = &'a str>) -> usize {
    items.map(UnicodeWidthStr::width).max().unwrap_or(0)
}

pub fn schema_table(schema: &MetricSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "schema v{}  day 1 at row {}  {} days  day column {}",
        schema.version,
        schema.anchor_row,
        schema.provisioned_days,
        column_letters(schema.day_column)
    );
    let name_w = widest(schema.iter().map(|m| m.name.as_str())).max(6);
    for m in schema.iter() {
        let _ = writeln!(
            out,
            "  {:>3}  {}  {:<10}  {:<11}  {:?}",
            column_letters(schema.column_of(m)),
            pad(&m.name, name_w),
            m.aggregation_mode.to_string(),
            format!("{:?}", m.value_kind).to_lowercase(),
            m.category,
        );
    }
    out
}

pub fn preview(preview: &Preview, schema: &MetricSchema) -> String {
    let s = &preview.submission;
    let mut out = String::new();
    let _ = writeln!(out, "{} / {}  {}  (row {})", s.store, s.staff, s.report_date, preview.row);

    let name_w = widest(preview.lines.iter().map(|l| l.metric.as_str()));
    for line in &preview.lines {
        let cell = schema
            .resolve(&line.metric)
            .map(|m| a1(preview.row, schema.column_of(m)))
            .unwrap_or_default();
        let action = match line.mode {
            kpiboard_sync::AggregationMode::Accumulate => "add",
            kpiboard_sync::AggregationMode::Overwrite => "set",
        };
        let _ = writeln!(
            out,
            "  {:<5} {}  {} {}",
            cell,
            pad(&line.metric, name_w),
            action,
            number(line.value)
        );
    }
    if !preview.dropped.is_empty() {
        let _ = writeln!(out, "  ignored (not in schema): {}", preview.dropped.join(", "));
    }

    if !preview.score.metrics.is_empty() {
        let name_w = widest(preview.score.metrics.iter().map(|m| m.metric.as_str()));
        let _ = writeln!(out, "score {:.3}", preview.score.total);
        for m in &preview.score.metrics {
            let achievement = m.achievement.map(percent).unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  {}  {} / {}  {}  x{}",
                pad(&m.metric, name_w),
                number(m.actual),
                number(m.target),
                achievement,
                number(m.weight)
            );
        }
    }
    out
}

pub fn outcome(outcome: &SubmissionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", outcome.message());
    let name_w = widest(outcome.writes.iter().map(|w| w.metric.as_str()));
    for w in &outcome.writes {
        let change = match w.previous {
            Some(prev) => format!("{} -> {}", number(prev), number(w.written)),
            None => number(w.written),
        };
        let _ = writeln!(out, "  {:<5} {}  {}", w.cell, pad(&w.metric, name_w), change);
    }
    if !outcome.dropped.is_empty() {
        let _ = writeln!(out, "  ignored: {}", outcome.dropped.join(", "));
    }
    let _ = writeln!(out, "{}", outcome.workbook.url);
    out
}

/// Metrics down, stores across, company total last.
pub fn aggregate_table(report: &AggregateReport, schema: &MetricSchema) -> String {
    let mut out = String::new();
    let reported = report.rows.iter().filter(|r| r.is_reported()).count();
    let _ = writeln!(out, "{}  {} of {} stores reported", report.period, reported, report.rows.len());

    let label_w = widest(schema.iter().map(|m| m.name.as_str())).max(6);
    let mut header = vec!["".to_string()];
    header.extend(report.rows.iter().map(|r| r.store.clone()));
    header.push("total".to_string());

    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut status = vec!["status".to_string()];
    status.extend(report.rows.iter().map(|r| r.status.to_string()));
    status.push(String::new());
    lines.push(status);

    for m in schema.iter() {
        let mut line = vec![m.name.clone()];
        line.extend(report.rows.iter().map(|r| number(r.value(&m.name))));
        line.push(number(report.totals.get(&m.name).copied().unwrap_or(0.0)));
        lines.push(line);
    }
    if report.rows.iter().any(|r| r.score.is_some()) {
        let mut line = vec!["score".to_string()];
        line.extend(
            report
                .rows
                .iter()
                .map(|r| r.score.map(|s| format!("{:.3}", s)).unwrap_or_else(|| "-".to_string())),
        );
        line.push(String::new());
        lines.push(line);
    }

    let cols = header.len();
    let mut widths = vec![0usize; cols];
    widths[0] = label_w;
    for row in std::iter::once(&header).chain(lines.iter()) {
        for (i, cell) in row.iter().enumerate().skip(1) {
            widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
        }
    }

    for row in std::iter::once(&header).chain(lines.iter()) {
        let mut text = pad(&row[0], widths[0]);
        for (i, cell) in row.iter().enumerate().skip(1) {
            text.push_str("  ");
            text.push_str(&pad_left(cell, widths[i]));
        }
        let _ = writeln!(out, "{}", text.trim_end());
    }

    for row in &report.rows {
        if let Some(detail) = &row.detail {
            let _ = writeln!(out, "{}: {}", row.store, detail);
        }
        if !row.missing_sheets.is_empty() {
            let _ = writeln!(out, "{}: no sheet for {}", row.store, row.missing_sheets.join(", "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_drop_trailing_zeros() {
        assert_eq!(number(3000.0), "3000");
        assert_eq!(number(0.75), "0.75");
        assert_eq!(number(0.123456), "0.1235");
        assert_eq!(number(-0.0), "0");
    }

    #[test]
    fn padding_counts_wide_chars_twice() {
        assert_eq!(pad("毛利", 6), "毛利  ");
        assert_eq!(pad_left("門號", 5), " 門號");
        assert_eq!(pad("toolong", 3), "toolong");
    }

    #[test]
    fn schema_lists_every_column() {
        let schema = MetricSchema::builtin();
        let text = schema_table(&schema);
        assert_eq!(text.lines().count(), schema.metrics.len() + 1);
        assert!(text.contains("毛利"));
        assert!(text.lines().nth(1).unwrap().trim_start().starts_with('B'));
    }
}
