//! Naming conventions shared with the pre-existing workbooks. These strings
//! must match the files already in the shared folder byte for byte.

use crate::model::ReportPeriod;

pub const WORKBOOK_SUFFIX: &str = "業績日報表";

/// Summary sheet names, in order of preference.
pub const SUMMARY_SHEETS: &[&str] = &["總表", "總計", "Total"];

/// Extensions of uploaded (non-native) copies of a workbook.
pub const LEGACY_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// `{year}_{month:02}_{store}業績日報表`
pub fn workbook_name(period: ReportPeriod, store: &str) -> String {
    format!("{}_{:02}_{}{}", period.year, period.month, store, WORKBOOK_SUFFIX)
}

/// `{year}{month:02}`, e.g. `202601`.
pub fn month_folder_name(period: ReportPeriod) -> String {
    format!("{}{:02}", period.year, period.month)
}

/// Names an uploaded, non-converted copy of the workbook would carry.
pub fn legacy_names(workbook_name: &str) -> Vec<String> {
    LEGACY_EXTENSIONS
        .iter()
        .map(|ext| format!("{workbook_name}.{ext}"))
        .collect()
}

/// First summary sheet present in `sheets`, by preference order.
pub fn pick_summary_sheet(sheets: &[String]) -> Option<&str> {
    SUMMARY_SHEETS
        .iter()
        .find(|candidate| sheets.iter().any(|s| s == *candidate))
        .copied()
}
