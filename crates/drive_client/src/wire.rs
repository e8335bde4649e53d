//! JSON shapes of the Drive and Sheets APIs.

use chrono::{DateTime, Utc};
use kpiboard_sync::addressing::{a1, CellRange};
use kpiboard_sync::service::{CellValue, CellWrite, ContentFilter, FileRef};
use serde_json::{json, Value};

pub(crate) const FILE_FIELDS: &str = "nextPageToken,files(id,name,mimeType,createdTime,webViewLink)";

/// `files.list` query for an exact name, optionally scoped to a folder and
/// a content type. Trashed files never match.
pub(crate) fn drive_query(name: &str, parent: Option<&str>, filter: ContentFilter) -> String {
    let mut q = format!("name = '{}' and trashed = false", escape_query(name));
    if let Some(parent) = parent {
        q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
    }
    if let Some(mime) = filter.mime_type() {
        q.push_str(&format!(" and mimeType = '{mime}'"));
    }
    q
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

pub(crate) fn parse_file(v: &Value) -> Option<FileRef> {
    Some(FileRef {
        id: v["id"].as_str()?.to_string(),
        name: v["name"].as_str()?.to_string(),
        mime_type: v["mimeType"].as_str().unwrap_or_default().to_string(),
        created_time: v["createdTime"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
        url: v["webViewLink"].as_str().map(String::from),
    })
}

/// Sheet title quoted for A1 notation: `'小明'!B19`.
pub(crate) fn quote_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

pub(crate) fn sheet_range(title: &str, range: &CellRange) -> String {
    format!("{}!{}", quote_sheet(title), range.to_a1())
}

pub(crate) fn cell_from_json(v: &Value) -> CellValue {
    match v {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
        Value::String(s) if s.is_empty() => CellValue::Empty,
        Value::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

pub(crate) fn grid_from_json(body: &Value) -> Vec<Vec<CellValue>> {
    body["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_from_json).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_to_json(value: &CellValue) -> Value {
    match value {
        CellValue::Empty => Value::String(String::new()),
        CellValue::Number(n) => json!(n),
        CellValue::Bool(b) => json!(b),
        CellValue::Text(s) => json!(s),
    }
}

/// `values:batchUpdate` body, one single-cell range per write.
pub(crate) fn batch_update_body(title: &str, writes: &[CellWrite]) -> Value {
    let data: Vec<Value> = writes
        .iter()
        .map(|w| {
            json!({
                "range": format!("{}!{}", quote_sheet(title), a1(w.row, w.col)),
                "majorDimension": "ROWS",
                "values": [[cell_to_json(&w.value)]],
            })
        })
        .collect();
    json!({ "valueInputOption": "RAW", "data": data })
}

/// Google-style `{"error": {"message": ...}}`, else the raw body.
pub(crate) fn error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {status}")
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_escapes_quotes() {
        let q = drive_query("O'Neil店", Some("root"), ContentFilter::Spreadsheet);
        assert_eq!(
            q,
            "name = 'O\\'Neil店' and trashed = false and 'root' in parents \
             and mimeType = 'application/vnd.google-apps.spreadsheet'"
        );
        assert_eq!(drive_query("x", None, ContentFilter::Any), "name = 'x' and trashed = false");
    }

    #[test]
    fn sheet_titles_quoted() {
        assert_eq!(quote_sheet("小明"), "'小明'");
        assert_eq!(quote_sheet("Bob's"), "'Bob''s'");
        assert_eq!(sheet_range("總表", &CellRange::new(15, 2, 45, 16)), "'總表'!B15:P45");
    }

    #[test]
    fn file_parsing() {
        let f = parse_file(&json!({
            "id": "abc",
            "name": "2026_01_東門店業績日報表",
            "mimeType": "application/vnd.google-apps.spreadsheet",
            "createdTime": "2026-01-02T03:04:05.000Z",
            "webViewLink": "https://docs.google.com/spreadsheets/d/abc"
        }))
        .unwrap();
        assert!(f.is_spreadsheet());
        assert_eq!(f.created_time.unwrap().to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert!(parse_file(&json!({ "name": "no id" })).is_none());
    }

    #[test]
    fn grid_is_ragged_and_typed() {
        let grid = grid_from_json(&json!({ "values": [[1000, "NT$5", true], [], ["", 2.5]] }));
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0][0], CellValue::Number(1000.0));
        assert_eq!(grid[0][1], CellValue::Text("NT$5".into()));
        assert_eq!(grid[0][2], CellValue::Bool(true));
        assert!(grid[1].is_empty());
        assert_eq!(grid[2][0], CellValue::Empty);
        assert!(grid_from_json(&json!({})).is_empty());
    }

    #[test]
    fn batch_body_shape() {
        let body = batch_update_body(
            "小明",
            &[CellWrite { row: 19, col: 2, value: CellValue::Number(1500.0) }],
        );
        assert_eq!(body["valueInputOption"], "RAW");
        assert_eq!(body["data"][0]["range"], "'小明'!B19");
        assert_eq!(body["data"][0]["values"][0][0], 1500.0);
    }

    #[test]
    fn google_error_message_extracted() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        assert_eq!(error_message(body, 404), "Requested entity was not found.");
        assert_eq!(error_message("", 502), "HTTP 502");
        assert_eq!(error_message("bad gateway", 502), "bad gateway");
    }
}
