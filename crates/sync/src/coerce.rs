//! Lenient numeric coercion for human-edited cells.
//!
//! Cells may hold blanks, placeholders, currency-formatted text or thousands
//! separators. Everything that does not read as a finite number becomes 0.0;
//! coercion never fails.

use crate::service::CellValue;

const CURRENCY_SYMBOLS: &[char] = &['$', '¥', '￥', '€', '£', '₩', '元', '＄'];
const CURRENCY_CODES: &[&str] = &["NTD", "TWD", "USD", "NT"];
const SEPARATORS: &[char] = &[',', '，', '_', '\''];
const PLACEHOLDERS: &[&str] = &["-", "--", "—", "–", "n/a", "na", "#n/a", "null", "none"];

/// Coerce a raw cell to a finite number, 0.0 for anything unusable.
pub fn safe_numeric(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Text(s) => safe_numeric_str(s),
        _ => 0.0,
    }
}

/// Text form of [`safe_numeric`].
///
/// A trailing percent sign scales by 1/100 so `"80%"` agrees with the 0.8
/// the service returns for a percent-formatted number. Accounting negatives
/// `"(1,200)"` read as -1200.
pub fn safe_numeric_str(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDERS.iter().any(|p| trimmed.eq_ignore_ascii_case(p)) {
        return 0.0;
    }

    let (negated, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let mut cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c) && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    let is_percent = cleaned.ends_with('%') || cleaned.ends_with('％');
    if is_percent {
        cleaned.pop();
    }

    // Currency code may precede or follow the sign: "NT$-50", "-NT$50".
    let (sign, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", cleaned.clone()),
    };
    let unsigned = strip_currency_code(&unsigned);
    let candidate = format!("{sign}{unsigned}");

    let parsed = match candidate.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => return 0.0,
    };

    let scaled = if is_percent { parsed / 100.0 } else { parsed };
    let value = if negated { -scaled } else { scaled };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn strip_currency_code(s: &str) -> &str {
    for code in CURRENCY_CODES {
        if s.len() >= code.len() && s.is_char_boundary(code.len()) && s[..code.len()].eq_ignore_ascii_case(code) {
            return &s[code.len()..];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(safe_numeric(&CellValue::Number(1500.0)), 1500.0);
        assert_eq!(safe_numeric(&CellValue::Number(-2.5)), -2.5);
    }

    #[test]
    fn blanks_and_placeholders_are_zero() {
        assert_eq!(safe_numeric(&CellValue::Empty), 0.0);
        assert_eq!(safe_numeric(&text("")), 0.0);
        assert_eq!(safe_numeric(&text("   ")), 0.0);
        assert_eq!(safe_numeric(&text("-")), 0.0);
        assert_eq!(safe_numeric(&text("N/A")), 0.0);
        assert_eq!(safe_numeric(&text("#N/A")), 0.0);
    }

    #[test]
    fn formatted_money() {
        assert_eq!(safe_numeric(&text("1,234")), 1234.0);
        assert_eq!(safe_numeric(&text("$1,234.50")), 1234.5);
        assert_eq!(safe_numeric(&text("NT$ 12,000")), 12000.0);
        assert_eq!(safe_numeric(&text("-NT$50")), -50.0);
        assert_eq!(safe_numeric(&text("(1,200)")), -1200.0);
        assert_eq!(safe_numeric(&text("３００元")), 0.0); // full-width digits are not numbers
        assert_eq!(safe_numeric(&text("300元")), 300.0);
        assert_eq!(safe_numeric(&text("12，000")), 12000.0);
    }

    #[test]
    fn percentages_scale() {
        assert_eq!(safe_numeric(&text("80%")), 0.8);
        assert_eq!(safe_numeric(&text(" 75 % ")), 0.75);
    }

    #[test]
    fn garbage_is_zero() {
        assert_eq!(safe_numeric(&text("abc")), 0.0);
        assert_eq!(safe_numeric(&text("12abc")), 0.0);
        assert_eq!(safe_numeric(&text("1e400")), 0.0);
        assert_eq!(safe_numeric(&text("NaN")), 0.0);
        assert_eq!(safe_numeric(&text("inf")), 0.0);
        assert_eq!(safe_numeric(&CellValue::Number(f64::NAN)), 0.0);
        assert_eq!(safe_numeric(&CellValue::Number(f64::INFINITY)), 0.0);
        assert_eq!(safe_numeric(&CellValue::Bool(true)), 0.0);
    }

    #[test]
    fn idempotent_on_examples() {
        for raw in ["1,234", "80%", "(5)", "", "-", "NT$1.5", "0.1", "1e21"] {
            let once = safe_numeric(&text(raw));
            let twice = safe_numeric(&text(&once.to_string()));
            assert_eq!(once, twice, "input {raw:?}");
        }
    }
}
