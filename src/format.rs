use crate::datatable::Cell;
use crate::record::{Record, Value};

/// es-MX currency, e.g. `$1,234.56`.
pub fn money_mxn(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${whole}.{:02}", cents % 100)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn percent(ratio: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, ratio * 100.0)
}

// Numeric text from spreadsheets ("1234.5") is treated as a number.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn money_cell(record: &Record, field: &str) -> Cell {
    let value = record.value(field);
    if value.is_null() {
        return Cell::Text("N/A".to_string());
    }
    match numeric(value) {
        Some(n) => Cell::Text(money_mxn(n)),
        None => Cell::Text(value.to_text()),
    }
}

pub fn percent_cell(record: &Record, field: &str, decimals: usize) -> Cell {
    match numeric(record.value(field)) {
        Some(n) => Cell::Text(percent(n, decimals)),
        None if record.value(field).is_null() => Cell::Text("-".to_string()),
        None => Cell::Text(record.text(field)),
    }
}

// Portfolio sheets mix ratios with free text, only real numbers are converted.
pub fn ratio_or_raw(record: &Record, field: &str) -> Cell {
    match record.value(field) {
        Value::Number(n) => Cell::Text(percent(*n, 0)),
        other => Cell::Text(other.to_text()),
    }
}
