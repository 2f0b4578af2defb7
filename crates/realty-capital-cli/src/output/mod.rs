pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Result fields holding the per-period or per-case rows of each command,
/// in priority order.
const ROW_KEYS: [&str; 6] = ["leveredFcf", "partners", "annual", "triads", "statistics", "cases"];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The first row set found in `result`. Keyed maps (simulation statistics)
/// become rows with the key in a leading `kpi` column.
pub(crate) fn primary_rows(result: &Map<String, Value>) -> Option<(&'static str, Vec<Value>)> {
    for key in ROW_KEYS {
        match result.get(key) {
            Some(Value::Array(rows)) if !rows.is_empty() => return Some((key, rows.clone())),
            Some(Value::Object(map)) if !map.is_empty() => {
                let rows = map
                    .iter()
                    .map(|(name, stats)| {
                        let mut row = Map::new();
                        row.insert("kpi".into(), Value::String(name.clone()));
                        if let Value::Object(fields) = stats {
                            row.extend(fields.clone());
                        }
                        Value::Object(row)
                    })
                    .collect();
                return Some((key, rows));
            }
            _ => {}
        }
    }
    None
}

/// Scalar fields of `result`; nested arrays and objects are left to the
/// row formatters.
pub(crate) fn scalar_fields(result: &Map<String, Value>) -> Vec<(&str, &Value)> {
    result
        .iter()
        .filter(|(_, v)| !v.is_array() && !v.is_object())
        .map(|(k, v)| (k.as_str(), v))
        .collect()
}
