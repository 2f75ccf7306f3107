//! Content digests used as report cache keys.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::Position;

/// Field dropped from asset snapshots before hashing: it moves whenever any other
/// position's price moves.
pub const PERCENT_OF_PORTFOLIO_FIELD: &str = "percent_of_portfolio";

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Digest of the holdings, independent of input order.
///
/// Decimals are normalized, so `10` and `10.00` hash the same.
pub fn portfolio_hash(positions: &[Position]) -> String {
    let mut sorted: Vec<&Position> = positions.iter().collect();
    sorted.sort_by(|a, b| a.code.cmp(&b.code));

    let mut canonical = String::new();
    for p in sorted {
        canonical.push_str(&format!(
            "{}|{}|{}|{}|{}\n",
            p.code,
            p.avg_cost.normalize(),
            p.quantity.normalize(),
            p.asset_class,
            p.currency
        ));
    }
    sha256_hex(&canonical)
}

/// Digest of a per-asset snapshot document.
pub fn asset_hash(snapshot: &Value) -> String {
    let mut canonical = String::new();
    match snapshot {
        Value::Object(map) => {
            let mut filtered = map.clone();
            filtered.remove(PERCENT_OF_PORTFOLIO_FIELD);
            write_canonical(&Value::Object(filtered), &mut canonical);
        }
        other => write_canonical(other, &mut canonical),
    }
    sha256_hex(&canonical)
}

/// [`asset_hash`] of any serializable snapshot.
pub fn asset_hash_of<T: Serialize>(snapshot: &T) -> Result<String, serde_json::Error> {
    Ok(asset_hash(&serde_json::to_value(snapshot)?))
}

/// Compact JSON with sorted keys; floats rendered as fixed 8-decimal strings.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Number(n) if n.is_f64() => {
            let rendered = format!("{:.8}", n.as_f64().unwrap_or_default());
            out.push_str(&Value::String(rendered).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
