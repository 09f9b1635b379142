//! Boundary parsing for backend rows.
//!
//! Rows arrive as loosely shaped JSON. They are parsed into typed records
//! here; a malformed row is logged and skipped rather than failing the list.

use anyhow::{Context, Result};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

/// Parse every row, dropping (and logging) the ones that do not fit `T`.
pub fn parse_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    let total = rows.len();
    let parsed: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Skipping malformed {} row: {} ({})", what, e, row);
                None
            }
        })
        .collect();
    if parsed.len() != total {
        tracing::debug!("Parsed {}/{} {} rows", parsed.len(), total, what);
    }
    parsed
}

/// Parse a single row, failing on a malformed shape.
pub fn parse_row<T: DeserializeOwned>(row: serde_json::Value, what: &str) -> Result<T> {
    serde_json::from_value(row).with_context(|| format!("Malformed {} row", what))
}

/// `null` (or a missing field with `#[serde(default)]`) becomes `T::default()`.
pub fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

/// Numeric aggregates may come back as JSON numbers or as strings
/// (Postgres `numeric`/`bigint`), and may be null.
pub fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = f64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("number, stringified number or null")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<f64, E> {
            Ok(v as f64)
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<f64, E> {
            Ok(v as f64)
        }
        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<f64, E> {
            Ok(v)
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<f64, E> {
            v.trim().parse().map_err(E::custom)
        }
        fn visit_unit<E: de::Error>(self) -> std::result::Result<f64, E> {
            Ok(0.0)
        }
        fn visit_none<E: de::Error>(self) -> std::result::Result<f64, E> {
            Ok(0.0)
        }
    }
    d.deserialize_any(Visitor)
}

/// Counts: like [`lenient_f64`] but integral.
pub fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let v = lenient_f64(d)?;
    if v < 0.0 || v.fract() != 0.0 {
        return Err(de::Error::custom(format!("expected a non-negative count, got {}", v)));
    }
    Ok(v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Row {
        id: String,
        #[serde(default, deserialize_with = "null_as_default")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "lenient_f64")]
        weight: f64,
    }

    #[test]
    fn test_parse_rows_skips_malformed() {
        let rows = vec![
            json!({"id": "a", "tags": ["x"], "weight": 1.5}),
            json!({"tags": []}),
            json!({"id": "c", "tags": null, "weight": "12"}),
        ];
        let parsed: Vec<Row> = parse_rows(rows, "test");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "a");
        assert_eq!(parsed[0].weight, 1.5);
        assert_eq!(parsed[1].id, "c");
        assert!(parsed[1].tags.is_empty());
        assert_eq!(parsed[1].weight, 12.0);
    }

    #[test]
    fn test_lenient_null_is_zero() {
        let row: Row = serde_json::from_value(json!({"id": "a", "weight": null})).unwrap();
        assert_eq!(row.weight, 0.0);
    }

    #[test]
    fn test_parse_row_error_has_context() {
        let err = parse_row::<Row>(json!({"weight": 1}), "item").unwrap_err();
        assert!(format!("{:#}", err).starts_with("Malformed item row"));
    }
}
