//! Haystack JSON response decoding.
//!
//! Servers answer `Accept: application/json` in one of two dialects:
//! JSON v3, where scalars are strings with a one-letter type prefix
//! (`"n:72 °F"`, `"r:abc Site"`), and JSON v4 ("Hayson"), where scalars
//! are objects tagged with `_kind`. The top-level grid tells them apart.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Map;

use crate::error::DecodeError;
use crate::grid::{Grid, GridBuilder};
use crate::value::{DateTime, Dict, Number, Ref, Value};

type JsonValue = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    V3,
    Hayson,
}

/// Decode a JSON response body into a grid.
pub fn decode_grid(body: &str) -> Result<Grid, DecodeError> {
    let json: JsonValue = serde_json::from_str(body)?;
    grid_from_json(&json)
}

pub fn grid_from_json(json: &JsonValue) -> Result<Grid, DecodeError> {
    let obj = json
        .as_object()
        .ok_or_else(|| DecodeError::Grid("expected a JSON object".into()))?;
    let dialect = match obj.get("_kind").and_then(JsonValue::as_str) {
        Some("grid") => Dialect::Hayson,
        _ => Dialect::V3,
    };

    let mut builder = Grid::builder();

    if let Some(meta) = obj.get("meta").and_then(JsonValue::as_object) {
        for (name, val) in decode_dict(meta, dialect)? {
            builder = builder.meta(name, val);
        }
    }

    let cols = obj
        .get("cols")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| DecodeError::Grid("missing cols".into()))?;
    for col in cols {
        builder = decode_col(builder, col, dialect)?;
    }

    if let Some(rows) = obj.get("rows").and_then(JsonValue::as_array) {
        for row in rows {
            let row = row
                .as_object()
                .ok_or_else(|| DecodeError::Grid("row is not an object".into()))?;
            builder = builder.row(decode_dict(row, dialect)?);
        }
    }

    Ok(builder.build())
}

fn decode_col(builder: GridBuilder, col: &JsonValue, dialect: Dialect) -> Result<GridBuilder, DecodeError> {
    let col = col
        .as_object()
        .ok_or_else(|| DecodeError::Grid("col is not an object".into()))?;
    let name = col
        .get("name")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| DecodeError::Grid("col without name".into()))?;

    let meta = match dialect {
        Dialect::Hayson => match col.get("meta").and_then(JsonValue::as_object) {
            Some(meta) => decode_dict(meta, dialect)?,
            None => Dict::new(),
        },
        Dialect::V3 => {
            let mut meta = Dict::new();
            for (k, v) in col.iter().filter(|(k, _)| k.as_str() != "name") {
                meta.insert(k.clone(), decode_value(v, dialect)?);
            }
            meta
        }
    };
    Ok(builder.col_with_meta(name, meta))
}

fn decode_dict(obj: &Map<String, JsonValue>, dialect: Dialect) -> Result<Dict, DecodeError> {
    obj.iter()
        .filter(|(k, _)| k.as_str() != "_kind")
        .map(|(k, v)| Ok((k.clone(), decode_value(v, dialect)?)))
        .collect()
}

fn decode_value(json: &JsonValue, dialect: Dialect) -> Result<Value, DecodeError> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => {
            let val = n
                .as_f64()
                .ok_or_else(|| DecodeError::literal("number", n.to_string()))?;
            Value::Number(Number::new(val, None))
        }
        JsonValue::String(s) => match dialect {
            Dialect::V3 => decode_prefixed(s)?,
            Dialect::Hayson => Value::Str(s.clone()),
        },
        JsonValue::Array(items) => Value::List(
            items
                .iter()
                .map(|v| decode_value(v, dialect))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(obj) => match obj.get("_kind").and_then(JsonValue::as_str) {
            Some(kind) => decode_kind(kind, obj, dialect)?,
            None => Value::Dict(decode_dict(obj, dialect)?),
        },
    })
}

// ═══════════════════════════════════════════════════════════════
//  JSON v3 — type-prefixed strings
// ═══════════════════════════════════════════════════════════════

fn decode_prefixed(s: &str) -> Result<Value, DecodeError> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[1] != b':' {
        return Ok(Value::Str(s.to_string()));
    }
    let rest = &s[2..];
    Ok(match bytes[0] {
        b'm' => Value::Marker,
        b'-' => Value::Remove,
        b'z' => Value::Na,
        b's' => Value::Str(rest.to_string()),
        b'n' => {
            let (val, unit) = split_once_space(rest);
            Value::Number(Number::new(parse_float(val)?, unit))
        }
        b'r' => {
            let (id, dis) = split_once_space(rest);
            Value::Ref(Ref {
                id: id.to_string(),
                dis: dis.map(str::to_string),
            })
        }
        b'd' => Value::Date(parse_date(rest)?),
        b'h' => Value::Time(parse_time(rest)?),
        b't' => {
            let (iso, tz) = split_once_space(rest);
            Value::DateTime(parse_date_time(iso, tz)?)
        }
        b'u' => Value::Uri(rest.to_string()),
        b'y' => Value::Symbol(rest.to_string()),
        b'b' => Value::Bin(rest.to_string()),
        b'c' => {
            let (lat, lng) = rest
                .split_once(',')
                .ok_or_else(|| DecodeError::literal("coord", rest))?;
            Value::Coord {
                lat: parse_float(lat)?,
                lng: parse_float(lng)?,
            }
        }
        b'x' => {
            let (kind, val) = rest
                .split_once(':')
                .ok_or_else(|| DecodeError::literal("xstr", rest))?;
            Value::XStr {
                kind: kind.to_string(),
                val: val.to_string(),
            }
        }
        _ => Value::Str(s.to_string()),
    })
}

fn split_once_space(s: &str) -> (&str, Option<&str>) {
    match s.split_once(' ') {
        Some((head, tail)) => (head, Some(tail)),
        None => (s, None),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Hayson — `_kind` objects
// ═══════════════════════════════════════════════════════════════

fn decode_kind(kind: &str, obj: &Map<String, JsonValue>, dialect: Dialect) -> Result<Value, DecodeError> {
    let text = |name: &str| required_text(obj, kind, name);
    let opt_text = |name: &str| optional_text(obj, name);

    Ok(match kind {
        "marker" => Value::Marker,
        "na" => Value::Na,
        "remove" => Value::Remove,
        "number" => {
            let val = match obj.get("val") {
                Some(JsonValue::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| DecodeError::literal("number", n.to_string()))?,
                Some(JsonValue::String(s)) => parse_float(s)?,
                _ => return Err(DecodeError::literal("number", "missing val")),
            };
            Value::Number(Number::new(val, opt_text("unit")))
        }
        "ref" => Value::Ref(Ref {
            id: text("val")?.to_string(),
            dis: opt_text("dis").map(str::to_string),
        }),
        "date" => Value::Date(parse_date(text("val")?)?),
        "time" => Value::Time(parse_time(text("val")?)?),
        "dateTime" => Value::DateTime(parse_date_time(text("val")?, opt_text("tz"))?),
        "uri" => Value::Uri(text("val")?.to_string()),
        "symbol" => Value::Symbol(text("val")?.to_string()),
        "bin" => Value::Bin(text("mime")?.to_string()),
        "xstr" => Value::XStr {
            kind: text("type")?.to_string(),
            val: text("val")?.to_string(),
        },
        "coord" => {
            let coord = |name: &str| {
                obj.get(name)
                    .and_then(JsonValue::as_f64)
                    .ok_or_else(|| DecodeError::literal("coord", format!("missing {name}")))
            };
            Value::Coord {
                lat: coord("lat")?,
                lng: coord("lng")?,
            }
        }
        _ => Value::Dict(decode_dict(obj, dialect)?),
    })
}

fn required_text<'a>(obj: &'a Map<String, JsonValue>, kind: &str, name: &str) -> Result<&'a str, DecodeError> {
    optional_text(obj, name)
        .ok_or_else(|| DecodeError::literal("hayson", format!("{kind} without {name}")))
}

fn optional_text<'a>(obj: &'a Map<String, JsonValue>, name: &str) -> Option<&'a str> {
    obj.get(name).and_then(JsonValue::as_str)
}

// ═══════════════════════════════════════════════════════════════
//  Scalar parsers
// ═══════════════════════════════════════════════════════════════

fn parse_float(s: &str) -> Result<f64, DecodeError> {
    match s {
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::literal("number", s)),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, DecodeError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| DecodeError::literal("date", s))
}

fn parse_time(s: &str) -> Result<NaiveTime, DecodeError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| DecodeError::literal("time", s))
}

/// ISO-8601 with offset, plus the Haystack timezone name. A missing
/// name means UTC.
fn parse_date_time(iso: &str, tz: Option<&str>) -> Result<DateTime, DecodeError> {
    let instant = chrono::DateTime::parse_from_rfc3339(iso)
        .map_err(|_| DecodeError::literal("dateTime", iso))?;
    let tz = tz.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("UTC");
    Ok(DateTime::new(instant, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn decodes_v3_history_grid() {
        let body = r#"{
            "meta": {"ver": "3.0", "id": "r:p1 Boiler kWh", "hisStart": "t:2024-01-01T00:00:00Z UTC"},
            "cols": [{"name": "ts"}, {"name": "val", "unit": "s:kWh"}],
            "rows": [{"ts": "t:2024-01-01T00:15:00-05:00 New_York", "val": "n:12.5 kWh"}]
        }"#;
        let grid = decode_grid(body).unwrap();

        assert_eq!(
            grid.meta().get("id"),
            Some(&Value::Ref(Ref::with_dis("p1", "Boiler kWh")))
        );
        assert_eq!(grid.col("val").unwrap().meta().get("unit"), Some(&Value::str("kWh")));

        let row = grid.row_at(0).unwrap();
        match row.get("ts") {
            Value::DateTime(dt) => {
                assert_eq!(dt.tz, "New_York");
                assert_eq!(dt.to_utc(), Utc.with_ymd_and_hms(2024, 1, 1, 5, 15, 0).unwrap());
            }
            other => panic!("expected dateTime, got {other:?}"),
        }
        assert_eq!(row.get("val"), &Value::number(12.5, Some("kWh")));
    }

    #[test]
    fn decodes_v3_prefixes() {
        let cases = [
            ("m:", Value::Marker),
            ("z:", Value::Na),
            ("s:a:b", Value::str("a:b")),
            ("plain", Value::str("plain")),
            ("y:op:read", Value::Symbol("op:read".into())),
            ("n:INF", Value::number(f64::INFINITY, None)),
            ("r:abc", Value::Ref(Ref::new("abc"))),
            ("u:http://x", Value::Uri("http://x".into())),
            ("c:37.5,-77.4", Value::Coord { lat: 37.5, lng: -77.4 }),
            (
                "x:Span:today",
                Value::XStr { kind: "Span".into(), val: "today".into() },
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(decode_prefixed(text).unwrap(), expected, "{text}");
        }
        assert!(decode_prefixed("n:abc").is_err());
        assert!(decode_prefixed("d:2024-13-01").is_err());
    }

    #[test]
    fn decodes_hayson_grid() {
        let body = r#"{
            "_kind": "grid",
            "meta": {"ver": "3.0", "dis": "Ops"},
            "cols": [{"name": "def"}, {"name": "n", "meta": {"unit": "°F"}}, {"name": "site"}],
            "rows": [
                {"def": {"_kind": "symbol", "val": "op:read"},
                 "n": {"_kind": "number", "val": 72, "unit": "°F"},
                 "site": {"_kind": "marker"}},
                {"def": "s:plain string", "n": {"_kind": "number", "val": "NaN"}}
            ]
        }"#;
        let grid = decode_grid(body).unwrap();
        assert_eq!(grid.meta().get("dis"), Some(&Value::str("Ops")));
        assert_eq!(grid.col("n").unwrap().meta().get("unit"), Some(&Value::str("°F")));
        assert_eq!(grid.row_count(), 2);

        let first = grid.row_at(0).unwrap();
        assert_eq!(first.get("def"), &Value::Symbol("op:read".into()));
        assert_eq!(first.get("n"), &Value::number(72.0, Some("°F")));
        assert_eq!(first.get("site"), &Value::Marker);

        // Hayson strings are never prefix-decoded.
        let second = grid.row_at(1).unwrap();
        assert_eq!(second.get("def"), &Value::str("s:plain string"));
        assert!(matches!(second.get("n"), Value::Number(n) if n.val.is_nan()));
        assert_eq!(second.get("site"), &Value::Null);
    }

    #[test]
    fn hayson_date_time_defaults_to_utc() {
        let json = serde_json::json!({"_kind": "dateTime", "val": "2024-05-01T12:00:00Z"});
        match decode_value(&json, Dialect::Hayson).unwrap() {
            Value::DateTime(dt) => assert_eq!(dt.tz, "UTC"),
            other => panic!("expected dateTime, got {other:?}"),
        }
    }

    #[test]
    fn rejects_grids_without_cols() {
        assert!(matches!(decode_grid(r#"{"meta": {}}"#), Err(DecodeError::Grid(_))));
        assert!(matches!(decode_grid("not json"), Err(DecodeError::Json(_))));
    }
}
