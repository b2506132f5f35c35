use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc};

use crate::error::DecodeError;

/// Name → value map used for grid, column and nested dict metadata.
pub type Dict = BTreeMap<String, Value>;

// ═══════════════════════════════════════════════════════════════
//  Value — one grid cell
// ═══════════════════════════════════════════════════════════════

/// Tagged Haystack value.
///
/// Closed set: every consumer matches exhaustively, so adding a kind
/// here is a compile error everywhere a decision depends on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Marker,
    Na,
    Remove,
    Bool(bool),
    Number(Number),
    Str(String),
    Uri(String),
    Ref(Ref),
    Symbol(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime),
    Coord { lat: f64, lng: f64 },
    XStr { kind: String, val: String },
    Bin(String),
    List(Vec<Value>),
    Dict(Dict),
}

impl Value {
    pub fn number(val: f64, unit: Option<&str>) -> Self {
        Value::Number(Number::new(val, unit))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Canonical Zinc encoding.
    pub fn to_zinc(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("N"),
            Value::Marker => f.write_str("M"),
            Value::Na => f.write_str("NA"),
            Value::Remove => f.write_str("R"),
            Value::Bool(true) => f.write_str("T"),
            Value::Bool(false) => f.write_str("F"),
            Value::Number(n) => fmt::Display::fmt(n, f),
            Value::Str(s) => write_quoted(f, s),
            Value::Uri(u) => {
                f.write_char('`')?;
                for c in u.chars() {
                    match c {
                        '`' => f.write_str("\\`")?,
                        '\\' => f.write_str("\\\\")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('`')
            }
            Value::Ref(r) => fmt::Display::fmt(r, f),
            Value::Symbol(s) => write!(f, "^{s}"),
            Value::Date(d) => write_date(f, d),
            Value::Time(t) => write_time(f, t),
            Value::DateTime(dt) => fmt::Display::fmt(dt, f),
            Value::Coord { lat, lng } => write!(f, "C({lat},{lng})"),
            Value::XStr { kind, val } => {
                f.write_str(kind)?;
                f.write_char('(')?;
                write_quoted(f, val)?;
                f.write_char(')')
            }
            Value::Bin(mime) => {
                f.write_str("Bin(")?;
                write_quoted(f, mime)?;
                f.write_char(')')
            }
            Value::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    fmt::Display::fmt(item, f)?;
                }
                f.write_char(']')
            }
            Value::Dict(dict) => {
                f.write_char('{')?;
                for (i, (name, val)) in dict.iter().enumerate() {
                    if i > 0 {
                        f.write_char(' ')?;
                    }
                    f.write_str(name)?;
                    if *val != Value::Marker {
                        f.write_char(':')?;
                        fmt::Display::fmt(val, f)?;
                    }
                }
                f.write_char('}')
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Number
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub val: f64,
    pub unit: Option<String>,
}

impl Number {
    pub fn new(val: f64, unit: Option<&str>) -> Self {
        Self {
            val,
            unit: unit.filter(|u| !u.is_empty()).map(str::to_string),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn to_zinc(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.val.is_nan() {
            return f.write_str("NaN");
        }
        if self.val.is_infinite() {
            return f.write_str(if self.val > 0.0 { "INF" } else { "-INF" });
        }
        write!(f, "{}", self.val)?;
        if let Some(unit) = &self.unit {
            f.write_str(unit)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ref
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    pub id: String,
    pub dis: Option<String>,
}

impl Ref {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), dis: None }
    }

    pub fn with_dis(id: impl Into<String>, dis: impl Into<String>) -> Self {
        Self { id: id.into(), dis: Some(dis.into()) }
    }

    pub fn dis(&self) -> Option<&str> {
        self.dis.as_deref()
    }

    /// Parse a Zinc-encoded reference: `@id` optionally followed by a
    /// quoted display string.
    pub fn parse_zinc(text: &str) -> Result<Self, DecodeError> {
        let text = text.trim();
        let body = text
            .strip_prefix('@')
            .ok_or_else(|| DecodeError::literal("ref", text))?;

        let id_len = body
            .find(|c: char| !is_ref_char(c))
            .unwrap_or(body.len());
        let (id, rest) = body.split_at(id_len);
        if id.is_empty() {
            return Err(DecodeError::literal("ref", text));
        }

        let rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(Ref::new(id));
        }
        let (dis, tail) = parse_quoted(rest).ok_or_else(|| DecodeError::literal("ref", text))?;
        if !tail.trim().is_empty() {
            return Err(DecodeError::literal("ref", text));
        }
        Ok(Ref::with_dis(id, dis))
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.id)?;
        if let Some(dis) = &self.dis {
            f.write_char(' ')?;
            write_quoted(f, dis)?;
        }
        Ok(())
    }
}

pub(crate) fn is_ref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-' | '.' | '~')
}

// ═══════════════════════════════════════════════════════════════
//  DateTime
// ═══════════════════════════════════════════════════════════════

/// Instant with its Haystack timezone name (`UTC`, `New_York`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct DateTime {
    pub instant: chrono::DateTime<FixedOffset>,
    pub tz: String,
}

impl DateTime {
    pub fn new(instant: chrono::DateTime<FixedOffset>, tz: impl Into<String>) -> Self {
        Self { instant, tz: tz.into() }
    }

    pub fn from_utc(instant: chrono::DateTime<Utc>) -> Self {
        Self {
            instant: instant.fixed_offset(),
            tz: "UTC".to_string(),
        }
    }

    pub fn to_utc(&self) -> chrono::DateTime<Utc> {
        self.instant.with_timezone(&Utc)
    }

    /// Expression literal form, e.g. `dateTime(2024-01-31, 10:15:00, "UTC")`.
    pub fn to_axon(&self) -> String {
        AxonDateTime(self).to_string()
    }
}

struct AxonDateTime<'a>(&'a DateTime);

impl fmt::Display for AxonDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.0.instant.naive_local();
        f.write_str("dateTime(")?;
        write_date(f, &local.date())?;
        f.write_str(", ")?;
        write_time(f, &local.time())?;
        f.write_str(", ")?;
        write_quoted(f, &self.0.tz)?;
        f.write_char(')')
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.instant.naive_local();
        write_date(f, &local.date())?;
        f.write_char('T')?;
        write_time(f, &local.time())?;
        let offset = self.instant.offset().fix().local_minus_utc();
        if offset == 0 {
            f.write_char('Z')?;
        } else {
            let sign = if offset < 0 { '-' } else { '+' };
            let abs = offset.abs();
            write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)?;
        }
        write!(f, " {}", self.tz)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Zinc text helpers
// ═══════════════════════════════════════════════════════════════

fn write_date(out: &mut impl fmt::Write, d: &NaiveDate) -> fmt::Result {
    write!(out, "{:04}-{:02}-{:02}", d.year(), d.month(), d.day())
}

fn write_time(out: &mut impl fmt::Write, t: &NaiveTime) -> fmt::Result {
    write!(out, "{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())?;
    let millis = (t.nanosecond() / 1_000_000) % 1000;
    if millis != 0 {
        write!(out, ".{millis:03}")?;
    }
    Ok(())
}

pub(crate) fn write_quoted(out: &mut impl fmt::Write, s: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            '$' => out.write_str("\\$")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

/// Parse a leading double-quoted Zinc string. Returns the unescaped
/// text and the remainder after the closing quote.
pub(crate) fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, &body[i + 1..])),
            '\\' => {
                let (_, esc) = chars.next()?;
                match esc {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let (_, h) = chars.next()?;
                            code = code * 16 + h.to_digit(16)?;
                        }
                        out.push(char::from_u32(code)?);
                    }
                    other => out.push(other),
                }
            }
            c => out.push(c),
        }
    }
    None
}
