use std::collections::BTreeMap;

use crate::value::{Dict, Value};

static NULL: Value = Value::Null;

// ═══════════════════════════════════════════════════════════════
//  Col / Row
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Col {
    name: String,
    meta: Dict,
}

impl Col {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), meta: Dict::new() }
    }

    pub fn with_meta(name: impl Into<String>, meta: Dict) -> Self {
        Self { name: name.into(), meta }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &Dict {
        &self.meta
    }
}

/// One grid row. Cells absent from the map read as `Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(cells: BTreeMap<String, Value>) -> Self {
        Self { cells }
    }

    pub fn get(&self, name: &str) -> &Value {
        self.cells.get(name).unwrap_or(&NULL)
    }

    pub fn cells(&self) -> &BTreeMap<String, Value> {
        &self.cells
    }
}

// ═══════════════════════════════════════════════════════════════
//  Grid
// ═══════════════════════════════════════════════════════════════

/// Self-describing result table: grid meta, ordered columns, rows.
///
/// Every row's keys are a subset of the column names; [`GridBuilder`]
/// and the decoders drop cells for undeclared columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    meta: Dict,
    cols: Vec<Col>,
    rows: Vec<Row>,
}

impl Grid {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> GridBuilder {
        GridBuilder::default()
    }

    pub fn meta(&self) -> &Dict {
        &self.meta
    }

    pub fn cols(&self) -> &[Col] {
        &self.cols
    }

    pub fn col(&self, name: &str) -> Option<&Col> {
        self.cols.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_at(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty() && self.rows.is_empty()
    }

    /// Server-side failures come back as a grid whose meta carries `err`.
    pub fn is_error(&self) -> bool {
        self.meta.contains_key("err")
    }

    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        let dis = self
            .meta
            .get("dis")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error");
        Some(dis.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════
//  GridBuilder
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct GridBuilder {
    meta: Dict,
    cols: Vec<Col>,
    rows: Vec<Row>,
}

impl GridBuilder {
    pub fn meta(mut self, name: impl Into<String>, val: Value) -> Self {
        self.meta.insert(name.into(), val);
        self
    }

    pub fn col(self, name: impl Into<String>) -> Self {
        self.col_with_meta(name, Dict::new())
    }

    /// Adds a column; a repeated name replaces the earlier column's meta
    /// but keeps its position.
    pub fn col_with_meta(mut self, name: impl Into<String>, meta: Dict) -> Self {
        let name = name.into();
        match self.cols.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.meta = meta,
            None => self.cols.push(Col::with_meta(name, meta)),
        }
        self
    }

    /// Adds a row from `(column, value)` pairs. Null cells and cells for
    /// undeclared columns are not stored.
    pub fn row<I, K>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let cells = cells
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .filter(|(k, v)| !v.is_null() && self.cols.iter().any(|c| &c.name == k))
            .collect();
        self.rows.push(Row::new(cells));
        self
    }

    pub fn build(self) -> Grid {
        Grid {
            meta: self.meta,
            cols: self.cols,
            rows: self.rows,
        }
    }
}
