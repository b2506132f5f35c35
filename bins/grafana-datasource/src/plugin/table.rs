use chrono::{Local, NaiveDate, TimeZone, Utc};
use haystack_api::{Col, Grid, Value};

/// Rendering of a `Marker` cell in string columns.
const MARKER_GLYPH: &str = "\u{2713}";

/// Name of the timestamp column in history grids.
const TS_COLUMN: &str = "ts";

// ═══════════════════════════════════════════════════════════════
//  Column type inference
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    DateTime,
    Number,
    Boolean,
    String,
    /// Two or more non-null categories.
    Mixed,
    /// Only null cells.
    Undetermined,
}

impl ColumnType {
    /// Category of a single cell; `None` for null.
    fn of(value: &Value) -> Option<ColumnType> {
        match value {
            Value::Null => None,
            Value::Date(_) | Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Number(_) => Some(ColumnType::Number),
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Marker
            | Value::Na
            | Value::Remove
            | Value::Str(_)
            | Value::Uri(_)
            | Value::Ref(_)
            | Value::Symbol(_)
            | Value::Time(_)
            | Value::Coord { .. }
            | Value::XStr { .. }
            | Value::Bin(_)
            | Value::List(_)
            | Value::Dict(_) => Some(ColumnType::String),
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            ColumnType::DateTime => FieldKind::DateTime,
            ColumnType::Number => FieldKind::Number,
            ColumnType::Boolean => FieldKind::Boolean,
            ColumnType::String | ColumnType::Mixed | ColumnType::Undetermined => FieldKind::String,
        }
    }
}

/// Classify a column in one pass, stopping at the first conflict.
pub fn infer_column_type(grid: &Grid, col: &Col) -> ColumnType {
    let mut candidate = None;
    for row in grid.rows() {
        let Some(found) = ColumnType::of(row.get(col.name())) else {
            continue;
        };
        match candidate {
            None => candidate = Some(found),
            Some(current) if current == found => {}
            Some(_) => return ColumnType::Mixed,
        }
    }
    candidate.unwrap_or(ColumnType::Undetermined)
}

// ═══════════════════════════════════════════════════════════════
//  Table model — column-oriented, host-facing
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    DateTime,
    Number,
    Boolean,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    DateTime(Vec<Option<chrono::DateTime<Utc>>>),
    Number(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    String(Vec<Option<String>>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::DateTime(v) => v.len(),
            FieldValues::Number(v) => v.len(),
            FieldValues::Boolean(v) => v.len(),
            FieldValues::String(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub display_name: String,
    pub unit: Option<String>,
    pub values: FieldValues,
}

/// One converted grid. All fields have one entry per source row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.fields.first().map_or(0, |f| f.values.len())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Label every value field with the table name, so a history
    /// series shows up under its point's name rather than `val`.
    pub fn label_value_fields(&mut self) {
        for field in self.fields.iter_mut().filter(|f| f.name != TS_COLUMN) {
            field.display_name = self.name.clone();
        }
    }
}

/// Deterministic output order, independent of fan-out completion order.
pub fn sort_tables(tables: &mut [Table]) {
    tables.sort_by(|a, b| a.name.cmp(&b.name));
}

// ═══════════════════════════════════════════════════════════════
//  Grid → Table
// ═══════════════════════════════════════════════════════════════

/// Convert a grid into a table. Never fails: cells that do not fit
/// their column's type become nulls.
pub fn build_table(grid: &Grid) -> Table {
    let fields = grid
        .cols()
        .iter()
        .map(|col| {
            let kind = infer_column_type(grid, col).kind();
            Field {
                name: col.name().to_string(),
                display_name: col.name().to_string(),
                unit: column_unit(grid, col),
                values: column_values(grid, col, kind),
            }
        })
        .collect();

    Table {
        name: table_name(grid),
        fields,
    }
}

fn column_values(grid: &Grid, col: &Col, kind: FieldKind) -> FieldValues {
    let cells = grid.rows().iter().map(|row| row.get(col.name()));
    match kind {
        FieldKind::DateTime => FieldValues::DateTime(cells.map(to_instant).collect()),
        FieldKind::Number => FieldValues::Number(
            cells
                .map(|v| match v {
                    Value::Number(n) => Some(n.val),
                    _ => None,
                })
                .collect(),
        ),
        FieldKind::Boolean => FieldValues::Boolean(
            cells
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect(),
        ),
        FieldKind::String => FieldValues::String(cells.map(to_text).collect()),
    }
}

fn to_instant(value: &Value) -> Option<chrono::DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(dt.to_utc()),
        Value::Date(date) => local_midnight(*date),
        _ => None,
    }
}

/// Dates have no zone; they are shown as midnight in the plugin's zone.
fn local_midnight(date: NaiveDate) -> Option<chrono::DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Str(s) => Some(s.clone()),
        Value::Marker => Some(MARKER_GLYPH.to_string()),
        other => Some(other.to_zinc()),
    }
}

/// Column `unit` meta, else the unit of the first row's number, else none.
fn column_unit(grid: &Grid, col: &Col) -> Option<String> {
    if let Some(Value::Str(unit)) = col.meta().get("unit") {
        return Some(unit.clone());
    }
    match grid.row_at(0).map(|row| row.get(col.name())) {
        Some(Value::Number(n)) => n.unit().map(str::to_string),
        _ => None,
    }
}

/// Grid `dis` meta, else the display text of the grid's `id` ref.
fn table_name(grid: &Grid) -> String {
    if let Some(Value::Str(dis)) = grid.meta().get("dis") {
        return dis.clone();
    }
    grid.meta()
        .get("id")
        .and_then(Value::as_reference)
        .and_then(|id| id.dis())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use haystack_api::{DateTime, Dict, Ref};

    fn utc(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    fn single_column(values: Vec<Value>) -> Grid {
        let mut builder = Grid::builder().col("c");
        for v in values {
            builder = builder.row([("c", v)]);
        }
        builder.build()
    }

    fn infer(values: Vec<Value>) -> ColumnType {
        let grid = single_column(values);
        infer_column_type(&grid, &grid.cols()[0])
    }

    #[test]
    fn uniform_columns_keep_their_category() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            infer(vec![Value::Date(date), Value::DateTime(DateTime::from_utc(utc(1)))]),
            ColumnType::DateTime
        );
        assert_eq!(
            infer(vec![Value::number(1.0, None), Value::Null, Value::number(2.0, Some("kW"))]),
            ColumnType::Number
        );
        assert_eq!(infer(vec![Value::Bool(true), Value::Bool(false)]), ColumnType::Boolean);
        assert_eq!(
            infer(vec![Value::str("a"), Value::Marker, Value::Ref(Ref::new("x"))]),
            ColumnType::String
        );
    }

    #[test]
    fn any_two_categories_are_mixed() {
        assert_eq!(infer(vec![Value::number(1.0, None), Value::str("a")]), ColumnType::Mixed);
        assert_eq!(infer(vec![Value::Null, Value::Bool(true), Value::number(0.0, None)]), ColumnType::Mixed);
        assert_eq!(
            infer(vec![Value::DateTime(DateTime::from_utc(utc(1))), Value::Marker]),
            ColumnType::Mixed
        );
    }

    #[test]
    fn null_only_column_is_undetermined_and_renders_as_null_strings() {
        assert_eq!(infer(vec![Value::Null, Value::Null]), ColumnType::Undetermined);
        assert_eq!(infer(vec![]), ColumnType::Undetermined);

        let grid = Grid::builder()
            .col("a")
            .col("empty")
            .row([("a", Value::str("x"))])
            .row([("a", Value::str("y"))])
            .build();
        let table = build_table(&grid);
        let field = table.field("empty").unwrap();
        assert_eq!(field.values, FieldValues::String(vec![None, None]));
    }

    #[test]
    fn evaluates_dict_grid_to_string_fields() {
        let grid = Grid::builder()
            .col("a")
            .col("b")
            .row([("a", Value::str("a")), ("b", Value::str("b"))])
            .build();
        let table = build_table(&grid);

        assert_eq!(table.fields.len(), 2);
        for name in ["a", "b"] {
            let field = table.field(name).unwrap();
            assert_eq!(field.display_name, name);
            assert_eq!(field.unit, None);
            assert_eq!(field.values, FieldValues::String(vec![Some(name.to_string())]));
        }
    }

    #[test]
    fn history_grid_carries_unit_and_point_name() {
        let grid = Grid::builder()
            .meta("id", Value::Ref(Ref::with_dis("p1", "Main Meter kWh")))
            .col("ts")
            .col("v0")
            .row([
                ("ts", Value::DateTime(DateTime::from_utc(utc(3)))),
                ("v0", Value::number(42.0, Some("kWh"))),
            ])
            .build();
        let mut table = build_table(&grid);
        table.label_value_fields();

        assert_eq!(table.name, "Main Meter kWh");
        let ts = table.field("ts").unwrap();
        assert_eq!(ts.values, FieldValues::DateTime(vec![Some(utc(3))]));
        assert_eq!(ts.display_name, "ts");

        let v0 = table.field("v0").unwrap();
        assert_eq!(v0.values, FieldValues::Number(vec![Some(42.0)]));
        assert_eq!(v0.unit.as_deref(), Some("kWh"));
        assert_eq!(v0.display_name, "Main Meter kWh");
    }

    #[test]
    fn mismatched_cells_degrade_to_null() {
        let grid = single_column(vec![Value::number(1.0, None), Value::Null, Value::Bool(true)]);
        let table = build_table(&grid);
        // Mixed columns fall back to text.
        assert_eq!(
            table.fields[0].values,
            FieldValues::String(vec![Some("1".into()), None, Some("T".into())])
        );
    }

    #[test]
    fn string_column_renders_non_strings_as_zinc() {
        let grid = single_column(vec![
            Value::str("plain"),
            Value::Marker,
            Value::Ref(Ref::with_dis("s1", "Site")),
            Value::Null,
            Value::Uri("http://x".into()),
        ]);
        let table = build_table(&grid);
        assert_eq!(
            table.fields[0].values,
            FieldValues::String(vec![
                Some("plain".into()),
                Some("\u{2713}".into()),
                Some("@s1 \"Site\"".into()),
                None,
                Some("`http://x`".into()),
            ])
        );
    }

    #[test]
    fn dates_become_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let grid = single_column(vec![Value::Date(date)]);
        let table = build_table(&grid);
        let FieldValues::DateTime(values) = &table.fields[0].values else {
            panic!("expected a time field");
        };
        let local = values[0].unwrap().with_timezone(&Local);
        assert_eq!(local.date_naive(), date);
        assert_eq!(local.hour(), 0);
    }

    #[test]
    fn column_meta_unit_wins_over_row_unit() {
        let mut meta = Dict::new();
        meta.insert("unit".into(), Value::str("°C"));
        let grid = Grid::builder()
            .col_with_meta("t", meta)
            .col("n")
            .row([("t", Value::number(20.0, Some("°F"))), ("n", Value::number(1.0, Some("%")))])
            .row([("n", Value::number(2.0, Some("ppm")))])
            .build();
        let table = build_table(&grid);
        assert_eq!(table.field("t").unwrap().unit.as_deref(), Some("°C"));
        assert_eq!(table.field("n").unwrap().unit.as_deref(), Some("%"));
    }

    #[test]
    fn table_name_prefers_dis_then_id() {
        let with_dis = Grid::builder()
            .meta("dis", Value::str("Readings"))
            .meta("id", Value::Ref(Ref::with_dis("p", "Point")))
            .build();
        assert_eq!(build_table(&with_dis).name, "Readings");

        let bare_id = Grid::builder().meta("id", Value::Ref(Ref::new("p"))).build();
        assert_eq!(build_table(&bare_id).name, "");
        assert_eq!(build_table(&Grid::empty()).name, "");
    }

    #[test]
    fn fields_are_aligned_with_rows() {
        let grid = Grid::builder()
            .col("a")
            .col("b")
            .row([("a", Value::number(1.0, None))])
            .row([("b", Value::Bool(false))])
            .row(Vec::<(&str, Value)>::new())
            .build();
        let table = build_table(&grid);
        assert!(table.fields.iter().all(|f| f.values.len() == 3));
        assert_eq!(table.row_count(), 3);
        assert!(matches!(table.field("a").unwrap().values, FieldValues::Number(_)));
        assert!(matches!(table.field("b").unwrap().values, FieldValues::Boolean(_)));
    }

    #[test]
    fn sorts_tables_by_name() {
        let mut tables = vec![
            Table { name: "b".into(), fields: vec![] },
            Table { name: "".into(), fields: vec![] },
            Table { name: "a".into(), fields: vec![] },
        ];
        sort_tables(&mut tables);
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["", "a", "b"]);
    }
}
