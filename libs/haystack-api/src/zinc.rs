use crate::grid::Grid;
use crate::value::Value;

/// Encode a grid as Zinc text, the request body format every Haystack
/// server accepts.
pub fn write_grid(grid: &Grid) -> String {
    let mut out = String::from("ver:\"3.0\"");
    for (name, val) in grid.meta() {
        out.push(' ');
        push_tag(&mut out, name, val);
    }
    out.push('\n');

    if grid.cols().is_empty() {
        out.push_str("empty\n");
        return out;
    }

    for (i, col) in grid.cols().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(col.name());
        for (name, val) in col.meta() {
            out.push(' ');
            push_tag(&mut out, name, val);
        }
    }
    out.push('\n');

    for row in grid.rows() {
        for (i, col) in grid.cols().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let val = row.get(col.name());
            if !val.is_null() {
                out.push_str(&val.to_zinc());
            }
        }
        out.push('\n');
    }
    out
}

fn push_tag(out: &mut String, name: &str, val: &Value) {
    out.push_str(name);
    if *val != Value::Marker {
        out.push(':');
        out.push_str(&val.to_zinc());
    }
}

/// Single-row request grid, the shape of every Haystack POST op.
pub fn request_grid<'a>(cells: impl IntoIterator<Item = (&'a str, Value)>) -> Grid {
    let cells: Vec<(&str, Value)> = cells.into_iter().collect();
    let mut builder = Grid::builder();
    for (name, _) in &cells {
        builder = builder.col(*name);
    }
    builder.row(cells).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Ref;

    #[test]
    fn writes_single_row_request() {
        let grid = request_grid([("expr", Value::str("readAll(site)"))]);
        assert_eq!(write_grid(&grid), "ver:\"3.0\"\nexpr\n\"readAll(site)\"\n");
    }

    #[test]
    fn writes_null_cells_as_empty() {
        let grid = request_grid([("id", Value::Ref(Ref::new("p1"))), ("range", Value::Null)]);
        assert_eq!(write_grid(&grid), "ver:\"3.0\"\nid,range\n@p1,\n");
    }

    #[test]
    fn writes_empty_grid() {
        assert_eq!(write_grid(&Grid::empty()), "ver:\"3.0\"\nempty\n");
    }
}
