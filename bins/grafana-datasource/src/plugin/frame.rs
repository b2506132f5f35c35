use grafana_plugin_sdk::data::{Field, FieldConfig, Frame};
use grafana_plugin_sdk::prelude::*;

use super::table::{self, FieldValues, Table};

// ═══════════════════════════════════════════════════════════════
//  Table → Grafana Frame
// ═══════════════════════════════════════════════════════════════

/// Build a Grafana Frame from a converted table. Every field is
/// nullable; display name and unit travel in the field config.
pub(crate) fn frame_from_table(table: Table) -> Frame {
    table
        .fields
        .into_iter()
        .map(grafana_field)
        .fold(Frame::new(table.name), |frame, field| frame.with_field(field))
}

fn grafana_field(field: table::Field) -> Field {
    let name = field.name;
    let mut out = match field.values {
        FieldValues::DateTime(v) => v.into_opt_field(name),
        FieldValues::Number(v) => v.into_opt_field(name),
        FieldValues::Boolean(v) => v.into_opt_field(name),
        FieldValues::String(v) => v.into_opt_field(name),
    };
    out.config = Some(FieldConfig {
        display_name: Some(field.display_name),
        unit: field.unit,
        ..Default::default()
    });
    out
}
