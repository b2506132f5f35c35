use std::time::Duration;

use chrono::{DateTime, Utc};
use haystack_api::Number;
use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Query model — sent from the Grafana frontend
// ═══════════════════════════════════════════════════════════════

/// One panel query. Only the field selected by `type` is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaystackQuery {
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Zinc-encoded ref of the nav branch; absent or null is the root.
    #[serde(default)]
    pub nav: Option<String>,
    #[serde(default)]
    pub eval: String,
    /// Point id.
    #[serde(default)]
    pub his_read: String,
    #[serde(default)]
    pub his_read_filter: String,
    #[serde(default)]
    pub read: String,
}

/// Per-query values Grafana supplies next to the payload.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub max_data_points: i64,
    pub interval: Duration,
}

impl QueryContext {
    /// Query time range as Haystack UTC date-times.
    pub fn range(&self) -> (haystack_api::DateTime, haystack_api::DateTime) {
        (
            haystack_api::DateTime::from_utc(self.from),
            haystack_api::DateTime::from_utc(self.to),
        )
    }
}

// ═══════════════════════════════════════════════════════════════
//  Dashboard variables
// ═══════════════════════════════════════════════════════════════

pub const TIME_RANGE_START: &str = "$__timeRange_start";
pub const TIME_RANGE_END: &str = "$__timeRange_end";
pub const MAX_DATA_POINTS: &str = "$__maxDataPoints";
pub const INTERVAL: &str = "$__interval";

/// Values of the built-in variables, rendered as Axon literals.
#[derive(Debug, Clone)]
pub struct Variables {
    pairs: [(&'static str, String); 4],
}

impl Variables {
    pub fn new(ctx: &QueryContext) -> Self {
        let (start, end) = ctx.range();
        let minutes = ctx.interval.as_secs_f64() / 60.0;
        Self {
            pairs: [
                (TIME_RANGE_START, start.to_axon()),
                (TIME_RANGE_END, end.to_axon()),
                (MAX_DATA_POINTS, ctx.max_data_points.to_string()),
                (INTERVAL, Number::new(minutes, Some("min")).to_zinc()),
            ],
        }
    }

    /// Replace every occurrence of each variable name in `text`.
    pub fn substitute(&self, text: &str) -> String {
        self.pairs
            .iter()
            .fold(text.to_string(), |acc, (name, val)| acc.replace(name, val))
    }
}
