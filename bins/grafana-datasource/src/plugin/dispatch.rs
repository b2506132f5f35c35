use std::sync::Arc;

use haystack_api::{HaystackClient, Ref};
use serde::Deserialize;

use super::error::DispatchError;
use super::fanout::read_histories;
use super::query::{HaystackQuery, QueryContext, Variables};
use super::retry::with_retry;
use super::table::{Table, build_table, sort_tables};

/// Most points a `hisReadFilter` query may match.
pub const RECORD_LIMIT: usize = 300;

/// Predicate appended to `hisReadFilter` filters so only points with
/// history are read.
const HIS_FILTER_SUFFIX: &str = " and hisStart";

// ═══════════════════════════════════════════════════════════════
//  Dispatcher
// ═══════════════════════════════════════════════════════════════

/// Executes one panel query against the shared client.
pub struct Dispatcher<C: ?Sized> {
    client: Arc<C>,
}

impl<C: ?Sized> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C> Dispatcher<C>
where
    C: HaystackClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Decode `payload`, run it, and return its tables sorted by name.
    pub async fn execute(&self, payload: &serde_json::Value, ctx: &QueryContext) -> Result<Vec<Table>, DispatchError> {
        let query = HaystackQuery::deserialize(payload)?;
        tracing::debug!(kind = %query.kind, "dispatching query");

        let vars = Variables::new(ctx);
        let client = &*self.client;

        let mut tables = match query.kind.as_str() {
            "" => Vec::new(),
            "ops" => {
                let grid = with_retry(client, || client.ops())
                    .await
                    .map_err(DispatchError::remote("Ops"))?;
                vec![build_table(&grid)]
            }
            "nav" => {
                let nav_id = query
                    .nav
                    .as_deref()
                    .map(Ref::parse_zinc)
                    .transpose()
                    .map_err(DispatchError::InvalidNav)?;
                let grid = with_retry(client, || client.nav(nav_id.as_ref()))
                    .await
                    .map_err(DispatchError::remote("Nav"))?;
                vec![build_table(&grid)]
            }
            "eval" => {
                let expr = vars.substitute(&query.eval);
                let grid = with_retry(client, || client.eval(&expr))
                    .await
                    .map_err(DispatchError::remote("Eval"))?;
                vec![build_table(&grid)]
            }
            "hisRead" => {
                let id = point_ref(&query.his_read);
                let (start, end) = ctx.range();
                let grid = with_retry(client, || client.his_read(&id, &start, &end))
                    .await
                    .map_err(DispatchError::remote("HisRead"))?;
                vec![history_table(&grid)]
            }
            "hisReadFilter" => self.his_read_filter(&query, &vars, ctx).await?,
            "read" => {
                let filter = vars.substitute(&query.read);
                let grid = with_retry(client, || client.read(&filter))
                    .await
                    .map_err(DispatchError::remote("Read"))?;
                vec![build_table(&grid)]
            }
            other => {
                tracing::warn!(kind = %other, "invalid query type");
                return Err(DispatchError::UnknownKind(other.to_string()));
            }
        };

        sort_tables(&mut tables);
        tracing::debug!(
            tables = tables.len(),
            rows = tables.iter().map(Table::row_count).sum::<usize>(),
            "query dispatched"
        );
        Ok(tables)
    }

    async fn his_read_filter(
        &self,
        query: &HaystackQuery,
        vars: &Variables,
        ctx: &QueryContext,
    ) -> Result<Vec<Table>, DispatchError> {
        let client = &*self.client;
        let filter = vars.substitute(&format!("{}{}", query.his_read_filter, HIS_FILTER_SUFFIX));
        let points = with_retry(client, || client.read(&filter))
            .await
            .map_err(DispatchError::remote("HisReadFilter"))?;

        let count = points.row_count();
        if count > RECORD_LIMIT {
            return Err(DispatchError::RecordLimit {
                limit: RECORD_LIMIT,
                count,
            });
        }

        let (start, end) = ctx.range();
        let grids = read_histories(Arc::clone(&self.client), &points, &start, &end).await;
        tracing::debug!(points = count, "history reads complete");
        Ok(grids.iter().map(history_table).collect())
    }
}

fn history_table(grid: &haystack_api::Grid) -> Table {
    let mut table = build_table(grid);
    table.label_value_fields();
    table
}

/// Point ids arrive bare (`abc-123`) or, from dashboard variables,
/// with the Zinc `@` prefix.
fn point_ref(id: &str) -> Ref {
    let id = id.trim();
    Ref::new(id.strip_prefix('@').unwrap_or(id))
}
