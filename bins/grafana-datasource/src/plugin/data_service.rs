use futures::stream::FuturesOrdered;
use grafana_plugin_sdk::backend::{self, BoxDataResponseStream, DataResponse, async_trait};
use grafana_plugin_sdk::data::Frame;
use haystack_api::{HaystackClient, HttpClient};

use super::HaystackPlugin;
use super::dispatch::Dispatcher;
use super::error::QueryError;
use super::frame::frame_from_table;
use super::query::QueryContext;

// ═══════════════════════════════════════════════════════════════
//  DataService
// ═══════════════════════════════════════════════════════════════

#[async_trait]
impl backend::DataService for HaystackPlugin {
    /// Decoded per query so a malformed payload fails only its own slot.
    type Query = serde_json::Value;
    type QueryError = QueryError;
    type Stream = BoxDataResponseStream<Self::QueryError>;

    async fn query_data(&self, request: backend::QueryDataRequest<Self::Query, Self>) -> Self::Stream {
        let dispatcher = self
            .client(request.plugin_context.instance_settings.as_ref())
            .await
            .map(Dispatcher::new)
            .map_err(|e| {
                tracing::error!(error = %e, "no client for query");
                e.to_string()
            });

        Box::pin(
            request
                .queries
                .into_iter()
                .map(|q| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        match dispatcher {
                            Ok(dispatcher) => handle_query(&dispatcher, q).await,
                            Err(message) => Err(QueryError {
                                ref_id: q.ref_id,
                                message,
                            }),
                        }
                    }
                })
                .collect::<FuturesOrdered<_>>(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════
//  Query handler
// ═══════════════════════════════════════════════════════════════

async fn handle_query(
    dispatcher: &Dispatcher<HttpClient>,
    query: backend::DataQuery<serde_json::Value>,
) -> Result<DataResponse, QueryError> {
    let ctx = QueryContext {
        from: query.time_range.from,
        to: query.time_range.to,
        max_data_points: query.max_data_points,
        interval: query.interval,
    };
    let ref_id = query.ref_id;

    let frames = query_frames(dispatcher, &ref_id, &query.query, &ctx)
        .await?
        .into_iter()
        .map(Frame::check)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| QueryError {
            ref_id: ref_id.clone(),
            message: format!("Frame conversion failure: {e}"),
        })?;

    tracing::debug!(ref_id = %ref_id, frames = frames.len(), "query answered");
    Ok(DataResponse::new(ref_id, frames))
}

/// Run one query payload and convert its tables, in name order, to frames.
async fn query_frames<C>(
    dispatcher: &Dispatcher<C>,
    ref_id: &str,
    payload: &serde_json::Value,
    ctx: &QueryContext,
) -> Result<Vec<Frame>, QueryError>
where
    C: HaystackClient + ?Sized + 'static,
{
    let tables = dispatcher.execute(payload, ctx).await.map_err(|e| {
        tracing::error!(ref_id = %ref_id, error = %e, "query failed");
        QueryError {
            ref_id: ref_id.to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(tables.into_iter().map(frame_from_table).collect())
}
