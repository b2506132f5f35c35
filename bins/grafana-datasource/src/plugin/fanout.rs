use std::sync::Arc;

use haystack_api::{DateTime, Grid, HaystackClient, Value};
use tokio::task::JoinSet;

use super::retry::with_retry;

/// Read the history of every point in `points`, one task per point, and
/// wait for all of them.
///
/// Returns exactly one grid per row, in completion order. A row whose
/// `id` is not a ref, or whose read fails, yields an empty grid; results
/// are told apart by the point identity in each grid's meta.
pub async fn read_histories<C>(client: Arc<C>, points: &Grid, start: &DateTime, end: &DateTime) -> Vec<Grid>
where
    C: HaystackClient + ?Sized + 'static,
{
    let mut workers = JoinSet::new();
    for point in points.rows() {
        let client = Arc::clone(&client);
        let id = point.get("id").clone();
        let (start, end) = (start.clone(), end.clone());
        workers.spawn(async move { read_point(&*client, id, &start, &end).await });
    }

    let mut grids = Vec::with_capacity(points.row_count());
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(grid) => grids.push(grid),
            Err(e) => {
                tracing::error!(error = %e, "history read task failed");
                grids.push(Grid::empty());
            }
        }
    }
    grids
}

async fn read_point<C>(client: &C, id: Value, start: &DateTime, end: &DateTime) -> Grid
where
    C: HaystackClient + ?Sized,
{
    let id = match id {
        Value::Ref(id) => id,
        other => {
            tracing::error!(id = %other, "id is not a ref");
            return Grid::empty();
        }
    };
    match with_retry(client, || client.his_read(&id, start, end)).await {
        Ok(grid) => grid,
        Err(e) => {
            tracing::error!(id = %id, error = %e, "history read failed");
            Grid::empty()
        }
    }
}
