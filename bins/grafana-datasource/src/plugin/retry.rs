use std::future::Future;

use haystack_api::{ClientError, HaystackClient};

/// Statuses this server uses for an expired or revoked session.
///
/// 404 is included because the server answers unknown sessions that
/// way; a genuine "not found" is retried once too.
const STALE_SESSION: [u16; 2] = [403, 404];

fn is_stale_session(err: &ClientError) -> bool {
    err.status().is_some_and(|s| STALE_SESSION.contains(&s))
}

/// Run `op`; on a stale-session status reopen the client and run it
/// exactly once more, returning the second outcome as is.
///
/// The reopen may race with other tasks doing the same, which the
/// client contract allows.
pub async fn with_retry<C, F, Fut, T>(client: &C, mut op: F) -> Result<T, ClientError>
where
    C: HaystackClient + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    match op().await {
        Err(err) if is_stale_session(&err) => {
            tracing::warn!(error = %err, "session rejected, reopening and retrying once");
            if let Err(open_err) = client.open().await {
                tracing::warn!(error = %open_err, "reopen failed");
            }
            op().await
        }
        result => result,
    }
}
