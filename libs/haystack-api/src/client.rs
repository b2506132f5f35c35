use std::future::Future;
use std::pin::Pin;

use crate::error::ClientError;
use crate::grid::Grid;
use crate::value::{DateTime, Dict, Ref};

/// Boxed `Send` future returned by every client operation.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

// ═══════════════════════════════════════════════════════════════
//  HaystackClient — the telemetry source capability
// ═══════════════════════════════════════════════════════════════

/// Connection to a Haystack server.
///
/// One instance is shared by every query of a datasource, including the
/// concurrent history reads of a filtered read. `open` may therefore be
/// called by several tasks at once (each retrying after an auth failure)
/// and must tolerate redundant calls: re-opening an open connection
/// simply replaces its session.
pub trait HaystackClient: Send + Sync {
    /// Authenticate and establish a session.
    fn open(&self) -> ClientFuture<'_, ()>;

    /// End the session. Further calls need a new `open`.
    fn close(&self) -> ClientFuture<'_, ()>;

    /// Server summary (`about` op).
    fn about(&self) -> ClientFuture<'_, Dict>;

    /// Operations the server supports (`ops` op).
    fn ops(&self) -> ClientFuture<'_, Grid>;

    /// Evaluate an Axon expression (`eval` op).
    fn eval<'a>(&'a self, expr: &'a str) -> ClientFuture<'a, Grid>;

    /// History of one point between two instants (`hisRead` op).
    fn his_read<'a>(&'a self, id: &'a Ref, start: &'a DateTime, end: &'a DateTime) -> ClientFuture<'a, Grid>;

    /// Records matching a filter (`read` op).
    fn read<'a>(&'a self, filter: &'a str) -> ClientFuture<'a, Grid>;

    /// One level of the navigation tree; `None` is the root (`nav` op).
    fn nav<'a>(&'a self, nav_id: Option<&'a Ref>) -> ClientFuture<'a, Grid>;
}
