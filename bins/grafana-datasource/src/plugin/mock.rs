//! In-memory `HaystackClient` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use haystack_api::{ClientError, ClientFuture, DateTime, Dict, Grid, HaystackClient, Ref, Value};

/// Scripted outcome of one call.
pub enum Reply {
    Grid(Grid),
    Status(u16),
}

/// Records every call and answers from per-call scripts, falling back
/// to an empty grid (or a one-row history grid for `hisRead`).
///
/// Script keys are the op name, or `hisRead:<id>` for one point.
#[derive(Default)]
pub struct MockClient {
    opens: AtomicUsize,
    fail_open: bool,
    calls: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply; replies for the same key are used in order.
    pub fn script(self, key: &str, reply: Reply) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn answer(&self, call: String, key: &str, fallback: impl FnOnce() -> Grid) -> Result<Grid, ClientError> {
        self.calls.lock().unwrap().push(call);
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Reply::Grid(grid)) => Ok(grid),
            Some(Reply::Status(status)) => Err(ClientError::http(status, "scripted failure")),
            None => Ok(fallback()),
        }
    }
}

/// One-row history grid identifying the point in its meta.
pub fn history_grid(id: &Ref) -> Grid {
    let dis = id.dis().unwrap_or(&id.id).to_string();
    Grid::builder()
        .meta("id", Value::Ref(Ref::with_dis(id.id.clone(), dis)))
        .col("ts")
        .col("val")
        .row([
            ("ts", Value::DateTime(DateTime::from_utc(chrono::DateTime::from_timestamp(0, 0).unwrap()))),
            ("val", Value::number(1.0, Some("kW"))),
        ])
        .build()
}

impl HaystackClient for MockClient {
    fn open(&self) -> ClientFuture<'_, ()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_open;
        Box::pin(async move {
            tokio::task::yield_now().await;
            if fail {
                Err(ClientError::Auth("scripted open failure".into()))
            } else {
                Ok(())
            }
        })
    }

    fn close(&self) -> ClientFuture<'_, ()> {
        self.calls.lock().unwrap().push("close".into());
        Box::pin(async { Ok(()) })
    }

    fn about(&self) -> ClientFuture<'_, Dict> {
        let result = self.answer("about".into(), "about", Grid::empty).map(|grid| {
            grid.row_at(0)
                .map(|row| row.cells().clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn ops(&self) -> ClientFuture<'_, Grid> {
        let result = self.answer("ops".into(), "ops", Grid::empty);
        Box::pin(async move { result })
    }

    fn eval<'a>(&'a self, expr: &'a str) -> ClientFuture<'a, Grid> {
        let result = self.answer(format!("eval:{expr}"), "eval", Grid::empty);
        Box::pin(async move { result })
    }

    fn his_read<'a>(&'a self, id: &'a Ref, start: &'a DateTime, end: &'a DateTime) -> ClientFuture<'a, Grid> {
        let key = format!("hisRead:{}", id.id);
        let result = self.answer(format!("{key}:{start},{end}"), &key, || history_grid(id));
        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }

    fn read<'a>(&'a self, filter: &'a str) -> ClientFuture<'a, Grid> {
        let result = self.answer(format!("read:{filter}"), "read", Grid::empty);
        Box::pin(async move { result })
    }

    fn nav<'a>(&'a self, nav_id: Option<&'a Ref>) -> ClientFuture<'a, Grid> {
        let call = match nav_id {
            Some(id) => format!("nav:{}", id.id),
            None => "nav".to_string(),
        };
        let result = self.answer(call, "nav", Grid::empty);
        Box::pin(async move { result })
    }
}
