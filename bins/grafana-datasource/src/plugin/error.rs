use grafana_plugin_sdk::backend;
use haystack_api::{ClientError, DecodeError};

// ═══════════════════════════════════════════════════════════════
//  Error types
// ═══════════════════════════════════════════════════════════════

/// Grafana plugin error for individual queries.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub ref_id: String,
    pub message: String,
}

impl backend::DataQueryError for QueryError {
    fn ref_id(self) -> String {
        self.ref_id
    }
}

/// Why one query could not be answered. Scoped to that query only.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("json unmarshal failure: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{op} failure: {source}")]
    Remote {
        op: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("Nav failure: {0}")]
    InvalidNav(#[source] DecodeError),

    #[error("Query exceeded record limit of {limit}: {count} records")]
    RecordLimit { limit: usize, count: usize },

    #[error("Invalid type {0}")]
    UnknownKind(String),
}

impl DispatchError {
    pub fn remote(op: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| DispatchError::Remote { op, source }
    }
}

/// Failure to obtain an open client for a datasource instance.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("datasource settings: {0}")]
    Settings(String),

    #[error("connect to Haystack server: {0}")]
    Client(#[from] ClientError),
}
