/// Failure to decode a Haystack payload (JSON grid or Zinc literal).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {kind} literal: {text}")]
    Literal { kind: &'static str, text: String },

    #[error("malformed grid: {0}")]
    Grid(String),
}

impl DecodeError {
    pub(crate) fn literal(kind: &'static str, text: impl Into<String>) -> Self {
        DecodeError::Literal { kind, text: text.into() }
    }
}

/// Error returned by every remote call of a [`HaystackClient`](crate::HaystackClient).
///
/// Only `Http` carries a status code; the retry policy of the datasource
/// keys off [`ClientError::status`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("authentication: {0}")]
    Auth(String),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
}

impl ClientError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ClientError::Http { status, message: message.into() }
    }

    /// Status code of a transport error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ClientError::http(status.as_u16(), e.to_string()),
            None => ClientError::Transport(e.to_string()),
        }
    }
}
