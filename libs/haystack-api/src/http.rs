use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};

use crate::client::{ClientFuture, HaystackClient};
use crate::error::ClientError;
use crate::grid::Grid;
use crate::json::decode_grid;
use crate::scram::{self, Scram};
use crate::value::{DateTime, Dict, Ref, Value};
use crate::zinc::{request_grid, write_grid};

const AUTHENTICATION_INFO: &str = "authentication-info";
const ZINC_MIME: &str = "text/zinc; charset=utf-8";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the Haystack API, e.g. `http://host:8080/api/demo`.
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Haystack REST client over HTTP.
///
/// Requests are encoded as Zinc, responses are requested as JSON. The
/// session header produced by `open` lives behind a lock so the client
/// can be shared across tasks and re-opened from any of them.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    session: RwLock<Option<String>>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            session: RwLock::new(None),
        })
    }

    fn url(&self, op: &str) -> String {
        format!("{}/{op}", self.base_url)
    }

    fn session(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session(&self, session: Option<String>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn get(&self, op: &str) -> Result<Grid, ClientError> {
        tracing::debug!(op, "haystack GET");
        self.send(self.http.get(self.url(op))).await
    }

    async fn post(&self, op: &str, request: &Grid) -> Result<Grid, ClientError> {
        tracing::debug!(op, "haystack POST");
        let builder = self
            .http
            .post(self.url(op))
            .header(CONTENT_TYPE, ZINC_MIME)
            .body(write_grid(request));
        self.send(builder).await
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Grid, ClientError> {
        let mut builder = builder.header(ACCEPT, "application/json");
        if let Some(auth) = self.session() {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::http(status.as_u16(), body));
        }

        let grid = decode_grid(&body)?;
        match grid.error_message() {
            Some(msg) => Err(ClientError::Server(msg)),
            None => Ok(grid),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  Authentication handshake
    // ═══════════════════════════════════════════════════════════════

    /// `HELLO` → server picks a scheme → credentials → bearer token.
    async fn authenticate(&self) -> Result<Option<String>, ClientError> {
        let hello = format!("HELLO username={}", URL_SAFE_NO_PAD.encode(&self.username));
        let resp = self.auth_request(hello).await?;

        if resp.status().is_success() {
            // Server without authentication.
            return Ok(None);
        }
        let challenge = challenge(resp).await?;
        let scheme = challenge
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match scheme.as_str() {
            "basic" => self.authenticate_basic().await.map(Some),
            "scram" => self.authenticate_scram(&challenge).await.map(Some),
            "" => Err(ClientError::Auth("server did not offer an auth scheme".into())),
            other => Err(ClientError::Auth(format!("unsupported auth scheme: {other}"))),
        }
    }

    async fn auth_request(&self, authorization: String) -> Result<reqwest::Response, ClientError> {
        Ok(self
            .http
            .get(self.url("about"))
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json")
            .send()
            .await?)
    }

    async fn authenticate_basic(&self) -> Result<String, ClientError> {
        let credentials = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let basic = format!("Basic {credentials}");
        let resp = self.auth_request(basic.clone()).await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::http(status.as_u16(), body));
        }

        // Prefer the issued token; servers that only speak basic keep
        // accepting the credentials on every request.
        let token = resp
            .headers()
            .get(AUTHENTICATION_INFO)
            .and_then(|v| v.to_str().ok())
            .and_then(|info| auth_param(info, "authToken"));
        Ok(match token {
            Some(token) => format!("BEARER authToken={token}"),
            None => basic,
        })
    }

    /// Two round trips: client-first, then client-final with the proof.
    async fn authenticate_scram(&self, hello_challenge: &str) -> Result<String, ClientError> {
        let hash = auth_param(hello_challenge, "hash").unwrap_or_else(|| scram::HASH_NAME.to_string());
        if !hash.eq_ignore_ascii_case(scram::HASH_NAME) {
            return Err(ClientError::Auth(format!("unsupported SCRAM hash: {hash}")));
        }
        let handshake = auth_param(hello_challenge, "handshakeToken").unwrap_or_default();

        let scram = Scram::new(&self.username, &self.password);
        let first = format!(
            "SCRAM handshakeToken={handshake}, data={}",
            scram::encode_data(&scram.client_first())
        );
        let server_first = challenge(self.auth_request(first).await?).await?;
        let handshake = auth_param(&server_first, "handshakeToken").unwrap_or(handshake);
        let data = auth_param(&server_first, "data")
            .ok_or_else(|| ClientError::Auth("SCRAM challenge without data".into()))?;
        let last = scram.client_final(&scram::decode_data(&data)?)?;

        let proof = format!(
            "SCRAM handshakeToken={handshake}, data={}",
            scram::encode_data(&last.message)
        );
        let resp = self.auth_request(proof).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::http(status.as_u16(), body));
        }

        let info = resp
            .headers()
            .get(AUTHENTICATION_INFO)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if let Some(data) = auth_param(&info, "data") {
            last.verify(&scram::decode_data(&data)?)?;
        }
        let token = auth_param(&info, "authToken")
            .ok_or_else(|| ClientError::Auth("SCRAM exchange returned no authToken".into()))?;
        tracing::debug!(url = %self.base_url, "SCRAM handshake complete");
        Ok(format!("BEARER authToken={token}"))
    }
}

/// `WWW-Authenticate` of a 401 answer; any other status is an error.
async fn challenge(resp: reqwest::Response) -> Result<String, ClientError> {
    let status = resp.status().as_u16();
    if status != 401 {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::http(status, body));
    }
    Ok(resp
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string())
}

/// Value of `name` in an auth header such as
/// `SCRAM handshakeToken=abc, hash=SHA-256` or `authToken=xyz, data=..`.
fn auth_param(header: &str, name: &str) -> Option<String> {
    header
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            // The first parameter follows the scheme name.
            let part = part.rsplit_once(' ').map_or(part, |(_, p)| p);
            part.split_once('=')
        })
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, val)| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

// ═══════════════════════════════════════════════════════════════
//  HaystackClient impl
// ═══════════════════════════════════════════════════════════════

impl HaystackClient for HttpClient {
    fn open(&self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            let session = self.authenticate().await?;
            self.set_session(session);
            tracing::debug!(url = %self.base_url, "haystack session opened");
            Ok(())
        })
    }

    fn close(&self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            let result = self.post("close", &Grid::empty()).await;
            self.set_session(None);
            result.map(|_| ())
        })
    }

    fn about(&self) -> ClientFuture<'_, Dict> {
        Box::pin(async move {
            let grid = self.get("about").await?;
            Ok(grid
                .row_at(0)
                .map(|row| row.cells().clone())
                .unwrap_or_default())
        })
    }

    fn ops(&self) -> ClientFuture<'_, Grid> {
        Box::pin(self.get("ops"))
    }

    fn eval<'a>(&'a self, expr: &'a str) -> ClientFuture<'a, Grid> {
        Box::pin(async move {
            let request = request_grid([("expr", Value::str(expr))]);
            self.post("eval", &request).await
        })
    }

    fn his_read<'a>(&'a self, id: &'a Ref, start: &'a DateTime, end: &'a DateTime) -> ClientFuture<'a, Grid> {
        Box::pin(async move {
            let request = request_grid([
                ("id", Value::Ref(id.clone())),
                ("range", Value::Str(format!("{start},{end}"))),
            ]);
            self.post("hisRead", &request).await
        })
    }

    fn read<'a>(&'a self, filter: &'a str) -> ClientFuture<'a, Grid> {
        Box::pin(async move {
            let request = request_grid([("filter", Value::str(filter))]);
            self.post("read", &request).await
        })
    }

    fn nav<'a>(&'a self, nav_id: Option<&'a Ref>) -> ClientFuture<'a, Grid> {
        Box::pin(async move {
            let request = match nav_id {
                Some(id) => request_grid([("navId", Value::Ref(id.clone()))]),
                None => Grid::empty(),
            };
            self.post("nav", &request).await
        })
    }
}
