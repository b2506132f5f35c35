use std::fmt;
use std::time::Duration;

use haystack_api::HttpClientConfig;
use serde::Deserialize;

use super::error::ConnectError;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// `jsonData` of a datasource instance.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonData {
    #[serde(default)]
    url: String,
    #[serde(default)]
    username: String,
    timeout_seconds: Option<u64>,
}

/// `secureJsonData` of a datasource instance, already decrypted.
#[derive(Default, Deserialize)]
struct SecureJsonData {
    #[serde(default)]
    password: String,
}

/// Connection settings of one datasource instance.
#[derive(Clone, PartialEq, Eq)]
pub struct DatasourceSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DatasourceSettings {
    pub fn from_json(json_data: &serde_json::Value, secure: &serde_json::Value) -> Result<Self, ConnectError> {
        let json: JsonData = decode(json_data, "jsonData")?;
        let secure: SecureJsonData = decode(secure, "secureJsonData")?;

        let url = json.url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(ConnectError::Settings("url is required".into()));
        }

        Ok(Self {
            url,
            username: json.username,
            password: secure.password,
            timeout: Duration::from_secs(json.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
        })
    }

    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }
}

fn decode<T: Default + for<'de> Deserialize<'de>>(value: &serde_json::Value, what: &str) -> Result<T, ConnectError> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::deserialize(value).map_err(|e| ConnectError::Settings(format!("{what}: {e}")))
}
