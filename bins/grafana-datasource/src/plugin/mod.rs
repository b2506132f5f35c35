mod query;
mod error;
mod settings;
mod cache;
mod table;
mod frame;
mod retry;
mod fanout;
mod dispatch;
mod data_service;
#[cfg(test)]
mod mock;

use std::sync::Arc;

use grafana_plugin_sdk::backend::{self, async_trait};
use grafana_plugin_sdk::prelude::*;
use haystack_api::{HaystackClient, HttpClient};

use cache::ClientCache;
use error::ConnectError;
use settings::DatasourceSettings;

type InstanceSettings = backend::DataSourceInstanceSettings<serde_json::Value, serde_json::Value>;

const HEALTH_OK: &str = "Data source is working";
const HEALTH_FAILED: &str = "Uh oh, something's wrong with the connection";

// ═══════════════════════════════════════════════════════════════
//  Plugin struct
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Debug, GrafanaPlugin)]
#[grafana_plugin(plugin_type = "datasource")]
pub struct HaystackPlugin {
    clients: Arc<ClientCache<HttpClient>>,
}

impl HaystackPlugin {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(ClientCache::default()),
        }
    }

    /// Opened client for this datasource instance.
    async fn client(&self, instance: Option<&InstanceSettings>) -> Result<Arc<HttpClient>, ConnectError> {
        let instance = instance.ok_or_else(|| ConnectError::Settings("missing datasource instance settings".into()))?;
        let settings = DatasourceSettings::from_json(&instance.json_data, &instance.decrypted_secure_json_data)?;
        self.clients
            .get_or_open(&instance.uid, settings, |settings| {
                Ok(HttpClient::new(settings.client_config())?)
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════
//  DiagnosticsService
// ═══════════════════════════════════════════════════════════════

/// Outcome of a health check: one `about` call on the connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Working,
    Failed,
}

impl Health {
    fn message(self) -> &'static str {
        match self {
            Health::Working => HEALTH_OK,
            Health::Failed => HEALTH_FAILED,
        }
    }
}

async fn check_client<C>(client: Result<Arc<C>, ConnectError>) -> Health
where
    C: HaystackClient + ?Sized,
{
    let about = match client {
        Ok(client) => client.about().await.map_err(ConnectError::from),
        Err(e) => Err(e),
    };
    match about {
        Ok(about) => {
            tracing::debug!(server = ?about.get("serverName").map(ToString::to_string), "health check passed");
            Health::Working
        }
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            Health::Failed
        }
    }
}

#[async_trait]
impl backend::DiagnosticsService for HaystackPlugin {
    type CheckHealthError = std::convert::Infallible;
    type CollectMetricsError = std::convert::Infallible;

    async fn check_health(
        &self,
        request: backend::CheckHealthRequest<Self>,
    ) -> Result<backend::CheckHealthResponse, Self::CheckHealthError> {
        let client = self.client(request.plugin_context.instance_settings.as_ref()).await;
        let health = check_client(client).await;
        Ok(match health {
            Health::Working => backend::CheckHealthResponse::ok(health.message().to_string()),
            Health::Failed => backend::CheckHealthResponse::error(health.message().to_string()),
        })
    }

    async fn collect_metrics(
        &self,
        _request: backend::CollectMetricsRequest<Self>,
    ) -> Result<backend::CollectMetricsResponse, Self::CollectMetricsError> {
        Ok(backend::CollectMetricsResponse::new(None))
    }
}
