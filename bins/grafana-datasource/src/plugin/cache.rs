use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use haystack_api::HaystackClient;

use super::error::ConnectError;
use super::settings::DatasourceSettings;

// ═══════════════════════════════════════════════════════════════
//  Per-datasource client cache
// ═══════════════════════════════════════════════════════════════

struct Entry<C> {
    settings: DatasourceSettings,
    client: Arc<C>,
}

/// One opened client per datasource uid.
///
/// An entry is replaced, and its client closed, only when the instance's
/// settings change. Concurrent first requests may each open a client;
/// the first to be stored wins and the others close their own.
pub struct ClientCache<C> {
    entries: RwLock<HashMap<String, Entry<C>>>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> fmt::Debug for ClientCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ClientCache")
            .field("uids", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> ClientCache<C>
where
    C: HaystackClient + 'static,
{
    fn cached(&self, uid: &str, settings: &DatasourceSettings) -> Option<Arc<C>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid)
            .filter(|e| e.settings == *settings)
            .map(|e| Arc::clone(&e.client))
    }

    /// Client for `uid`, building and opening one with `connect` when
    /// none is cached for these settings.
    pub async fn get_or_open<F>(
        &self,
        uid: &str,
        settings: DatasourceSettings,
        connect: F,
    ) -> Result<Arc<C>, ConnectError>
    where
        F: FnOnce(&DatasourceSettings) -> Result<C, ConnectError>,
    {
        if let Some(client) = self.cached(uid, &settings) {
            return Ok(client);
        }

        let client = Arc::new(connect(&settings)?);
        client.open().await?;

        let (client, stale) = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let winner = entries
                .get(uid)
                .filter(|e| e.settings == settings)
                .map(|e| Arc::clone(&e.client));
            match winner {
                Some(winner) => (winner, Some(client)),
                None => {
                    tracing::info!(uid, url = %settings.url, "opened Haystack client");
                    let replaced = entries.insert(
                        uid.to_string(),
                        Entry {
                            settings,
                            client: Arc::clone(&client),
                        },
                    );
                    (client, replaced.map(|e| e.client))
                }
            }
        };

        if let Some(stale) = stale {
            tokio::spawn(async move {
                if let Err(e) = stale.close().await {
                    tracing::warn!(error = %e, "closing unused client failed");
                }
            });
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::plugin::mock::MockClient;

    fn settings(url: &str) -> DatasourceSettings {
        DatasourceSettings {
            url: url.into(),
            username: "su".into(),
            password: "su".into(),
            timeout: Duration::from_secs(30),
        }
    }

    fn connect(_: &DatasourceSettings) -> Result<MockClient, ConnectError> {
        Ok(MockClient::new())
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn same_settings_reuse_the_opened_client() {
        let cache = ClientCache::default();
        let first = cache.get_or_open("ds", settings("http://a"), connect).await.unwrap();
        let second = cache.get_or_open("ds", settings("http://a"), connect).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.opens(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_client_and_keep_it_open() {
        let cache = ClientCache::default();
        let (a, b) = tokio::join!(
            cache.get_or_open("ds", settings("http://a"), connect),
            cache.get_or_open("ds", settings("http://a"), connect),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        settle().await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.calls().contains(&"close".to_string()));

        let again = cache.get_or_open("ds", settings("http://a"), connect).await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
    }

    #[tokio::test]
    async fn changed_settings_replace_and_close_the_old_client() {
        let cache = ClientCache::default();
        let old = cache.get_or_open("ds", settings("http://a"), connect).await.unwrap();
        let new = cache.get_or_open("ds", settings("http://b"), connect).await.unwrap();
        settle().await;

        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(old.calls(), ["close"]);
        assert!(new.calls().is_empty());
    }

    #[tokio::test]
    async fn datasources_are_cached_independently() {
        let cache = ClientCache::default();
        let a = cache.get_or_open("one", settings("http://a"), connect).await.unwrap();
        let b = cache.get_or_open("two", settings("http://a"), connect).await.unwrap();
        settle().await;

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_open_is_not_cached() {
        let cache = ClientCache::default();
        let err = cache
            .get_or_open("ds", settings("http://a"), |_| Ok(MockClient::new().failing_open()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Client(_)));

        let client = cache.get_or_open("ds", settings("http://a"), connect).await.unwrap();
        assert_eq!(client.opens(), 1);
    }
}
