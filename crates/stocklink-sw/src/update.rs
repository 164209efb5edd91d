//! Deployment version polling and new-version broadcasts.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{ClientMessage, ClientRegistry};
use crate::fetch::{AssetFetcher, SwRequest};
use crate::SwError;

/// Payload of the version-check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVersion {
    pub version: String,
}

/// Polls the version-check endpoint while the worker is resident and tells
/// open tabs when a newer deployment exists.
///
/// Best-effort by design: a failed poll is logged and retried at the next
/// interval, never surfaced to the host page.
pub struct UpdatePoller {
    current_version: String,
    version_url: Url,
    interval: Duration,
    fetcher: Arc<dyn AssetFetcher>,
    clients: Arc<RwLock<ClientRegistry>>,
}

impl UpdatePoller {
    pub fn new(
        current_version: impl Into<String>,
        version_url: Url,
        interval: Duration,
        fetcher: Arc<dyn AssetFetcher>,
        clients: Arc<RwLock<ClientRegistry>>,
    ) -> Self {
        Self {
            current_version: current_version.into(),
            version_url,
            interval,
            fetcher,
            clients,
        }
    }

    /// One poll. Returns the remote version when it differs from ours,
    /// after broadcasting `NEW_VERSION_AVAILABLE` to every open tab.
    pub async fn poll_once(&self) -> Result<Option<String>, SwError> {
        let request = SwRequest::resource(self.version_url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(SwError::FetchFailed(format!(
                "version check returned status {}",
                response.status
            )));
        }

        let remote: RemoteVersion = serde_json::from_slice(&response.body)
            .map_err(|e| SwError::FetchFailed(format!("version check body: {}", e)))?;

        if remote.version == self.current_version {
            debug!(version = %remote.version, "Version check: up to date");
            return Ok(None);
        }

        let delivered = self
            .clients
            .write()
            .await
            .broadcast(&ClientMessage::NewVersionAvailable {
                version: remote.version.clone(),
            });
        info!(
            current = %self.current_version,
            remote = %remote.version,
            clients = delivered,
            "New deployment detected"
        );
        Ok(Some(remote.version))
    }

    /// Poll forever at the configured interval. Run on a spawned task; the
    /// platform may tear the worker down between polls.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Version poll failed; retrying next interval");
            }
            ticker.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientKind;
    use crate::fetch::SwResponse;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    struct VersionEndpoint {
        body: Mutex<Option<Vec<u8>>>,
    }

    impl VersionEndpoint {
        fn serving(version: &str) -> Self {
            Self {
                body: Mutex::new(Some(
                    format!(r#"{{"version":"{}"}}"#, version).into_bytes(),
                )),
            }
        }

        fn down() -> Self {
            Self {
                body: Mutex::new(None),
            }
        }
    }

    impl AssetFetcher for VersionEndpoint {
        fn fetch(&self, _request: &SwRequest) -> BoxFuture<'_, Result<SwResponse, SwError>> {
            Box::pin(async move {
                match self.body.lock().unwrap().clone() {
                    Some(body) => Ok(SwResponse::ok(body)),
                    None => Err(SwError::FetchFailed("connection refused".to_string())),
                }
            })
        }
    }

    fn poller(
        endpoint: Arc<VersionEndpoint>,
        clients: Arc<RwLock<ClientRegistry>>,
    ) -> UpdatePoller {
        UpdatePoller::new(
            "v5",
            Url::parse("https://shop.example/api/version").unwrap(),
            Duration::from_secs(300),
            endpoint,
            clients,
        )
    }

    #[tokio::test]
    async fn test_same_version_is_quiet() {
        let clients = Arc::new(RwLock::new(ClientRegistry::new()));
        let (_id, mut rx) = clients
            .write()
            .await
            .connect(Url::parse("https://shop.example/").unwrap(), ClientKind::Window);

        let poller = poller(Arc::new(VersionEndpoint::serving("v5")), clients);
        assert_eq!(poller.poll_once().await.unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_newer_version_broadcasts() {
        let clients = Arc::new(RwLock::new(ClientRegistry::new()));
        let (_id, mut rx) = clients
            .write()
            .await
            .connect(Url::parse("https://shop.example/").unwrap(), ClientKind::Window);

        let poller = poller(Arc::new(VersionEndpoint::serving("v6")), clients);
        assert_eq!(poller.poll_once().await.unwrap(), Some("v6".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientMessage::NewVersionAvailable {
                version: "v6".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_poll_failure_is_an_error_not_a_broadcast() {
        let clients = Arc::new(RwLock::new(ClientRegistry::new()));
        let (_id, mut rx) = clients
            .write()
            .await
            .connect(Url::parse("https://shop.example/").unwrap(), ClientKind::Window);

        let poller = poller(Arc::new(VersionEndpoint::down()), clients);
        assert!(poller.poll_once().await.is_err());
        assert!(rx.try_recv().is_err());
    }
}
