//! Worker lifecycle: install, activate, fetch interception, messages.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use stocklink_core::config::{CacheConfig, FetchPolicy};

use crate::cache::{CacheStorage, CachedResponse};
use crate::clients::{ClientId, ClientKind, ClientMessage, ClientRegistry, WorkerCommand};
use crate::fetch::{AssetFetcher, FetchDecision, RequestMode, SwRequest, SwResponse};
use crate::SwError;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerState {
    /// Initial state.
    #[default]
    Parsed,
    /// Populating the versioned cache.
    Installing,
    /// Cache populated; eligible for activation (waiting is skipped).
    Installed,
    /// Deleting stale caches and claiming clients.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Install failed or superseded by a newer version.
    Redundant,
}

/// The offline cache/update worker.
///
/// One instance exists per deployed version. A new deployment constructs a
/// new worker over the same [`CacheStorage`] and [`ClientRegistry`]; its
/// activate step deletes every cache but its own.
pub struct OfflineWorker {
    config: CacheConfig,
    /// Origin the install manifest paths are resolved against.
    scope: Url,
    fetcher: Arc<dyn AssetFetcher>,
    state: RwLock<WorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<ClientRegistry>>,
}

impl OfflineWorker {
    /// Create a worker with fresh storage and an empty client registry.
    pub fn new(config: CacheConfig, scope: Url, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self::with_shared(
            config,
            scope,
            fetcher,
            Arc::new(RwLock::new(CacheStorage::new())),
            Arc::new(RwLock::new(ClientRegistry::new())),
        )
    }

    /// Create a worker over existing storage and clients, as a new
    /// deployment does.
    pub fn with_shared(
        config: CacheConfig,
        scope: Url,
        fetcher: Arc<dyn AssetFetcher>,
        caches: Arc<RwLock<CacheStorage>>,
        clients: Arc<RwLock<ClientRegistry>>,
    ) -> Self {
        Self {
            config,
            scope,
            fetcher,
            state: RwLock::new(WorkerState::Parsed),
            caches,
            clients,
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Name of the cache this worker treats as current.
    pub fn cache_name(&self) -> String {
        self.config.cache_name()
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Shared cache storage handle.
    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.caches)
    }

    /// Shared client registry handle.
    pub fn clients(&self) -> Arc<RwLock<ClientRegistry>> {
        Arc::clone(&self.clients)
    }

    /// Register an open tab with this worker.
    pub async fn connect_client(
        &self,
        url: Url,
        kind: ClientKind,
    ) -> (ClientId, tokio::sync::mpsc::UnboundedReceiver<ClientMessage>) {
        self.clients.write().await.connect(url, kind)
    }

    /// Remove a closed tab.
    pub async fn disconnect_client(&self, id: ClientId) {
        self.clients.write().await.disconnect(id);
    }

    /// Install event: fetch and store every manifest entry.
    ///
    /// All entries are fetched before anything is committed, so a failed
    /// install never leaves a partial cache behind. Success skips the
    /// normal waiting phase.
    pub async fn install(&self) -> Result<(), SwError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Parsed {
                return Err(SwError::State(format!(
                    "install from {:?} is not allowed",
                    *state
                )));
            }
            *state = WorkerState::Installing;
        }

        let cache_name = self.cache_name();
        info!(cache = %cache_name, assets = self.config.install_manifest.len(), "Installing");

        let mut fetched = Vec::with_capacity(self.config.install_manifest.len());
        for entry in &self.config.install_manifest {
            match self.fetch_manifest_entry(entry).await {
                Ok(cached) => fetched.push(cached),
                Err(e) => {
                    error!(asset = %entry, error = %e, "Install aborted: asset fetch failed");
                    *self.state.write().await = WorkerState::Redundant;
                    return Err(SwError::InstallFailed(format!("{}: {}", entry, e)));
                }
            }
        }

        let mut caches = self.caches.write().await;
        let cache = caches.open(&cache_name);
        for entry in fetched {
            cache.put(entry);
        }
        drop(caches);

        *self.state.write().await = WorkerState::Installed;
        info!(cache = %cache_name, "Install complete; skipping waiting");
        Ok(())
    }

    async fn fetch_manifest_entry(&self, entry: &str) -> Result<CachedResponse, SwError> {
        let url = self.scope.join(entry)?;
        let request = SwRequest::resource(url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(SwError::FetchFailed(format!(
                "{} returned status {}",
                url, response.status
            )));
        }
        Ok(response.to_cached(&url, now_ms()))
    }

    /// Activate event: evict stale caches, claim clients, broadcast reload.
    pub async fn activate(&self) -> Result<(), SwError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(SwError::State(format!(
                    "activate from {:?} is not allowed",
                    *state
                )));
            }
            *state = WorkerState::Activating;
        }

        let current = self.cache_name();
        {
            let mut caches = self.caches.write().await;
            for name in caches.keys() {
                if name == current {
                    continue;
                }
                if caches.delete(&name) {
                    info!(cache = %name, "Deleted stale cache");
                } else {
                    // Best-effort cleanup.
                    warn!(cache = %name, "Failed to delete stale cache");
                }
            }
        }

        let delivered = {
            let mut clients = self.clients.write().await;
            clients.claim();
            clients.broadcast(&ClientMessage::ReloadPage)
        };

        *self.state.write().await = WorkerState::Activated;
        info!(cache = %current, clients = delivered, "Activation complete");
        Ok(())
    }

    /// Fetch event: answer from cache or network according to the
    /// configured policy.
    pub async fn handle_fetch(&self, request: &SwRequest) -> Result<FetchDecision, SwError> {
        if !request.is_interceptable() {
            return Ok(FetchDecision::PassThrough);
        }

        let state = self.state().await;
        if state != WorkerState::Activated {
            return Err(SwError::State(format!(
                "fetch intercepted in {:?} state",
                state
            )));
        }

        let response = match self.config.fetch_policy {
            FetchPolicy::CacheFirst => self.fetch_cache_first(request).await,
            FetchPolicy::NetworkFirst => self.fetch_network_first(request).await,
        };
        Ok(FetchDecision::Respond(response))
    }

    /// Cache hit wins unconditionally; misses fill the cache from the
    /// network; total failure yields a synthetic 503.
    async fn fetch_cache_first(&self, request: &SwRequest) -> SwResponse {
        let cache_name = self.cache_name();
        {
            let caches = self.caches.read().await;
            if let Some(entry) = caches.match_in(&cache_name, request.url.as_str()) {
                return SwResponse::from_cached(entry);
            }
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let mut caches = self.caches.write().await;
                    caches
                        .open(&cache_name)
                        .put(response.to_cached(&request.url, now_ms()));
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed with no cache entry");
                SwResponse::service_unavailable()
            }
        }
    }

    /// Network wins when reachable and refreshes the cache; offline
    /// navigations get the fallback page, offline resources any cached copy.
    async fn fetch_network_first(&self, request: &SwRequest) -> SwResponse {
        let cache_name = self.cache_name();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let mut caches = self.caches.write().await;
                    caches
                        .open(&cache_name)
                        .put(response.to_cached(&request.url, now_ms()));
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, falling back to cache");
                let caches = self.caches.read().await;
                let fallback = match request.mode {
                    RequestMode::Navigation => self
                        .scope
                        .join(&self.config.offline_fallback)
                        .ok()
                        .and_then(|u| {
                            caches.match_in(&cache_name, u.as_str()).map(SwResponse::from_cached)
                        }),
                    RequestMode::Resource => caches
                        .match_in(&cache_name, request.url.as_str())
                        .map(SwResponse::from_cached),
                };
                fallback.unwrap_or_else(SwResponse::service_unavailable)
            }
        }
    }

    /// Message event from a client.
    pub async fn handle_command(&self, command: WorkerCommand) -> Result<(), SwError> {
        match command {
            WorkerCommand::SkipWaiting => {
                if self.state().await == WorkerState::Installed {
                    self.activate().await
                } else {
                    debug!("SKIP_WAITING ignored: worker not in installed state");
                    Ok(())
                }
            }
            WorkerCommand::ReloadClients => {
                let delivered = self
                    .clients
                    .write()
                    .await
                    .broadcast(&ClientMessage::ForceReload);
                info!(clients = delivered, "Force reload broadcast");
                Ok(())
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted network: canned bodies per path, optional failures, and a
    /// global offline switch.
    struct ScriptedFetcher {
        assets: Mutex<HashMap<String, Vec<u8>>>,
        failing: Mutex<HashSet<String>>,
        offline: AtomicBool,
    }

    impl ScriptedFetcher {
        fn new(assets: &[(&str, &[u8])]) -> Self {
            Self {
                assets: Mutex::new(
                    assets
                        .iter()
                        .map(|(url, body)| (url.to_string(), body.to_vec()))
                        .collect(),
                ),
                failing: Mutex::new(HashSet::new()),
                offline: AtomicBool::new(false),
            }
        }

        fn fail_url(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn add_asset(&self, url: &str, body: &[u8]) {
            self.assets
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_vec());
        }
    }

    impl AssetFetcher for ScriptedFetcher {
        fn fetch(&self, request: &SwRequest) -> BoxFuture<'_, Result<SwResponse, SwError>> {
            let url = request.url.to_string();
            Box::pin(async move {
                if self.offline.load(Ordering::SeqCst) {
                    return Err(SwError::FetchFailed(format!("{}: offline", url)));
                }
                if self.failing.lock().unwrap().contains(&url) {
                    return Err(SwError::FetchFailed(format!("{}: connection reset", url)));
                }
                match self.assets.lock().unwrap().get(&url) {
                    Some(body) => Ok(SwResponse::ok(body.clone())),
                    None => Ok(SwResponse {
                        status: 404,
                        status_text: "Not Found".to_string(),
                        headers: Default::default(),
                        body: Vec::new(),
                        kind: crate::fetch::ResponseKind::Basic,
                        from_cache: false,
                    }),
                }
            })
        }
    }

    fn scope() -> Url {
        Url::parse("https://shop.example/").unwrap()
    }

    fn config(version: &str, policy: FetchPolicy) -> CacheConfig {
        CacheConfig {
            app_name: "stock-link".to_string(),
            version: version.to_string(),
            install_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/offline.html".to_string(),
            ],
            offline_fallback: "/offline.html".to_string(),
            fetch_policy: policy,
        }
    }

    fn shell_fetcher() -> Arc<ScriptedFetcher> {
        Arc::new(ScriptedFetcher::new(&[
            ("https://shop.example/", b"<root>"),
            ("https://shop.example/index.html", b"<index>"),
            ("https://shop.example/offline.html", b"<offline>"),
        ]))
    }

    #[tokio::test]
    async fn test_install_populates_manifest() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher);

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Installed);

        let caches = worker.caches();
        let caches = caches.read().await;
        for entry in ["/", "/index.html", "/offline.html"] {
            let url = scope().join(entry).unwrap();
            assert!(
                caches.match_in("stock-link-v1", url.as_str()).is_some(),
                "{} missing after install",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_failed_install_leaves_no_partial_cache() {
        let fetcher = shell_fetcher();
        fetcher.fail_url("https://shop.example/offline.html");
        let worker =
            OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher.clone());

        let result = worker.install().await;
        assert!(matches!(result, Err(SwError::InstallFailed(_))));
        assert_eq!(worker.state().await, WorkerState::Redundant);

        let caches = worker.caches();
        assert!(!caches.read().await.has("stock-link-v1"));
    }

    #[tokio::test]
    async fn test_install_fails_on_error_status() {
        let fetcher = shell_fetcher();
        let mut cfg = config("v1", FetchPolicy::CacheFirst);
        cfg.install_manifest.push("/missing.css".to_string());
        let worker = OfflineWorker::new(cfg, scope(), fetcher);

        assert!(worker.install().await.is_err());
        assert_eq!(worker.state().await, WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_caches() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(config("v2", FetchPolicy::CacheFirst), scope(), fetcher);
        {
            let caches = worker.caches();
            let mut caches = caches.write().await;
            caches.open("stock-link-v1");
            caches.open("some-other-app-v9");
        }

        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let caches = worker.caches();
        let caches = caches.read().await;
        assert_eq!(caches.keys(), vec!["stock-link-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_with_clients_open() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher);
        let (_id, mut rx) = worker.connect_client(scope(), ClientKind::Window).await;

        worker.install().await.unwrap();
        worker
            .handle_command(WorkerCommand::SkipWaiting)
            .await
            .unwrap();

        assert_eq!(worker.state().await, WorkerState::Activated);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::ReloadPage);
    }

    #[tokio::test]
    async fn test_cache_first_serves_cached_while_offline() {
        let fetcher = shell_fetcher();
        let worker =
            OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher.clone());
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        fetcher.set_offline(true);
        let request = SwRequest::resource(scope().join("/index.html").unwrap());
        let decision = worker.handle_fetch(&request).await.unwrap();

        match decision {
            FetchDecision::Respond(resp) => {
                assert!(resp.from_cache);
                assert_eq!(resp.body, b"<index>");
            }
            FetchDecision::PassThrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_cache_first_fills_cache_on_miss() {
        let fetcher = shell_fetcher();
        fetcher.add_asset("https://shop.example/products.json", b"[]");
        let worker =
            OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher.clone());
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let request = SwRequest::resource(scope().join("/products.json").unwrap());
        worker.handle_fetch(&request).await.unwrap();

        // Now offline: the miss-filled entry must serve.
        fetcher.set_offline(true);
        match worker.handle_fetch(&request).await.unwrap() {
            FetchDecision::Respond(resp) => {
                assert!(resp.from_cache);
                assert_eq!(resp.body, b"[]");
            }
            FetchDecision::PassThrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_cache_first_total_failure_is_synthetic_503() {
        let fetcher = shell_fetcher();
        let worker =
            OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher.clone());
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        fetcher.set_offline(true);
        let request = SwRequest::resource(scope().join("/never-cached.js").unwrap());
        match worker.handle_fetch(&request).await.unwrap() {
            FetchDecision::Respond(resp) => assert_eq!(resp.status, 503),
            FetchDecision::PassThrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_network_first_offline_navigation_gets_fallback() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(
            config("v1", FetchPolicy::NetworkFirst),
            scope(),
            fetcher.clone(),
        );
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        fetcher.set_offline(true);
        let request = SwRequest::navigation(scope().join("/dashboard").unwrap());
        match worker.handle_fetch(&request).await.unwrap() {
            FetchDecision::Respond(resp) => {
                assert!(resp.from_cache);
                assert_eq!(resp.body, b"<offline>");
            }
            FetchDecision::PassThrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_non_http_scheme_passes_through() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher);

        let request =
            SwRequest::resource(Url::parse("chrome-extension://abc/content.js").unwrap());
        // Pass-through applies regardless of lifecycle state.
        assert!(matches!(
            worker.handle_fetch(&request).await.unwrap(),
            FetchDecision::PassThrough
        ));
    }

    #[tokio::test]
    async fn test_reload_clients_command_broadcasts_force_reload() {
        let fetcher = shell_fetcher();
        let worker = OfflineWorker::new(config("v1", FetchPolicy::CacheFirst), scope(), fetcher);
        let (_id, mut rx) = worker.connect_client(scope(), ClientKind::Window).await;

        worker
            .handle_command(WorkerCommand::ReloadClients)
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::ForceReload);
    }
}
