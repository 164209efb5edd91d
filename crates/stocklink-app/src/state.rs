//! Application state: wiring of the offline worker, backend client, local
//! sales store, and session vault.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use stocklink_analytics::{NewSale, NewSaleItem, Report, SalesAnalytics};
use stocklink_api::{ApiClient, ApiConfig, AuthSession};
use stocklink_checkout::{CheckoutError, CheckoutFlow, PaymentMethod};
use stocklink_core::types::UserRole;
use stocklink_core::AppConfig;
use stocklink_session::{SessionStore, StoredSession};
use stocklink_sw::{AssetFetcher, OfflineWorker, UpdatePoller};

use crate::net::{ApiGateway, HttpAssetFetcher};

pub struct AppState {
    config: AppConfig,
    api: Arc<ApiClient>,
    fetcher: Arc<dyn AssetFetcher>,
    worker: Arc<OfflineWorker>,
    analytics: SalesAnalytics,
    session: Mutex<SessionStore>,
    gateway: ApiGateway,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {:?}", config.data_dir))?;

        let base_url = Url::parse(&config.backend_base_url)
            .with_context(|| format!("backend base url {}", config.backend_base_url))?;

        let api = Arc::new(ApiClient::new(ApiConfig::new(base_url.clone()))?);
        let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpAssetFetcher::new(base_url.clone())?);
        let worker = Arc::new(OfflineWorker::new(
            config.cache.clone(),
            base_url,
            Arc::clone(&fetcher),
        ));
        let analytics = SalesAnalytics::new(config.data_dir.join("sales.db"))?;
        let session = SessionStore::new(config.data_dir.join("session.db"))?;

        Ok(Self {
            config,
            gateway: ApiGateway::new(Arc::clone(&api)),
            api,
            fetcher,
            worker,
            analytics,
            session: Mutex::new(session),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn analytics(&self) -> &SalesAnalytics {
        &self.analytics
    }

    pub fn worker(&self) -> Arc<OfflineWorker> {
        Arc::clone(&self.worker)
    }

    /// Run the worker's install and activate steps for this deployment.
    pub async fn start_offline_worker(&self) -> anyhow::Result<()> {
        self.worker.install().await?;
        self.worker.activate().await?;
        Ok(())
    }

    /// Spawn the background version poll, if enabled.
    pub fn spawn_update_poller(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.update_poll.enabled {
            return None;
        }

        let version_url = match Url::parse(&self.config.backend_base_url)
            .and_then(|u| u.join("/api/version"))
        {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Version poll disabled: bad endpoint");
                return None;
            }
        };

        let poller = UpdatePoller::new(
            self.config.cache.version.clone(),
            version_url,
            self.config.update_poll.interval(),
            Arc::clone(&self.fetcher),
            self.worker.clients(),
        );
        Some(tokio::spawn(async move { poller.run().await }))
    }

    /// Unlock the session vault and restore a previous sign-in, if any.
    pub fn restore_session(&self, terminal_secret: &str) -> anyhow::Result<Option<StoredSession>> {
        let mut store = self.session.lock().unwrap();
        store.unlock(terminal_secret)?;

        let restored = store.load()?;
        if let Some(ref session) = restored {
            info!(user = %session.user_email, "Restored session");
            self.api.set_token(session.access_token.clone());
        }
        Ok(restored)
    }

    /// Sign in against the backend and persist the session.
    pub async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<AuthSession> {
        let auth = self.api.login(email, password).await?;

        let stored = StoredSession {
            user_email: auth.user_email.clone(),
            role: parse_role(&auth.role),
            access_token: auth.access_token.clone(),
            refresh_token: auth.refresh_token.clone(),
            updated_at: Utc::now().timestamp(),
        };
        self.session.lock().unwrap().save(&stored)?;
        Ok(auth)
    }

    /// Sign out: best-effort backend call, then drop local state.
    pub async fn sign_out(&self) -> anyhow::Result<()> {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Backend logout failed; clearing local session anyway");
        }
        self.session.lock().unwrap().clear()?;
        Ok(())
    }

    /// A fresh checkout flow for the signed-in operator.
    pub fn new_checkout(&self) -> anyhow::Result<CheckoutFlow> {
        let operator = self
            .session
            .lock()
            .unwrap()
            .load()?
            .map(|s| s.user_email)
            .ok_or_else(|| anyhow::anyhow!("no operator signed in"))?;
        Ok(CheckoutFlow::new(self.config.checkout.clone(), operator))
    }

    /// Submit a checkout and, on success, mirror the sale into the local
    /// sales store for the dashboards.
    pub async fn submit_checkout(&self, flow: &mut CheckoutFlow) -> Result<(), CheckoutError> {
        // Capture before submission clears the flow.
        let items: Vec<NewSaleItem> = flow
            .cart()
            .items()
            .iter()
            .map(|i| NewSaleItem {
                product_id: i.product_id.0 as i64,
                product_name: i.name.clone(),
                category: i.category.clone(),
                unit_price: i.unit_price,
                quantity: i.quantity as i64,
            })
            .collect();
        let total = flow.cart().total();
        let customer = flow.customer().cloned();
        let location = flow.location();
        let (payment_method, cash_amount, mpesa_amount) = match flow.method() {
            PaymentMethod::Cash { .. } => ("cash", total, 0.0),
            PaymentMethod::MobileMoney { .. } => ("mpesa", 0.0, total),
            PaymentMethod::Split { cash, mobile, .. } => ("split", *cash, *mobile),
        };
        let operator_email = self
            .session
            .lock()
            .unwrap()
            .load()
            .ok()
            .flatten()
            .map(|s| s.user_email)
            .unwrap_or_default();

        flow.submit(&self.gateway).await?;

        let Some(customer) = customer else {
            return Ok(());
        };
        let sale = NewSale {
            recorded_at: Utc::now(),
            total,
            payment_method: payment_method.to_string(),
            cash_amount,
            mpesa_amount,
            customer_name: customer.name,
            customer_email: customer.email,
            customer_phone: Some(customer.phone),
            latitude: location.map(|p| p.latitude),
            longitude: location.map(|p| p.longitude),
            operator_email,
            items,
        };
        if let Err(e) = self.analytics.record_sale(&sale) {
            // The backend has the order; the local mirror is best-effort.
            warn!(error = %e, "Failed to mirror sale into local store");
        }
        Ok(())
    }

    /// Local weekly dashboard report.
    pub fn weekly_report(&self) -> anyhow::Result<Report> {
        Ok(self.analytics.generate_weekly_report()?)
    }
}

fn parse_role(role: &str) -> UserRole {
    match role {
        "admin" => UserRole::Admin,
        _ => UserRole::Cashier,
    }
}
