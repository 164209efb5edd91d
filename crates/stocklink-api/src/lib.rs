//! # Stock-Link API Client
//!
//! Typed async client for the Stock-Link backend REST surface: products,
//! sales, auth, mobile-money push, discounts, and the deployment version
//! check.
//!
//! The client holds the bearer token for the signed-in operator; a 401
//! response invalidates it.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use stocklink_core::types::{GeoPoint, Product};

/// Errors returned by the backend client.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not signed in")]
    Unauthorized,

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend, e.g. `http://localhost:5001`.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl ApiConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            user_agent: format!("StockLink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ==================== Wire types ====================

/// Error body the backend attaches to failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Tokens and identity returned by a successful sign-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub role: String,
    pub user_email: String,
}

/// A registered operator account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub role: String,
}

/// Per-user daily activity, as reported by the session monitor endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSessionInfo {
    pub user_email: String,
    pub date: String,
    #[serde(rename = "totalMs")]
    pub total_ms: i64,
    pub status: String,
}

/// Envelope of `GET /api/auth/user-session-info`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionReport {
    pub date: String,
    pub sessions: Vec<UserSessionInfo>,
}

/// One line of a submitted order.
#[derive(Debug, Clone, Serialize)]
pub struct SaleLine {
    pub id: u64,
    pub qty: u32,
}

/// Order context shared by the sales and STK push endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderContext {
    pub items: Vec<SaleLine>,
    pub total: f64,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_latitude: f64,
    pub customer_longitude: f64,
    /// Signed-in operator.
    pub user_email: String,
}

impl OrderContext {
    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.customer_latitude,
            longitude: self.customer_longitude,
        }
    }
}

/// `POST /api/sales` payload: cash confirmation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePayload {
    #[serde(flatten)]
    pub order: OrderContext,
    pub payment_method: String,
    pub amount_tendered: f64,
}

/// `POST /api/stkpush` payload: mobile-money push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StkPushPayload {
    #[serde(flatten)]
    pub order: OrderContext,
    pub payment_method: String,
    pub amount: f64,
    pub mpesa_phone_number: String,
}

/// A recorded sale, as returned by the sales history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleRecord {
    pub id: i64,
    pub sale_date: String,
    pub total: f64,
    pub payment_method: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SalesEnvelope {
    success: bool,
    #[serde(default)]
    sales: Vec<SaleRecord>,
    #[serde(default)]
    message: Option<String>,
}

/// Revenue/COGS per category. Field naming follows the backend columns.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryCost {
    pub category_name: String,
    #[serde(rename = "totalRevenue")]
    pub total_revenue: f64,
    #[serde(rename = "totalCOGS", default)]
    pub total_cogs: f64,
}

/// A customer with repeat orders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatCustomer {
    pub customer_name: String,
    pub customer_email: String,
    pub orders: i64,
    #[serde(default)]
    pub total_spent: f64,
}

/// Daily revenue point.
#[derive(Debug, Clone, Deserialize)]
pub struct RevenuePoint {
    pub date: String,
    pub revenue: f64,
}

/// Server-computed dashboard summary, `GET /api/sales/analytics`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    #[serde(default)]
    pub today_sales: f64,
    #[serde(default)]
    pub peak_hour: Option<u8>,
    #[serde(default)]
    pub revenue_trends: Vec<RevenuePoint>,
    #[serde(default)]
    pub cost_analysis: Vec<CategoryCost>,
    #[serde(default)]
    pub repeat_customers: Vec<RepeatCustomer>,
}

/// A product carrying an active discount percentage.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountedProduct {
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub discount: f64,
}

/// `POST /api/discounts/notify` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountNotice {
    pub product_ids: Vec<u64>,
    pub email_subject: String,
    pub email_body: String,
}

#[derive(Debug, Deserialize)]
struct NotifyResult {
    #[serde(rename = "sentCount")]
    sent_count: u64,
}

/// Fields editable through the product admin screen.
#[derive(Debug, Clone, Serialize)]
pub struct ProductUpdate {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
}

/// `GET /api/version` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Analytics range selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsRange {
    Daily,
    Weekly,
    Monthly,
}

impl AnalyticsRange {
    fn as_str(&self) -> &'static str {
        match self {
            AnalyticsRange::Daily => "daily",
            AnalyticsRange::Weekly => "weekly",
            AnalyticsRange::Monthly => "monthly",
        }
    }
}

// ==================== Client ====================

/// Backend client holding the operator's bearer token.
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;

        info!(base_url = %config.base_url, "ApiClient initialized");

        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    /// Install a bearer token restored from the session store.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap() = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap() = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    fn request(&self, method: Method, url: Url, authed: bool) -> Result<reqwest::RequestBuilder, ApiError> {
        let mut builder = self.client.request(method, url);
        if authed {
            let token = self
                .token
                .read()
                .unwrap()
                .clone()
                .ok_or(ApiError::Unauthorized)?;
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    /// Check the status, mapping failures to [`ApiError::Status`]. A 401
    /// drops the held token.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected token; clearing session");
            self.clear_token();
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, authed: bool) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "GET");
        let response = self.request(Method::GET, url, authed)?.send().await?;
        let response = self.check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        authed: bool,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, method = %method, "Sending");
        let response = self
            .request(method, url, authed)?
            .json(body)
            .send()
            .await?;
        let response = self.check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    // ==================== Auth ====================

    /// Sign in and hold the returned access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let session: AuthSession = self
            .send_json(
                Method::POST,
                "/api/auth/login",
                &serde_json::json!({ "email": email, "password": password }),
                false,
            )
            .await?;
        self.set_token(session.access_token.clone());
        Ok(session)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<AuthSession, ApiError> {
        let session: AuthSession = self
            .send_json(
                Method::POST,
                "/api/auth/register",
                &serde_json::json!({ "email": email, "password": password, "role": role }),
                false,
            )
            .await?;
        self.set_token(session.access_token.clone());
        Ok(session)
    }

    /// Sign out on the backend, then drop the token regardless of outcome.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let url = self.endpoint("/api/auth/logout")?;
        let result = async {
            let response = self.request(Method::POST, url, true)?.send().await?;
            self.check(response).await.map(|_| ())
        }
        .await;
        self.clear_token();
        result
    }

    pub async fn all_users(&self) -> Result<Vec<UserAccount>, ApiError> {
        self.get_json("/api/auth/allusers", true).await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/api/auth/users/{}", user_id))?;
        let response = self.request(Method::DELETE, url, true)?.send().await?;
        self.check(response).await.map(|_| ())
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("/api/auth/change-password")?;
        let response = self
            .request(Method::PUT, url, true)?
            .json(&serde_json::json!({ "userId": user_id, "newPassword": new_password }))
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }

    pub async fn session_info(&self) -> Result<SessionReport, ApiError> {
        self.get_json("/api/auth/user-session-info", true).await
    }

    // ==================== Catalog ====================

    pub async fn products(&self) -> Result<Vec<Product>, ApiError> {
        self.get_json("/api/products", false).await
    }

    pub async fn update_product(&self, id: u64, update: &ProductUpdate) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/api/products/{}", id))?;
        let response = self
            .request(Method::PUT, url, true)?
            .json(update)
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }

    pub async fn delete_product(&self, id: u64) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/api/products/{}", id))?;
        let response = self.request(Method::DELETE, url, true)?.send().await?;
        self.check(response).await.map(|_| ())
    }

    // ==================== Sales ====================

    /// Record a cash (or cash portion of a split) sale.
    pub async fn record_sale(&self, payload: &SalePayload) -> Result<(), ApiError> {
        let url = self.endpoint("/api/sales")?;
        let response = self
            .request(Method::POST, url, true)?
            .json(payload)
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }

    /// Initiate a mobile-money push for the full amount or a split portion.
    pub async fn stk_push(&self, payload: &StkPushPayload) -> Result<(), ApiError> {
        let url = self.endpoint("/api/stkpush")?;
        // The push endpoint is reachable before sign-in on the kiosk.
        let response = self
            .request(Method::POST, url, false)?
            .json(payload)
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }

    /// Sales history, newest first.
    pub async fn sales(&self) -> Result<Vec<SaleRecord>, ApiError> {
        let envelope: SalesEnvelope = self.get_json("/api/sales/sales", true).await?;
        if !envelope.success {
            return Err(ApiError::Status {
                status: 200,
                message: envelope
                    .message
                    .unwrap_or_else(|| "sales query failed".to_string()),
            });
        }
        let mut sales = envelope.sales;
        sales.sort_by(|a, b| b.sale_date.cmp(&a.sale_date));
        Ok(sales)
    }

    pub async fn analytics(&self, range: AnalyticsRange) -> Result<AnalyticsSummary, ApiError> {
        self.get_json(
            &format!("/api/sales/analytics?range={}", range.as_str()),
            true,
        )
        .await
    }

    /// Raw CSV export of the sales ledger.
    pub async fn export_sales(&self) -> Result<Bytes, ApiError> {
        let url = self.endpoint("/api/sales/export")?;
        let response = self.request(Method::GET, url, true)?.send().await?;
        let response = self.check(response).await?;
        Ok(response.bytes().await?)
    }

    // ==================== Discounts ====================

    pub async fn discounts(&self) -> Result<Vec<DiscountedProduct>, ApiError> {
        self.get_json("/api/discounts", false).await
    }

    /// Email discount offers for the given products to repeat customers.
    /// Returns the number of emails sent.
    pub async fn notify_discounts(&self, notice: &DiscountNotice) -> Result<u64, ApiError> {
        let result: NotifyResult = self
            .send_json(Method::POST, "/api/discounts/notify", notice, true)
            .await?;
        Ok(result.sent_count)
    }

    // ==================== Deployment ====================

    /// Deployed backend version, polled by the offline worker.
    pub async fn version(&self) -> Result<VersionInfo, ApiError> {
        self.get_json("/api/version", false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(ApiConfig::new(Url::parse("http://localhost:5001").unwrap())).unwrap()
    }

    #[test]
    fn test_token_lifecycle() {
        let api = client();
        assert!(!api.has_token());

        api.set_token("abc123");
        assert!(api.has_token());

        api.clear_token();
        assert!(!api.has_token());
    }

    #[test]
    fn test_authed_request_requires_token() {
        let api = client();
        let url = api.endpoint("/api/auth/allusers").unwrap();
        assert!(matches!(
            api.request(Method::GET, url, true),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_endpoint_join() {
        let api = client();
        let url = api.endpoint("/api/products").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5001/api/products");
    }

    #[test]
    fn test_sale_payload_wire_shape() {
        let payload = SalePayload {
            order: OrderContext {
                items: vec![SaleLine { id: 3, qty: 2 }],
                total: 1500.0,
                customer_email: "jane@example.com".to_string(),
                customer_name: "Jane".to_string(),
                customer_phone: "0712345678".to_string(),
                customer_latitude: -1.2921,
                customer_longitude: 36.8219,
                user_email: "cashier@shop.example".to_string(),
            },
            payment_method: "cash".to_string(),
            amount_tendered: 2000.0,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["paymentMethod"], "cash");
        assert_eq!(value["amountTendered"], 2000.0);
        assert_eq!(value["customerEmail"], "jane@example.com");
        assert_eq!(value["items"][0]["qty"], 2);
    }

    #[test]
    fn test_session_report_mixed_naming() {
        let raw = r#"{
            "date": "2025-03-14",
            "sessions": [
                {"user_email": "a@shop.example", "date": "2025-03-14", "totalMs": 3600000, "status": "active"}
            ]
        }"#;
        let report: SessionReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.sessions[0].total_ms, 3_600_000);
    }

    #[test]
    fn test_category_cost_column_names() {
        let raw = r#"{"category_name": "Shoes", "totalRevenue": 1200.5, "totalCOGS": 700.0}"#;
        let cost: CategoryCost = serde_json::from_str(raw).unwrap();
        assert_eq!(cost.category_name, "Shoes");
        assert_eq!(cost.total_cogs, 700.0);
    }
}
