//! Adapters from the engine seams to the real network.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;
use url::Url;

use stocklink_api::{ApiClient, OrderContext, SaleLine, SalePayload, StkPushPayload};
use stocklink_checkout::{CheckoutError, PaymentGateway, PushSubmission, SaleSubmission};
use stocklink_sw::{AssetFetcher, ResponseKind, SwError, SwRequest, SwResponse};

/// Real-network implementation of the worker's fetch seam.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    /// Origin of the app shell; responses from other origins are CORS.
    origin: Url,
}

impl HttpAssetFetcher {
    pub fn new(origin: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(format!("StockLink/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, origin })
    }
}

impl AssetFetcher for HttpAssetFetcher {
    fn fetch(&self, request: &SwRequest) -> BoxFuture<'_, Result<SwResponse, SwError>> {
        let url = request.url.clone();
        Box::pin(async move {
            debug!(url = %url, "Fetching asset");
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| SwError::FetchFailed(format!("{}: {}", url, e)))?;

            let status = response.status();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| SwError::FetchFailed(format!("{}: {}", url, e)))?
                .to_vec();

            let kind = if url.origin() == self.origin.origin() {
                ResponseKind::Basic
            } else {
                ResponseKind::Cors
            };

            Ok(SwResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body,
                kind,
                from_cache: false,
            })
        })
    }
}

/// Checkout submissions routed through the backend client.
pub struct ApiGateway {
    api: Arc<ApiClient>,
}

impl ApiGateway {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    fn order_context(order: &stocklink_checkout::OrderSnapshot) -> OrderContext {
        OrderContext {
            items: order
                .items
                .iter()
                .map(|i| SaleLine {
                    id: i.product_id.0,
                    qty: i.quantity,
                })
                .collect(),
            total: order.total,
            customer_email: order.customer.email.clone(),
            customer_name: order.customer.name.clone(),
            customer_phone: order.customer.phone.clone(),
            customer_latitude: order.location.latitude,
            customer_longitude: order.location.longitude,
            user_email: order.operator_email.clone(),
        }
    }
}

impl PaymentGateway for ApiGateway {
    fn record_sale(&self, payload: &SaleSubmission) -> BoxFuture<'_, Result<(), CheckoutError>> {
        let wire = SalePayload {
            order: Self::order_context(&payload.order),
            payment_method: payload.payment_method.clone(),
            amount_tendered: payload.amount_tendered,
        };
        Box::pin(async move {
            self.api
                .record_sale(&wire)
                .await
                .map_err(|e| CheckoutError::Payment(e.to_string()))
        })
    }

    fn initiate_push(&self, payload: &PushSubmission) -> BoxFuture<'_, Result<(), CheckoutError>> {
        let wire = StkPushPayload {
            order: Self::order_context(&payload.order),
            payment_method: payload.payment_method.clone(),
            amount: payload.amount,
            mpesa_phone_number: payload.phone.clone(),
        };
        Box::pin(async move {
            self.api
                .stk_push(&wire)
                .await
                .map_err(|e| CheckoutError::Payment(e.to_string()))
        })
    }
}
