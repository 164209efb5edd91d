//! The checkout state machine.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stocklink_core::config::CheckoutConfig;
use stocklink_core::types::GeoPoint;

use crate::cart::{Cart, CartItem};
use crate::location::{acquire_location, LocationSource};
use crate::CheckoutError;

/// Customer details collected before payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl CustomerInfo {
    fn validate(&self) -> Result<(), CheckoutError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.phone.trim().is_empty()
        {
            return Err(CheckoutError::Validation(
                "Full name, email, and phone number are all required".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(CheckoutError::Validation(
                "Enter a valid email address".to_string(),
            ));
        }
        Ok(())
    }
}

/// Selected payment method with its entered amounts.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentMethod {
    Cash { tendered: f64 },
    MobileMoney { amount: f64, phone: String },
    Split { cash: f64, mobile: f64, phone: String },
}

/// Where the flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutStage {
    /// No checkout in progress; a successful submission returns here.
    #[default]
    Idle,
    CollectingCustomerInfo,
    AwaitingLocation,
    /// Method and amounts are editable; submission starts from here and
    /// failures fall back here with entered data intact.
    MethodSelected,
    Submitting,
    /// The mobile-money push went through but the cash confirmation did
    /// not. Only the cash leg may be retried.
    PendingReconciliation,
}

/// Everything the backend needs to record an order.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub items: Vec<CartItem>,
    pub total: f64,
    pub customer: CustomerInfo,
    pub location: GeoPoint,
    /// Signed-in operator.
    pub operator_email: String,
}

/// Cash confirmation sent to the sales-recording endpoint.
#[derive(Debug, Clone)]
pub struct SaleSubmission {
    pub order: OrderSnapshot,
    pub payment_method: String,
    pub amount_tendered: f64,
}

/// Mobile-money push sent to the payment-initiation endpoint.
#[derive(Debug, Clone)]
pub struct PushSubmission {
    pub order: OrderSnapshot,
    pub payment_method: String,
    pub amount: f64,
    pub phone: String,
}

/// Submission seam to the backend. The production implementation wraps the
/// API client; tests count and script calls.
pub trait PaymentGateway: Send + Sync {
    fn record_sale(&self, payload: &SaleSubmission) -> BoxFuture<'_, Result<(), CheckoutError>>;
    fn initiate_push(&self, payload: &PushSubmission) -> BoxFuture<'_, Result<(), CheckoutError>>;
}

/// The checkout flow for one terminal.
pub struct CheckoutFlow {
    config: CheckoutConfig,
    operator_email: String,
    cart: Cart,
    stage: CheckoutStage,
    customer: Option<CustomerInfo>,
    location: Option<GeoPoint>,
    method: PaymentMethod,
    last_error: Option<String>,
    /// Cash leg parked by a half-completed split submission.
    pending_cash: Option<SaleSubmission>,
}

impl CheckoutFlow {
    pub fn new(config: CheckoutConfig, operator_email: impl Into<String>) -> Self {
        Self {
            config,
            operator_email: operator_email.into(),
            cart: Cart::new(),
            stage: CheckoutStage::Idle,
            customer: None,
            location: None,
            method: PaymentMethod::Cash { tendered: 0.0 },
            last_error: None,
            pending_cash: None,
        }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    pub fn method(&self) -> &PaymentMethod {
        &self.method
    }

    /// Last failure, phrased for the operator.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn customer(&self) -> Option<&CustomerInfo> {
        self.customer.as_ref()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }

    /// Open the checkout panel.
    pub fn begin(&mut self) -> Result<(), CheckoutError> {
        self.expect_stage(CheckoutStage::Idle, "begin")?;
        if self.cart.is_empty() {
            return Err(CheckoutError::Validation("The cart is empty".to_string()));
        }
        self.stage = CheckoutStage::CollectingCustomerInfo;
        Ok(())
    }

    /// Record the customer's contact details and move on to location.
    pub fn set_customer(&mut self, customer: CustomerInfo) -> Result<(), CheckoutError> {
        self.expect_stage(CheckoutStage::CollectingCustomerInfo, "set_customer")?;
        customer.validate()?;
        self.customer = Some(customer);
        self.stage = CheckoutStage::AwaitingLocation;
        Ok(())
    }

    /// One-shot geolocation attempt. Denial or timeout keeps the flow here
    /// so the operator can retry.
    pub async fn acquire_location(
        &mut self,
        source: &dyn LocationSource,
    ) -> Result<GeoPoint, CheckoutError> {
        self.expect_stage(CheckoutStage::AwaitingLocation, "acquire_location")?;

        match acquire_location(source, self.config.location_timeout()).await {
            Ok(point) => {
                self.location = Some(point);
                self.last_error = None;
                self.stage = CheckoutStage::MethodSelected;
                Ok(point)
            }
            Err(e) => {
                warn!(error = %e, "Location attempt failed");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Change the payment method or its amounts.
    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.expect_stage(CheckoutStage::MethodSelected, "select_method")?;
        self.method = method;
        Ok(())
    }

    /// Validate the selected method against the cart total without touching
    /// the network.
    pub fn validate_method(&self) -> Result<(), CheckoutError> {
        let total = self.cart.total();
        match &self.method {
            PaymentMethod::Cash { tendered } => {
                if *tendered < total {
                    return Err(CheckoutError::Validation(format!(
                        "For cash payment, tendered amount must be at least Ksh {:.2}",
                        total
                    )));
                }
            }
            PaymentMethod::MobileMoney { amount, phone } => {
                if *amount < total {
                    return Err(CheckoutError::Validation(format!(
                        "For mobile money, amount must be at least Ksh {:.2}",
                        total
                    )));
                }
                self.validate_msisdn(phone)?;
            }
            PaymentMethod::Split { cash, mobile, phone } => {
                if cash + mobile < total {
                    return Err(CheckoutError::Validation(format!(
                        "Combined cash and mobile money must be at least Ksh {:.2}",
                        total
                    )));
                }
                if *mobile > 0.0 {
                    self.validate_msisdn(phone)?;
                }
            }
        }
        Ok(())
    }

    fn validate_msisdn(&self, phone: &str) -> Result<(), CheckoutError> {
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < self.config.min_msisdn_digits {
            return Err(CheckoutError::Validation(
                "Enter a valid mobile money phone number".to_string(),
            ));
        }
        Ok(())
    }

    /// Submit the order. Validation failures leave the flow untouched and
    /// make no network call. A split order sends the mobile-money push
    /// first, then confirms the cash portion; a cash-leg failure after a
    /// successful push parks in [`CheckoutStage::PendingReconciliation`].
    pub async fn submit(&mut self, gateway: &dyn PaymentGateway) -> Result<(), CheckoutError> {
        self.expect_stage(CheckoutStage::MethodSelected, "submit")?;
        self.validate_method()?;

        let order = self.snapshot()?;
        let method = self.method.clone();
        self.stage = CheckoutStage::Submitting;

        let result = match method {
            PaymentMethod::Cash { tendered } => {
                gateway
                    .record_sale(&SaleSubmission {
                        order,
                        payment_method: "cash".to_string(),
                        amount_tendered: tendered,
                    })
                    .await
            }
            PaymentMethod::MobileMoney { amount, phone } => {
                gateway
                    .initiate_push(&PushSubmission {
                        order,
                        payment_method: "mpesa".to_string(),
                        amount,
                        phone,
                    })
                    .await
            }
            PaymentMethod::Split { cash, mobile, phone } => {
                return self.submit_split(gateway, order, cash, mobile, phone).await;
            }
        };

        match result {
            Ok(()) => {
                self.finish_success();
                Ok(())
            }
            Err(e) => self.fail_back(e),
        }
    }

    async fn submit_split(
        &mut self,
        gateway: &dyn PaymentGateway,
        order: OrderSnapshot,
        cash: f64,
        mobile: f64,
        phone: String,
    ) -> Result<(), CheckoutError> {
        let mut push_sent = false;

        if mobile > 0.0 {
            let push = PushSubmission {
                order: order.clone(),
                payment_method: "mpesa-split".to_string(),
                amount: mobile,
                phone,
            };
            if let Err(e) = gateway.initiate_push(&push).await {
                return self.fail_back(e);
            }
            push_sent = true;
            info!(amount = mobile, "Mobile money push initiated for split order");
        }

        if cash > 0.0 {
            let sale = SaleSubmission {
                order,
                payment_method: "cash-split".to_string(),
                amount_tendered: cash,
            };
            if let Err(e) = gateway.record_sale(&sale).await {
                if push_sent {
                    // Half the order exists on the backend. Park the cash
                    // leg; the push must not be re-sent.
                    warn!(error = %e, "Cash confirmation failed after push; awaiting reconciliation");
                    self.pending_cash = Some(sale);
                    self.last_error = Some(e.to_string());
                    self.stage = CheckoutStage::PendingReconciliation;
                    return Err(e);
                }
                return self.fail_back(e);
            }
        }

        self.finish_success();
        Ok(())
    }

    /// Retry only the cash leg of a half-completed split order.
    pub async fn retry_cash_portion(
        &mut self,
        gateway: &dyn PaymentGateway,
    ) -> Result<(), CheckoutError> {
        self.expect_stage(CheckoutStage::PendingReconciliation, "retry_cash_portion")?;
        let sale = self
            .pending_cash
            .clone()
            .ok_or_else(|| CheckoutError::State("no pending cash portion".to_string()))?;

        match gateway.record_sale(&sale).await {
            Ok(()) => {
                self.finish_success();
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Abandon the current checkout, keeping the cart.
    pub fn cancel(&mut self) {
        if self.stage != CheckoutStage::PendingReconciliation {
            self.stage = CheckoutStage::Idle;
            self.customer = None;
            self.location = None;
            self.last_error = None;
        }
    }

    fn snapshot(&self) -> Result<OrderSnapshot, CheckoutError> {
        let customer = self
            .customer
            .clone()
            .ok_or_else(|| CheckoutError::State("customer details missing".to_string()))?;
        let location = self
            .location
            .ok_or_else(|| CheckoutError::State("location not acquired".to_string()))?;
        Ok(OrderSnapshot {
            items: self.cart.items().to_vec(),
            total: self.cart.total(),
            customer,
            location,
            operator_email: self.operator_email.clone(),
        })
    }

    fn finish_success(&mut self) {
        info!(total = self.cart.total(), "Order recorded; clearing cart");
        self.cart.clear();
        self.customer = None;
        self.location = None;
        self.method = PaymentMethod::Cash { tendered: 0.0 };
        self.last_error = None;
        self.pending_cash = None;
        self.stage = CheckoutStage::Idle;
    }

    fn fail_back(&mut self, error: CheckoutError) -> Result<(), CheckoutError> {
        warn!(error = %error, "Submission failed; entered data kept for retry");
        self.last_error = Some(error.to_string());
        self.stage = CheckoutStage::MethodSelected;
        Err(error)
    }

    fn expect_stage(&self, expected: CheckoutStage, op: &str) -> Result<(), CheckoutError> {
        if self.stage != expected {
            return Err(CheckoutError::State(format!(
                "{} is not allowed in {:?}",
                op, self.stage
            )));
        }
        Ok(())
    }
}
