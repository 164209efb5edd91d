//! # Stock-Link Checkout
//!
//! Shopping cart and the checkout state machine: customer details,
//! geolocation capture, payment method selection (cash, mobile money, or a
//! split of both), and order submission sequencing.
//!
//! ```text
//! Idle → CollectingCustomerInfo → AwaitingLocation → MethodSelected
//!                                                         │
//!                                              Submitting ┘
//!                                              │        │
//!                                       (success)   (split cash leg failed)
//!                                              │        │
//!                                            Idle   PendingReconciliation
//! ```
//!
//! A split order is sequential, not transactional: the mobile-money push
//! goes out before the cash confirmation. When the cash leg fails after a
//! successful push, the flow parks in `PendingReconciliation` so the cash
//! leg can be retried without re-sending the push.

use thiserror::Error;

pub mod cart;
pub mod flow;
pub mod location;

pub use cart::{Cart, CartItem};
pub use flow::{
    CheckoutFlow, CheckoutStage, CustomerInfo, OrderSnapshot, PaymentGateway, PaymentMethod,
    PushSubmission, SaleSubmission,
};
pub use location::{acquire_location, FixedLocation, LocationSource};

/// Errors surfaced by the checkout flow.
#[derive(Error, Debug, Clone)]
pub enum CheckoutError {
    /// Input rejected before any network call is made.
    #[error("{0}")]
    Validation(String),

    #[error("Checkout state error: {0}")]
    State(String),

    #[error("Location unavailable: {0}")]
    Location(String),

    #[error("Payment failed: {0}")]
    Payment(String),
}
