//! One-shot geolocation acquisition with a fixed timeout.

use std::time::Duration;

use futures::future::BoxFuture;
use stocklink_core::types::GeoPoint;
use tracing::debug;

use crate::CheckoutError;

/// Where coordinates come from. Kiosk deployments use a fixed position;
/// tests script denials and hangs.
pub trait LocationSource: Send + Sync {
    fn current_location(&self) -> BoxFuture<'_, Result<GeoPoint, CheckoutError>>;
}

/// Terminal-configured coordinates.
pub struct FixedLocation(pub GeoPoint);

impl LocationSource for FixedLocation {
    fn current_location(&self) -> BoxFuture<'_, Result<GeoPoint, CheckoutError>> {
        let point = self.0;
        Box::pin(async move { Ok(point) })
    }
}

/// Ask the source once, giving up after `timeout`.
pub async fn acquire_location(
    source: &dyn LocationSource,
    timeout: Duration,
) -> Result<GeoPoint, CheckoutError> {
    match tokio::time::timeout(timeout, source.current_location()).await {
        Ok(result) => {
            if let Ok(point) = &result {
                debug!(lat = point.latitude, lon = point.longitude, "Location acquired");
            }
            result
        }
        Err(_) => Err(CheckoutError::Location(format!(
            "no position after {:?}",
            timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Denied;

    impl LocationSource for Denied {
        fn current_location(&self) -> BoxFuture<'_, Result<GeoPoint, CheckoutError>> {
            Box::pin(async {
                Err(CheckoutError::Location(
                    "location access was denied".to_string(),
                ))
            })
        }
    }

    struct NeverAnswers;

    impl LocationSource for NeverAnswers {
        fn current_location(&self) -> BoxFuture<'_, Result<GeoPoint, CheckoutError>> {
            Box::pin(async {
                futures::future::pending::<()>().await;
                unreachable!()
            })
        }
    }

    #[tokio::test]
    async fn test_fixed_location_resolves() {
        let source = FixedLocation(GeoPoint {
            latitude: -1.2921,
            longitude: 36.8219,
        });
        let point = acquire_location(&source, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(point.latitude, -1.2921);
    }

    #[tokio::test]
    async fn test_denied_surfaces_error() {
        let result = acquire_location(&Denied, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CheckoutError::Location(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let result = acquire_location(&NeverAnswers, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CheckoutError::Location(_))));
    }
}
