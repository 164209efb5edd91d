//! Common types used throughout Stock-Link

use serde::{Deserialize, Serialize};

/// Unique identifier for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u64);

/// Unique identifier for a recorded sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaleId(pub i64);

/// Catalog product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Role of a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Cashier,
}

/// Geographic coordinates captured at checkout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde() {
        let role: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert!(role.is_admin());
        assert_eq!(serde_json::to_string(&UserRole::Cashier).unwrap(), "\"cashier\"");
    }

    #[test]
    fn test_product_optional_image() {
        let raw = r#"{"id":3,"name":"Heels","category":"Shoes","price":2500.0,"stock":12}"#;
        let product: Product = serde_json::from_str(raw).unwrap();
        assert_eq!(product.id, ProductId(3));
        assert!(product.image_url.is_none());
    }
}
