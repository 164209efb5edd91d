//! Rows and aggregates produced by the sales store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sale to record, as produced by a completed checkout.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub recorded_at: DateTime<Utc>,
    pub total: f64,
    pub payment_method: String,
    pub cash_amount: f64,
    pub mpesa_amount: f64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub operator_email: String,
    pub items: Vec<NewSaleItem>,
}

/// One line of a recorded sale.
#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub unit_price: f64,
    pub quantity: i64,
}

/// A stored sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRow {
    pub id: i64,
    /// RFC 3339 timestamp.
    pub sale_date: String,
    pub total: f64,
    pub payment_method: String,
    pub cash_amount: f64,
    pub mpesa_amount: f64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub operator_email: String,
}

/// A stored sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItemRow {
    pub sale_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub unit_price: f64,
    pub quantity: i64,
}

/// Aggregated totals over a date range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeTotals {
    pub revenue: f64,
    pub sales_count: i64,
    pub cash_revenue: f64,
    pub mpesa_revenue: f64,
}

/// Revenue grouped by product category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
}

/// Units and revenue per product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_name: String,
    pub units: i64,
    pub revenue: f64,
}

/// A customer with repeat orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatCustomer {
    pub customer_name: String,
    pub customer_email: String,
    pub orders: i64,
    pub total_spent: f64,
}

/// Revenue for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRevenue {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub revenue: f64,
    pub sales_count: i64,
}

/// The busiest hour of the day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakHour {
    /// 0-23.
    pub hour: u8,
    pub sales_count: i64,
}

/// Dashboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Days of sales kept by cleanup.
    pub retention_days: i64,
    /// How many rows product/customer leaderboards return.
    pub leaderboard_size: i64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            retention_days: 365,
            leaderboard_size: 10,
        }
    }
}

/// A full report for a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub start_date: String,
    pub end_date: String,
    pub totals: RangeTotals,
    pub daily_breakdown: Vec<DailyRevenue>,
    pub category_revenue: Vec<CategoryRevenue>,
    pub top_products: Vec<ProductSales>,
    pub repeat_customers: Vec<RepeatCustomer>,
    pub peak_hour: Option<PeakHour>,
}
