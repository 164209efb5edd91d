pub mod database;
pub mod types;

use chrono::Utc;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use stocklink_core::error::StockLinkResult;

pub use types::*;

/// Local sales store and dashboard queries.
///
/// Every completed checkout is recorded here; the dashboard, sales history,
/// and CSV export all read from this store.
pub struct SalesAnalytics {
    conn: Arc<Mutex<Connection>>,
    settings: Arc<Mutex<ReportSettings>>,
}

impl SalesAnalytics {
    /// Create a new analytics instance with the database at the given path
    pub fn new(db_path: PathBuf) -> StockLinkResult<Self> {
        let conn = database::init_database(&db_path)?;
        let settings = database::get_settings(&conn)?;

        log::info!("Sales store opened at {:?}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            settings: Arc::new(Mutex::new(settings)),
        })
    }

    /// Record a completed sale. Returns the sale id.
    pub fn record_sale(&self, sale: &NewSale) -> StockLinkResult<i64> {
        let mut conn = self.conn.lock().unwrap();
        let id = database::insert_sale(&mut conn, sale)?;
        log::info!(
            "Recorded sale {} ({} / Ksh {:.2})",
            id,
            sale.payment_method,
            sale.total
        );
        Ok(id)
    }

    /// Sales history, newest first.
    pub fn sales_history(&self, limit: Option<i64>) -> StockLinkResult<Vec<SaleRow>> {
        let conn = self.conn.lock().unwrap();
        database::list_sales(&conn, limit)
    }

    /// Lines of one sale.
    pub fn sale_items(&self, sale_id: i64) -> StockLinkResult<Vec<SaleItemRow>> {
        let conn = self.conn.lock().unwrap();
        database::items_for_sale(&conn, sale_id)
    }

    /// Totals for a specific day.
    pub fn daily_totals(&self, date: &str) -> StockLinkResult<RangeTotals> {
        let conn = self.conn.lock().unwrap();
        database::totals_for_range(&conn, date, date)
    }

    /// Totals for today.
    pub fn today_totals(&self) -> StockLinkResult<RangeTotals> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.daily_totals(&today)
    }

    /// Aggregated totals for the last N days.
    pub fn last_n_days_totals(&self, days: i64) -> StockLinkResult<RangeTotals> {
        let (start, end) = last_n_days(days);
        let conn = self.conn.lock().unwrap();
        database::totals_for_range(&conn, &start, &end)
    }

    /// Daily revenue points for the last N days.
    pub fn last_n_days_revenue(&self, days: i64) -> StockLinkResult<Vec<DailyRevenue>> {
        let (start, end) = last_n_days(days);
        let conn = self.conn.lock().unwrap();
        database::daily_revenue_range(&conn, &start, &end)
    }

    /// Revenue by category over a date range.
    pub fn category_revenue(&self, start: &str, end: &str) -> StockLinkResult<Vec<CategoryRevenue>> {
        let conn = self.conn.lock().unwrap();
        database::category_revenue_range(&conn, start, end)
    }

    /// Best-selling products over a date range.
    pub fn top_products(&self, start: &str, end: &str) -> StockLinkResult<Vec<ProductSales>> {
        let limit = self.settings.lock().unwrap().leaderboard_size;
        let conn = self.conn.lock().unwrap();
        database::top_products_range(&conn, start, end, limit)
    }

    /// Customers with two or more recorded orders.
    pub fn repeat_customers(&self) -> StockLinkResult<Vec<RepeatCustomer>> {
        let limit = self.settings.lock().unwrap().leaderboard_size;
        let conn = self.conn.lock().unwrap();
        database::repeat_customers(&conn, 2, limit)
    }

    /// Busiest hour of the day over a date range.
    pub fn peak_hour(&self, start: &str, end: &str) -> StockLinkResult<Option<PeakHour>> {
        let conn = self.conn.lock().unwrap();
        database::peak_hour_range(&conn, start, end)
    }

    /// Generate a report for a custom date range.
    pub fn generate_report(&self, start: &str, end: &str) -> StockLinkResult<Report> {
        let settings = self.settings.lock().unwrap().clone();
        let conn = self.conn.lock().unwrap();
        database::build_report(&conn, start, end, &settings)
    }

    /// Generate a weekly report (last 7 days)
    pub fn generate_weekly_report(&self) -> StockLinkResult<Report> {
        let (start, end) = last_n_days(7);
        self.generate_report(&start, &end)
    }

    /// Generate a monthly report (last 30 days)
    pub fn generate_monthly_report(&self) -> StockLinkResult<Report> {
        let (start, end) = last_n_days(30);
        self.generate_report(&start, &end)
    }

    /// The whole ledger as CSV.
    pub fn export_csv(&self) -> StockLinkResult<String> {
        let conn = self.conn.lock().unwrap();
        database::export_csv(&conn)
    }

    /// Delete sales past the retention window.
    pub fn cleanup_old_data(&self) -> StockLinkResult<usize> {
        let retention_days = self.settings.lock().unwrap().retention_days;
        let conn = self.conn.lock().unwrap();
        let removed = database::cleanup_old_sales(&conn, retention_days)?;
        if removed > 0 {
            log::info!("Removed {} sales past retention", removed);
        }
        Ok(removed)
    }

    pub fn get_settings(&self) -> ReportSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn update_settings(&self, settings: ReportSettings) -> StockLinkResult<()> {
        let conn = self.conn.lock().unwrap();
        database::update_settings(&conn, &settings)?;
        *self.settings.lock().unwrap() = settings;
        Ok(())
    }
}

fn last_n_days(days: i64) -> (String, String) {
    let end = Utc::now();
    let start = end - chrono::Duration::days(days - 1);
    (
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sale(customer: &str, total: f64, method: &str) -> NewSale {
        NewSale {
            recorded_at: Utc::now(),
            total,
            payment_method: method.to_string(),
            cash_amount: if method == "cash" { total } else { 0.0 },
            mpesa_amount: if method == "mpesa" { total } else { 0.0 },
            customer_name: customer.to_string(),
            customer_email: format!("{}@example.com", customer),
            customer_phone: Some("0712345678".to_string()),
            latitude: Some(-1.2921),
            longitude: Some(36.8219),
            operator_email: "cashier@shop.example".to_string(),
            items: vec![
                NewSaleItem {
                    product_id: 1,
                    product_name: "Heels".to_string(),
                    category: "Shoes".to_string(),
                    unit_price: total / 2.0,
                    quantity: 2,
                },
            ],
        }
    }

    fn store() -> (tempfile::TempDir, SalesAnalytics) {
        let dir = tempdir().unwrap();
        let analytics = SalesAnalytics::new(dir.path().join("sales.db")).unwrap();
        (dir, analytics)
    }

    #[test]
    fn test_record_and_history() {
        let (_dir, analytics) = store();
        let id = analytics.record_sale(&sale("jane", 1000.0, "cash")).unwrap();

        let history = analytics.sales_history(None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].total, 1000.0);

        let items = analytics.sale_items(id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "Shoes");
    }

    #[test]
    fn test_today_totals() {
        let (_dir, analytics) = store();
        analytics.record_sale(&sale("jane", 1000.0, "cash")).unwrap();
        analytics.record_sale(&sale("omar", 500.0, "mpesa")).unwrap();

        let totals = analytics.today_totals().unwrap();
        assert_eq!(totals.sales_count, 2);
        assert_eq!(totals.revenue, 1500.0);
        assert_eq!(totals.cash_revenue, 1000.0);
        assert_eq!(totals.mpesa_revenue, 500.0);
    }

    #[test]
    fn test_repeat_customers() {
        let (_dir, analytics) = store();
        analytics.record_sale(&sale("jane", 1000.0, "cash")).unwrap();
        analytics.record_sale(&sale("jane", 700.0, "cash")).unwrap();
        analytics.record_sale(&sale("omar", 500.0, "mpesa")).unwrap();

        let repeats = analytics.repeat_customers().unwrap();
        assert_eq!(repeats.len(), 1);
        assert_eq!(repeats[0].customer_email, "jane@example.com");
        assert_eq!(repeats[0].orders, 2);
        assert_eq!(repeats[0].total_spent, 1700.0);
    }

    #[test]
    fn test_weekly_report() {
        let (_dir, analytics) = store();
        analytics.record_sale(&sale("jane", 1000.0, "cash")).unwrap();

        let report = analytics.generate_weekly_report().unwrap();
        assert_eq!(report.totals.sales_count, 1);
        assert_eq!(report.category_revenue.len(), 1);
        assert_eq!(report.category_revenue[0].category, "Shoes");
        assert!(report.peak_hour.is_some());
        assert_eq!(report.daily_breakdown.len(), 1);
    }

    #[test]
    fn test_top_products_ordering() {
        let (_dir, analytics) = store();
        let mut big = sale("jane", 5000.0, "cash");
        big.items[0].product_name = "Boots".to_string();
        analytics.record_sale(&big).unwrap();
        analytics.record_sale(&sale("omar", 500.0, "cash")).unwrap();

        let (start, end) = super::last_n_days(7);
        let top = analytics.top_products(&start, &end).unwrap();
        assert_eq!(top[0].product_name, "Boots");
    }

    #[test]
    fn test_export_csv_quotes_fields() {
        let (_dir, analytics) = store();
        let mut tricky = sale("jane", 100.0, "cash");
        tricky.customer_name = "Doe, Jane".to_string();
        analytics.record_sale(&tricky).unwrap();

        let csv = analytics.export_csv().unwrap();
        assert!(csv.starts_with("id,sale_date,total"));
        assert!(csv.contains("\"Doe, Jane\""));
    }

    #[test]
    fn test_settings_update() {
        let (_dir, analytics) = store();
        let mut settings = analytics.get_settings();
        assert_eq!(settings.retention_days, 365);

        settings.retention_days = 30;
        analytics.update_settings(settings).unwrap();
        assert_eq!(analytics.get_settings().retention_days, 30);
    }

    #[test]
    fn test_cleanup_respects_retention() {
        let (_dir, analytics) = store();
        analytics.record_sale(&sale("jane", 100.0, "cash")).unwrap();

        // Today's sale is inside any positive retention window.
        assert_eq!(analytics.cleanup_old_data().unwrap(), 0);
        assert_eq!(analytics.sales_history(None).unwrap().len(), 1);
    }
}
