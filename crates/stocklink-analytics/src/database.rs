use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use stocklink_core::error::{StockLinkError, StockLinkResult};

use crate::types::{
    CategoryRevenue, DailyRevenue, NewSale, PeakHour, ProductSales, RangeTotals, RepeatCustomer,
    Report, ReportSettings, SaleItemRow, SaleRow,
};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Initialize or open the sales database
pub fn init_database(path: &Path) -> StockLinkResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| StockLinkError::analytics(format!("Failed to open sales database: {}", e)))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .unwrap_or(false);

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StockLinkError::analytics(e.to_string()))?
        .unwrap_or(0)
    } else {
        0
    };

    if version < SCHEMA_VERSION {
        create_schema(&conn)?;
    }

    Ok(conn)
}

fn create_schema(conn: &Connection) -> StockLinkResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sale_date TEXT NOT NULL,
            sale_day TEXT NOT NULL,
            total REAL NOT NULL,
            payment_method TEXT NOT NULL,
            cash_amount REAL NOT NULL DEFAULT 0,
            mpesa_amount REAL NOT NULL DEFAULT 0,
            customer_name TEXT NOT NULL,
            customer_email TEXT NOT NULL,
            customer_phone TEXT,
            latitude REAL,
            longitude REAL,
            operator_email TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sales_day ON sales(sale_day);
        CREATE INDEX IF NOT EXISTS idx_sales_customer ON sales(customer_email);

        CREATE TABLE IF NOT EXISTS sale_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sale_id INTEGER NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL,
            product_name TEXT NOT NULL,
            category TEXT NOT NULL,
            unit_price REAL NOT NULL,
            quantity INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_sale ON sale_items(sale_id);
        CREATE INDEX IF NOT EXISTS idx_items_category ON sale_items(category);

        CREATE TABLE IF NOT EXISTS report_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            retention_days INTEGER NOT NULL DEFAULT 365,
            leaderboard_size INTEGER NOT NULL DEFAULT 10
        );

        INSERT OR IGNORE INTO report_settings (id) VALUES (1);
        "#,
    )
    .map_err(|e| StockLinkError::analytics(format!("Failed to create schema: {}", e)))?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![SCHEMA_VERSION, Utc::now().timestamp()],
    )
    .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    Ok(())
}

pub fn get_settings(conn: &Connection) -> StockLinkResult<ReportSettings> {
    conn.query_row(
        "SELECT retention_days, leaderboard_size FROM report_settings WHERE id = 1",
        [],
        |row| {
            Ok(ReportSettings {
                retention_days: row.get(0)?,
                leaderboard_size: row.get(1)?,
            })
        },
    )
    .map_err(|e| StockLinkError::analytics(e.to_string()))
}

pub fn update_settings(conn: &Connection, settings: &ReportSettings) -> StockLinkResult<()> {
    conn.execute(
        "UPDATE report_settings SET retention_days = ?1, leaderboard_size = ?2 WHERE id = 1",
        params![settings.retention_days, settings.leaderboard_size],
    )
    .map_err(|e| StockLinkError::analytics(e.to_string()))?;
    Ok(())
}

/// Insert a sale with its lines. Returns the sale id.
pub fn insert_sale(conn: &mut Connection, sale: &NewSale) -> StockLinkResult<i64> {
    let tx = conn
        .transaction()
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    tx.execute(
        "INSERT INTO sales (sale_date, sale_day, total, payment_method, cash_amount,
                            mpesa_amount, customer_name, customer_email, customer_phone,
                            latitude, longitude, operator_email)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            sale.recorded_at.to_rfc3339(),
            sale.recorded_at.format("%Y-%m-%d").to_string(),
            sale.total,
            sale.payment_method,
            sale.cash_amount,
            sale.mpesa_amount,
            sale.customer_name,
            sale.customer_email,
            sale.customer_phone,
            sale.latitude,
            sale.longitude,
            sale.operator_email,
        ],
    )
    .map_err(|e| StockLinkError::analytics(format!("Failed to insert sale: {}", e)))?;

    let sale_id = tx.last_insert_rowid();
    for item in &sale.items {
        tx.execute(
            "INSERT INTO sale_items (sale_id, product_id, product_name, category, unit_price, quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sale_id,
                item.product_id,
                item.product_name,
                item.category,
                item.unit_price,
                item.quantity,
            ],
        )
        .map_err(|e| StockLinkError::analytics(format!("Failed to insert sale item: {}", e)))?;
    }

    tx.commit()
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;
    Ok(sale_id)
}

fn sale_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SaleRow> {
    Ok(SaleRow {
        id: row.get(0)?,
        sale_date: row.get(1)?,
        total: row.get(2)?,
        payment_method: row.get(3)?,
        cash_amount: row.get(4)?,
        mpesa_amount: row.get(5)?,
        customer_name: row.get(6)?,
        customer_email: row.get(7)?,
        customer_phone: row.get(8)?,
        latitude: row.get(9)?,
        longitude: row.get(10)?,
        operator_email: row.get(11)?,
    })
}

const SALE_COLUMNS: &str = "id, sale_date, total, payment_method, cash_amount, mpesa_amount,
                            customer_name, customer_email, customer_phone, latitude, longitude,
                            operator_email";

/// Sales history, newest first.
pub fn list_sales(conn: &Connection, limit: Option<i64>) -> StockLinkResult<Vec<SaleRow>> {
    let sql = match limit {
        Some(_) => format!(
            "SELECT {} FROM sales ORDER BY sale_date DESC LIMIT ?1",
            SALE_COLUMNS
        ),
        None => format!("SELECT {} FROM sales ORDER BY sale_date DESC", SALE_COLUMNS),
    };

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = match limit {
        Some(n) => stmt.query_map(params![n], sale_from_row),
        None => stmt.query_map([], sale_from_row),
    }
    .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

pub fn items_for_sale(conn: &Connection, sale_id: i64) -> StockLinkResult<Vec<SaleItemRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT sale_id, product_id, product_name, category, unit_price, quantity
             FROM sale_items WHERE sale_id = ?1",
        )
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = stmt
        .query_map(params![sale_id], |row| {
            Ok(SaleItemRow {
                sale_id: row.get(0)?,
                product_id: row.get(1)?,
                product_name: row.get(2)?,
                category: row.get(3)?,
                unit_price: row.get(4)?,
                quantity: row.get(5)?,
            })
        })
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

/// Aggregated totals for `start..=end` (inclusive, `YYYY-MM-DD`).
pub fn totals_for_range(conn: &Connection, start: &str, end: &str) -> StockLinkResult<RangeTotals> {
    conn.query_row(
        "SELECT COALESCE(SUM(total), 0), COUNT(*),
                COALESCE(SUM(cash_amount), 0), COALESCE(SUM(mpesa_amount), 0)
         FROM sales WHERE sale_day BETWEEN ?1 AND ?2",
        params![start, end],
        |row| {
            Ok(RangeTotals {
                revenue: row.get(0)?,
                sales_count: row.get(1)?,
                cash_revenue: row.get(2)?,
                mpesa_revenue: row.get(3)?,
            })
        },
    )
    .map_err(|e| StockLinkError::analytics(e.to_string()))
}

pub fn daily_revenue_range(
    conn: &Connection,
    start: &str,
    end: &str,
) -> StockLinkResult<Vec<DailyRevenue>> {
    let mut stmt = conn
        .prepare(
            "SELECT sale_day, COALESCE(SUM(total), 0), COUNT(*)
             FROM sales WHERE sale_day BETWEEN ?1 AND ?2
             GROUP BY sale_day ORDER BY sale_day",
        )
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = stmt
        .query_map(params![start, end], |row| {
            Ok(DailyRevenue {
                date: row.get(0)?,
                revenue: row.get(1)?,
                sales_count: row.get(2)?,
            })
        })
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

pub fn category_revenue_range(
    conn: &Connection,
    start: &str,
    end: &str,
) -> StockLinkResult<Vec<CategoryRevenue>> {
    let mut stmt = conn
        .prepare(
            "SELECT i.category, COALESCE(SUM(i.unit_price * i.quantity), 0) AS revenue
             FROM sale_items i JOIN sales s ON s.id = i.sale_id
             WHERE s.sale_day BETWEEN ?1 AND ?2
             GROUP BY i.category ORDER BY revenue DESC",
        )
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = stmt
        .query_map(params![start, end], |row| {
            Ok(CategoryRevenue {
                category: row.get(0)?,
                revenue: row.get(1)?,
            })
        })
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

pub fn top_products_range(
    conn: &Connection,
    start: &str,
    end: &str,
    limit: i64,
) -> StockLinkResult<Vec<ProductSales>> {
    let mut stmt = conn
        .prepare(
            "SELECT i.product_name, COALESCE(SUM(i.quantity), 0) AS units,
                    COALESCE(SUM(i.unit_price * i.quantity), 0) AS revenue
             FROM sale_items i JOIN sales s ON s.id = i.sale_id
             WHERE s.sale_day BETWEEN ?1 AND ?2
             GROUP BY i.product_name ORDER BY revenue DESC LIMIT ?3",
        )
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = stmt
        .query_map(params![start, end, limit], |row| {
            Ok(ProductSales {
                product_name: row.get(0)?,
                units: row.get(1)?,
                revenue: row.get(2)?,
            })
        })
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

/// Customers with at least `min_orders` recorded sales, biggest spenders
/// first.
pub fn repeat_customers(
    conn: &Connection,
    min_orders: i64,
    limit: i64,
) -> StockLinkResult<Vec<RepeatCustomer>> {
    let mut stmt = conn
        .prepare(
            "SELECT customer_name, customer_email, COUNT(*) AS orders,
                    COALESCE(SUM(total), 0) AS spent
             FROM sales GROUP BY customer_email
             HAVING orders >= ?1
             ORDER BY spent DESC LIMIT ?2",
        )
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    let rows = stmt
        .query_map(params![min_orders, limit], |row| {
            Ok(RepeatCustomer {
                customer_name: row.get(0)?,
                customer_email: row.get(1)?,
                orders: row.get(2)?,
                total_spent: row.get(3)?,
            })
        })
        .map_err(|e| StockLinkError::analytics(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

/// Hour of day (0-23) with the most sales in the range, if any.
pub fn peak_hour_range(
    conn: &Connection,
    start: &str,
    end: &str,
) -> StockLinkResult<Option<PeakHour>> {
    conn.query_row(
        "SELECT CAST(strftime('%H', sale_date) AS INTEGER) AS hour, COUNT(*) AS n
         FROM sales WHERE sale_day BETWEEN ?1 AND ?2
         GROUP BY hour ORDER BY n DESC LIMIT 1",
        params![start, end],
        |row| {
            Ok(PeakHour {
                hour: row.get::<_, i64>(0)? as u8,
                sales_count: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| StockLinkError::analytics(e.to_string()))
}

/// Delete sales older than the retention window. Returns rows removed.
pub fn cleanup_old_sales(conn: &Connection, retention_days: i64) -> StockLinkResult<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days))
        .format("%Y-%m-%d")
        .to_string();
    conn.execute("DELETE FROM sales WHERE sale_day < ?1", params![cutoff])
        .map_err(|e| StockLinkError::analytics(e.to_string()))
}

/// The whole sales ledger as CSV, newest first.
pub fn export_csv(conn: &Connection) -> StockLinkResult<String> {
    let sales = list_sales(conn, None)?;
    let mut out = String::from(
        "id,sale_date,total,payment_method,cash_amount,mpesa_amount,customer_name,customer_email,operator_email\n",
    );
    for sale in sales {
        out.push_str(&format!(
            "{},{},{:.2},{},{:.2},{:.2},{},{},{}\n",
            sale.id,
            sale.sale_date,
            sale.total,
            sale.payment_method,
            sale.cash_amount,
            sale.mpesa_amount,
            csv_field(&sale.customer_name),
            csv_field(&sale.customer_email),
            csv_field(&sale.operator_email),
        ));
    }
    Ok(out)
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Assemble a full report for `start..=end`.
pub fn build_report(
    conn: &Connection,
    start: &str,
    end: &str,
    settings: &ReportSettings,
) -> StockLinkResult<Report> {
    Ok(Report {
        start_date: start.to_string(),
        end_date: end.to_string(),
        totals: totals_for_range(conn, start, end)?,
        daily_breakdown: daily_revenue_range(conn, start, end)?,
        category_revenue: category_revenue_range(conn, start, end)?,
        top_products: top_products_range(conn, start, end, settings.leaderboard_size)?,
        repeat_customers: repeat_customers(conn, 2, settings.leaderboard_size)?,
        peak_hour: peak_hour_range(conn, start, end)?,
    })
}
