//! Date-range parsing and report aggregation over orders and products.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::{Category, Order, OrderStatus, Product, User};

pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Missing end means `now`; missing start means `default_days` before the
    /// end. Bounds are RFC 3339 timestamps or plain `YYYY-MM-DD` dates; a
    /// plain end date covers that whole day.
    pub fn parse(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>, default_days: i64) -> CommerceResult<Self> {
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_bound(raw, true)?,
            None => now,
        };
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_bound(raw, false)?,
            None => end - Duration::days(default_days),
        };
        if start > end {
            return Err(CommerceError::validation("startDate must not be after endDate"));
        }
        Ok(Self { start, end })
    }

    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self { start: now - Duration::days(days), end: now }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn parse_bound(raw: &str, is_end: bool) -> CommerceResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CommerceError::validation(format!("Invalid date: {}", raw)))?;
    let time = if is_end {
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        Some(NaiveTime::MIN)
    }
    .ok_or_else(|| CommerceError::validation(format!("Invalid date: {}", raw)))?;
    Ok(date.and_time(time).and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    /// Bucket key: `YYYY-MM-DD`, the Sunday starting the week, or `YYYY-MM`.
    pub fn key(self, at: DateTime<Utc>) -> String {
        let date = at.date_naive();
        match self {
            Period::Day => date.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let sunday = date - Duration::days(i64::from(date.weekday().num_days_from_sunday()));
                sunday.format("%Y-%m-%d").to_string()
            }
            Period::Month => date.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub period: String,
    pub revenue: Decimal,
    pub orders: u64,
}

/// Revenue per bucket, oldest first, keeping the most recent `limit` buckets.
pub fn revenue_by_period(orders: &[Order], period: Period, limit: usize) -> Vec<RevenuePoint> {
    let mut buckets: BTreeMap<String, (Decimal, u64)> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.is_revenue()) {
        let entry = buckets.entry(period.key(order.created_at)).or_default();
        entry.0 += order.totals.total;
        entry.1 += 1;
    }
    let skip = buckets.len().saturating_sub(limit);
    buckets
        .into_iter()
        .skip(skip)
        .map(|(period, (revenue, orders))| RevenuePoint { period, revenue, orders })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesFilter {
    pub status: Option<OrderStatus>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesStats {
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub total_subtotal: Decimal,
    pub total_shipping: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
    pub average_order_value: Decimal,
    pub orders_by_status: BTreeMap<OrderStatus, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub range: DateRange,
    pub stats: SalesStats,
    pub orders: Vec<Order>,
}

pub fn sales_stats(orders: &[Order]) -> SalesStats {
    let mut stats = SalesStats { total_orders: orders.len() as u64, ..Default::default() };
    let mut revenue_orders = 0u64;
    for order in orders {
        *stats.orders_by_status.entry(order.status).or_default() += 1;
        if !order.is_revenue() {
            continue;
        }
        revenue_orders += 1;
        stats.total_revenue += order.totals.total;
        stats.total_subtotal += order.totals.subtotal;
        stats.total_shipping += order.totals.shipping;
        stats.total_discount += order.totals.discount;
        stats.total_tax += order.totals.tax;
    }
    if revenue_orders > 0 {
        stats.average_order_value = (stats.total_revenue / Decimal::from(revenue_orders)).round_dp(2);
    }
    stats
}

/// Orders in range matching the filter, newest first, with their stats.
///
/// `product_categories` maps product ids to category ids for the category filter.
pub fn sales_report(
    orders: Vec<Order>,
    range: DateRange,
    filter: &SalesFilter,
    product_categories: &HashMap<Uuid, Uuid>,
) -> SalesReport {
    let mut orders: Vec<Order> = orders
        .into_iter()
        .filter(|o| range.contains(o.created_at))
        .filter(|o| filter.status.is_none_or(|s| o.status == s))
        .filter(|o| {
            filter.category_id.is_none_or(|category| {
                o.items
                    .iter()
                    .any(|item| product_categories.get(&item.product_id) == Some(&category))
            })
        })
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    SalesReport { range, stats: sales_stats(&orders), orders }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
    pub orders: u64,
}

/// Best sellers by units sold, revenue breaking ties.
pub fn top_products(orders: &[Order], limit: usize) -> Vec<ProductSales> {
    let mut by_product: HashMap<Uuid, ProductSales> = HashMap::new();
    for order in orders.iter().filter(|o| o.is_revenue()) {
        for item in &order.items {
            let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
                product_id: item.product_id,
                name: item.name.clone(),
                quantity: 0,
                revenue: Decimal::ZERO,
                orders: 0,
            });
            entry.quantity += i64::from(item.quantity);
            entry.revenue += item.total;
            entry.orders += 1;
        }
    }
    let mut ranked: Vec<ProductSales> = by_product.into_values().collect();
    ranked.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSales {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub orders: u64,
    pub total_spent: Decimal,
    pub last_order_at: DateTime<Utc>,
}

pub fn top_customers(orders: &[Order], users: &HashMap<Uuid, User>, limit: usize) -> Vec<CustomerSales> {
    let mut by_user: HashMap<Uuid, CustomerSales> = HashMap::new();
    for order in orders.iter().filter(|o| o.is_revenue()) {
        let entry = by_user.entry(order.user_id).or_insert_with(|| {
            let (name, email) = users
                .get(&order.user_id)
                .map(|u| (u.full_name(), u.email.clone()))
                .unwrap_or_default();
            CustomerSales {
                user_id: order.user_id,
                name,
                email,
                orders: 0,
                total_spent: Decimal::ZERO,
                last_order_at: order.created_at,
            }
        });
        entry.orders += 1;
        entry.total_spent += order.totals.total;
        entry.last_order_at = entry.last_order_at.max(order.created_at);
    }
    let mut ranked: Vec<CustomerSales> = by_user.into_values().collect();
    ranked.sort_by(|a, b| b.total_spent.cmp(&a.total_spent).then_with(|| b.orders.cmp(&a.orders)));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

pub fn stock_status(stock: i32, low_threshold: i32) -> StockStatus {
    if stock <= 0 {
        StockStatus::OutOfStock
    } else if stock <= low_threshold {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub category_id: Uuid,
    pub stock: i32,
    pub price: Decimal,
    pub value: Decimal,
    pub status: StockStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStock {
    pub category_id: Uuid,
    pub name: String,
    pub products: u64,
    pub total_stock: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_products: u64,
    pub total_stock: i64,
    pub total_value: Decimal,
    pub out_of_stock: u64,
    pub low_stock: u64,
    pub in_stock: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub summary: InventorySummary,
    pub products: Vec<InventoryItem>,
    pub categories: Vec<CategoryStock>,
}

pub fn inventory_report(products: &[Product], categories: &[Category], low_threshold: i32) -> InventoryReport {
    let mut summary = InventorySummary::default();
    let mut per_category: BTreeMap<Uuid, CategoryStock> = BTreeMap::new();
    let mut items = Vec::with_capacity(products.len());

    for product in products {
        let status = stock_status(product.stock, low_threshold);
        let value = product.inventory_value();
        summary.total_products += 1;
        summary.total_stock += i64::from(product.stock.max(0));
        summary.total_value += value;
        match status {
            StockStatus::OutOfStock => summary.out_of_stock += 1,
            StockStatus::LowStock => summary.low_stock += 1,
            StockStatus::InStock => summary.in_stock += 1,
        }

        let bucket = per_category.entry(product.category_id).or_insert_with(|| CategoryStock {
            category_id: product.category_id,
            name: categories
                .iter()
                .find(|c| c.id == product.category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            products: 0,
            total_stock: 0,
            total_value: Decimal::ZERO,
        });
        bucket.products += 1;
        bucket.total_stock += i64::from(product.stock.max(0));
        bucket.total_value += value;

        items.push(InventoryItem {
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            category_id: product.category_id,
            stock: product.stock,
            price: product.price,
            value,
            status,
        });
    }
    items.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));

    InventoryReport {
        summary,
        products: items,
        categories: per_category.into_values().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_sales: Decimal,
    pub total_orders: u64,
    pub total_customers: u64,
    pub total_products: u64,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub range: DateRange,
    pub overview: DashboardOverview,
    pub order_stats: BTreeMap<OrderStatus, u64>,
    pub top_products: Vec<ProductSales>,
    pub recent_orders: Vec<Order>,
    pub low_stock: Vec<InventoryItem>,
    pub revenue_by_day: Vec<RevenuePoint>,
}

pub struct DashboardInputs<'a> {
    pub range: DateRange,
    pub orders: Vec<Order>,
    pub products: &'a [Product],
    pub categories: &'a [Category],
    pub total_customers: u64,
    pub low_stock_threshold: i32,
}

pub fn dashboard(inputs: DashboardInputs<'_>) -> Dashboard {
    let DashboardInputs { range, orders, products, categories, total_customers, low_stock_threshold } = inputs;
    let mut orders: Vec<Order> = orders.into_iter().filter(|o| range.contains(o.created_at)).collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let stats = sales_stats(&orders);
    let active: Vec<Product> = products.iter().filter(|p| p.is_active).cloned().collect();
    let low_stock = inventory_report(&active, categories, low_stock_threshold)
        .products
        .into_iter()
        .filter(|item| item.status != StockStatus::InStock)
        .collect();

    Dashboard {
        range,
        overview: DashboardOverview {
            total_sales: stats.total_revenue,
            total_orders: stats.total_orders,
            total_customers,
            total_products: active.len() as u64,
            average_order_value: stats.average_order_value,
        },
        top_products: top_products(&orders, 5),
        revenue_by_day: revenue_by_period(&orders, Period::Day, DEFAULT_RANGE_DAYS as usize),
        order_stats: stats.orders_by_status,
        recent_orders: orders.into_iter().take(10).collect(),
        low_stock,
    }
}
