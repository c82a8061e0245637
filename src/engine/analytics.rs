//! Sales analytics over a trailing window of orders.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::Order;

const DAILY_POINTS: usize = 7;
const POPULAR_ITEMS: usize = 10;
const PEAK_HOURS: usize = 5;
const UNKNOWN_ITEM: &str = "Unknown Item";
const UNKNOWN_METHOD: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum AnalyticsRange {
    #[serde(rename = "1d")]
    Day,
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl AnalyticsRange {
    pub fn days(self) -> i64 {
        match self {
            AnalyticsRange::Day => 1,
            AnalyticsRange::Week => 7,
            AnalyticsRange::Month => 30,
            AnalyticsRange::Quarter => 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySales {
    pub date: NaiveDate,
    pub sales: f64,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularItem {
    pub name: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHour {
    pub hour: u32,
    pub orders: usize,
    pub sales: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub range: AnalyticsRange,
    pub total_sales: f64,
    pub order_count: usize,
    pub avg_order_value: f64,
    pub daily_sales: Vec<DailySales>,
    pub popular_items: Vec<PopularItem>,
    pub peak_hours: Vec<PeakHour>,
    pub delivery_stats: BTreeMap<String, usize>,
    pub payment_stats: BTreeMap<String, usize>,
}

/// Aggregates the orders created within `range` of `now`. Orders without a
/// readable `createdAt` cannot be placed in the window and are left out.
/// Days and hours are UTC.
pub fn analytics(orders: &[Order], range: AnalyticsRange, now: DateTime<Utc>) -> Analytics {
    let since = now - Duration::days(range.days());
    let window: Vec<(&Order, DateTime<Utc>)> = orders
        .iter()
        .filter_map(|order| order.created_at().map(|created| (order, created)))
        .filter(|(_, created)| *created >= since)
        .collect();

    let total_sales: f64 = window.iter().map(|(order, _)| order_total(order)).sum();
    let order_count = window.len();
    let avg_order_value = if order_count == 0 {
        0.0
    } else {
        total_sales / order_count as f64
    };

    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    let mut hours: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    let mut items: HashMap<String, u64> = HashMap::new();
    let mut delivery_stats = BTreeMap::new();
    let mut payment_stats = BTreeMap::new();

    for (order, created) in &window {
        let total = order_total(order);

        let day = days.entry(created.date_naive()).or_default();
        day.0 += total;
        day.1 += 1;

        let hour = hours.entry(created.hour()).or_default();
        hour.0 += total;
        hour.1 += 1;

        for item in &order.cart {
            let name = match item.name.primary() {
                "" => UNKNOWN_ITEM.to_string(),
                name => name.to_string(),
            };
            *items.entry(name).or_default() += u64::from(item.quantity);
        }

        let method = order
            .delivery_method
            .as_ref()
            .map(|method| method.as_str())
            .filter(|method| !method.is_empty())
            .unwrap_or(UNKNOWN_METHOD);
        *delivery_stats.entry(method.to_string()).or_default() += 1;

        let payment = order
            .payment_method
            .as_deref()
            .filter(|method| !method.is_empty())
            .unwrap_or(UNKNOWN_METHOD);
        *payment_stats.entry(payment.to_string()).or_default() += 1;
    }

    let skip = days.len().saturating_sub(DAILY_POINTS);
    let daily_sales = days
        .into_iter()
        .skip(skip)
        .map(|(date, (sales, orders))| DailySales {
            date,
            sales,
            orders,
        })
        .collect();

    let mut popular_items: Vec<PopularItem> = items
        .into_iter()
        .map(|(name, quantity)| PopularItem { name, quantity })
        .collect();
    popular_items.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
    popular_items.truncate(POPULAR_ITEMS);

    let mut peak_hours: Vec<PeakHour> = hours
        .into_iter()
        .map(|(hour, (sales, orders))| PeakHour { hour, orders, sales })
        .collect();
    peak_hours.sort_by(|a, b| b.orders.cmp(&a.orders).then(a.hour.cmp(&b.hour)));
    peak_hours.truncate(PEAK_HOURS);

    Analytics {
        range,
        total_sales,
        order_count,
        avg_order_value,
        daily_sales,
        popular_items,
        peak_hours,
        delivery_stats,
        payment_stats,
    }
}

fn order_total(order: &Order) -> f64 {
    order.total.filter(|total| total.is_finite()).unwrap_or(0.0)
}
