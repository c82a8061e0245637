use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::feed::{is_future_order, newest_first, FeedEntry};
use crate::engine::timers::PrepTimers;
use crate::models::order::{Order, OrderStatus};

const RECENT_ORDERS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverBoard {
    pub active_count: usize,
    pub active: Vec<FeedEntry>,
    pub completed: Vec<FeedEntry>,
}

/// What a driver sees: delivery orders only, split into work in progress and
/// finished runs, newest first.
pub fn driver_board(orders: &[Order], timers: &PrepTimers, now: DateTime<Utc>) -> DriverBoard {
    let mut deliveries: Vec<&Order> = orders
        .iter()
        .filter(|order| order.is_delivery() && !is_future_order(order, now))
        .collect();
    deliveries.sort_by(|a, b| newest_first(a, b));

    let pick = |wanted: &[OrderStatus]| -> Vec<FeedEntry> {
        deliveries
            .iter()
            .filter(|order| wanted.contains(&order.status))
            .map(|order| FeedEntry::new((*order).clone(), timers))
            .collect()
    };

    let active = pick(&[
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
    ]);
    let completed = pick(&[OrderStatus::Delivered, OrderStatus::Completed]);

    DriverBoard {
        active_count: active.len(),
        active,
        completed,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub today_orders: usize,
    pub total_revenue: f64,
    pub pending_orders: usize,
    pub completed_orders: usize,
    pub recent_orders: Vec<Order>,
}

/// Headline numbers for the admin dashboard. Future orders are left out of
/// every figure; "today" is the UTC day of `now`.
pub fn dashboard_stats(orders: &[Order], now: DateTime<Utc>) -> DashboardStats {
    let mut counted: Vec<&Order> = orders
        .iter()
        .filter(|order| !is_future_order(order, now))
        .collect();
    counted.sort_by(|a, b| newest_first(a, b));

    let today = now.date_naive();
    let today_orders = counted
        .iter()
        .filter(|order| order.created_at().is_some_and(|at| at.date_naive() == today))
        .count();

    DashboardStats {
        today_orders,
        total_revenue: counted.iter().filter_map(|order| order.total).sum(),
        pending_orders: counted
            .iter()
            .filter(|order| order.status == OrderStatus::Pending)
            .count(),
        completed_orders: counted
            .iter()
            .filter(|order| order.status.is_terminal())
            .count(),
        recent_orders: counted
            .into_iter()
            .take(RECENT_ORDERS)
            .cloned()
            .collect(),
    }
}
