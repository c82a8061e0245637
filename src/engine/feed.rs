use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::timers::PrepTimers;
use crate::models::order::{DisplayStatus, Order, OrderStatus};

pub const PRIORITY_READY: u16 = 1;
pub const PRIORITY_PREPARING: u16 = 2;
pub const PRIORITY_OUT_FOR_DELIVERY: u16 = 3;
pub const PRIORITY_DONE: u16 = 4;
pub const PRIORITY_UNRANKED: u16 = 999;

/// Operational rank: food waiting on the pass first, then the kitchen, then
/// orders already on the road.
pub fn status_priority(status: &OrderStatus) -> u16 {
    match status {
        OrderStatus::Ready => PRIORITY_READY,
        OrderStatus::Preparing => PRIORITY_PREPARING,
        OrderStatus::OutForDelivery => PRIORITY_OUT_FOR_DELIVERY,
        OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Served => PRIORITY_DONE,
        OrderStatus::Pending | OrderStatus::Unrecognized(_) => PRIORITY_UNRANKED,
    }
}

/// A pending order scheduled for later than `now`. An unparsable schedule
/// leaves the order visible.
pub fn is_future_order(order: &Order, now: DateTime<Utc>) -> bool {
    order.status == OrderStatus::Pending
        && order.scheduled_for().is_some_and(|scheduled| scheduled > now)
}

/// Newest first; undated orders after dated ones.
pub fn newest_first(a: &Order, b: &Order) -> Ordering {
    match (a.created_at(), b.created_at()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn feed_order(a: &Order, b: &Order) -> Ordering {
    status_priority(&a.status)
        .cmp(&status_priority(&b.status))
        .then_with(|| newest_first(a, b))
}

/// Drops future orders and sorts the rest for the operational list.
pub fn live_orders(orders: &[Order], now: DateTime<Utc>) -> Vec<Order> {
    let mut live: Vec<Order> = orders
        .iter()
        .filter(|order| !is_future_order(order, now))
        .cloned()
        .collect();
    live.sort_by(feed_order);
    live
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    #[serde(flatten)]
    pub order: Order,
    pub display_status: DisplayStatus,
    pub priority: u16,
    pub short_id: String,
    pub ticket: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

impl FeedEntry {
    pub fn new(order: Order, timers: &PrepTimers) -> Self {
        Self {
            display_status: order.status.display(),
            priority: status_priority(&order.status),
            short_id: order.short_id().to_string(),
            ticket: order.cart.iter().map(|item| item.ticket_line()).collect(),
            remaining_seconds: timers.get(&order.id),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedView {
    pub tenant: String,
    pub generated_at: DateTime<Utc>,
    pub orders: Vec<FeedEntry>,
    pub timers: BTreeMap<String, i64>,
}

/// Derived state for one tenant: the latest snapshot plus its prep timers.
#[derive(Debug, Clone, Default)]
pub struct OrderFeed {
    orders: Vec<Order>,
    timers: PrepTimers,
}

impl OrderFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot and reconciles timers against it.
    pub fn apply_snapshot(&mut self, orders: Vec<Order>, now: DateTime<Utc>) {
        self.timers.recompute(&orders, now);
        self.orders = orders;
    }

    pub fn tick(&mut self) {
        self.timers.tick();
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn timers(&self) -> &PrepTimers {
        &self.timers
    }

    pub fn view(&self, tenant: &str, now: DateTime<Utc>) -> FeedView {
        let orders = live_orders(&self.orders, now)
            .into_iter()
            .map(|order| FeedEntry::new(order, &self.timers))
            .collect();

        FeedView {
            tenant: tenant.to_string(),
            generated_at: now,
            orders,
            timers: self.timers.as_map().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{is_future_order, live_orders, status_priority, OrderFeed, PRIORITY_UNRANKED};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::timestamp::Timestamp;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
    }

    fn order(id: &str, status: OrderStatus, created_minutes_ago: i64) -> Order {
        let mut order = Order::new(id, status);
        order.created_at = Some(Timestamp::from(now() - Duration::minutes(created_minutes_ago)));
        order
    }

    fn scheduled(id: &str, status: OrderStatus, at: Timestamp) -> Order {
        let mut order = order(id, status, 1);
        order.delivery_date_time = Some(at);
        order
    }

    fn ids(orders: &[Order]) -> Vec<&str> {
        orders.iter().map(|order| order.id.as_str()).collect()
    }

    #[test]
    fn pending_order_scheduled_later_is_hidden() {
        let future = scheduled("f", OrderStatus::Pending, Timestamp::from(now() + Duration::hours(2)));
        let due = scheduled("d", OrderStatus::Pending, Timestamp::from(now() - Duration::minutes(5)));

        assert!(is_future_order(&future, now()));
        assert!(!is_future_order(&due, now()));
        assert_eq!(ids(&live_orders(&[future, due], now())), vec!["d"]);
    }

    #[test]
    fn only_pending_orders_can_be_future_orders() {
        let preparing = scheduled(
            "p",
            OrderStatus::Preparing,
            Timestamp::from(now() + Duration::hours(2)),
        );

        assert!(!is_future_order(&preparing, now()));
        assert_eq!(live_orders(&[preparing], now()).len(), 1);
    }

    #[test]
    fn schedule_equal_to_now_is_not_future() {
        let at_now = scheduled("n", OrderStatus::Pending, Timestamp::from(now()));
        assert!(!is_future_order(&at_now, now()));
    }

    #[test]
    fn unparsable_schedule_fails_open() {
        let garbage = scheduled(
            "g",
            OrderStatus::Pending,
            Timestamp::Text("next friday".to_string()),
        );

        assert!(!is_future_order(&garbage, now()));
        assert_eq!(ids(&live_orders(&[garbage], now())), vec!["g"]);
    }

    #[test]
    fn sorts_by_status_priority() {
        let orders = vec![
            order("done", OrderStatus::Served, 1),
            order("pending", OrderStatus::Pending, 1),
            order("road", OrderStatus::OutForDelivery, 1),
            order("cooking", OrderStatus::Preparing, 1),
            order("weird", OrderStatus::Unrecognized("confirmed".to_string()), 1),
            order("pass", OrderStatus::Ready, 1),
        ];

        let sorted = live_orders(&orders, now());
        assert_eq!(
            ids(&sorted),
            vec!["pass", "cooking", "road", "done", "pending", "weird"]
        );
        assert!(sorted
            .windows(2)
            .all(|pair| status_priority(&pair[0].status) <= status_priority(&pair[1].status)));
    }

    #[test]
    fn newer_order_wins_ties() {
        let older = order("t1", OrderStatus::Ready, 30);
        let newer = order("t2", OrderStatus::Ready, 5);

        assert_eq!(ids(&live_orders(&[older, newer], now())), vec!["t2", "t1"]);
    }

    #[test]
    fn undated_orders_sort_last_within_rank() {
        let undated = Order::new("u", OrderStatus::Ready);
        let dated = order("d", OrderStatus::Ready, 90);

        assert_eq!(ids(&live_orders(&[undated, dated], now())), vec!["d", "u"]);
    }

    #[test]
    fn shuffled_mixed_orders_come_out_sorted() {
        let statuses = [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Served,
            OrderStatus::Unrecognized("cancelled".to_string()),
        ];
        let orders: Vec<Order> = (0..20)
            .map(|i| {
                order(
                    &format!("o{i}"),
                    statuses[i % statuses.len()].clone(),
                    ((i * 7) % 20) as i64,
                )
            })
            .collect();

        let sorted = live_orders(&orders, now());
        assert_eq!(sorted.len(), orders.len());

        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (rank_a, rank_b) = (status_priority(&a.status), status_priority(&b.status));
            assert!(rank_a <= rank_b, "{} before {}", a.id, b.id);
            if rank_a == rank_b {
                assert!(a.created_at() >= b.created_at(), "{} before {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn pending_and_unknown_share_the_unranked_slot() {
        assert_eq!(status_priority(&OrderStatus::Pending), PRIORITY_UNRANKED);
        assert_eq!(
            status_priority(&OrderStatus::Unrecognized("cancelled".to_string())),
            PRIORITY_UNRANKED
        );
    }

    #[test]
    fn view_attaches_timers_to_preparing_orders() {
        let mut cooking = order("cooking", OrderStatus::Preparing, 10);
        cooking.accepted_at = Some(Timestamp::from(now() - Duration::seconds(600)));
        let orders = vec![cooking, order("pass", OrderStatus::Ready, 3)];

        let mut feed = OrderFeed::new();
        feed.apply_snapshot(orders, now());
        feed.tick();

        let view = feed.view("luqma", now());
        assert_eq!(view.orders[0].order.id, "pass");
        assert_eq!(view.orders[0].remaining_seconds, None);
        assert_eq!(view.orders[1].remaining_seconds, Some(299));
        assert_eq!(view.timers.get("cooking"), Some(&299));
    }
}
