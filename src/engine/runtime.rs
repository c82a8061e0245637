use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::engine::feed::OrderFeed;
use crate::engine::notify::{customer_should_be_notified, drivers_should_be_notified, ArrivalTracker};
use crate::engine::transitions::{plan_transition, OrderAction, TransitionOptions};
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::user::Role;
use crate::state::{AppState, FeedEvent};
use crate::store::Snapshot;

/// Keeps a tenant's feed task alive while held. The task retires on the
/// first tick after the last watch is dropped.
pub struct FeedWatch {
    state: Arc<AppState>,
    tenant: String,
}

pub fn watch_feed(state: &Arc<AppState>, tenant: &str) -> FeedWatch {
    *state.feed_watchers.entry(tenant.to_string()).or_insert(0) += 1;
    ensure_feed(state, tenant);

    FeedWatch {
        state: state.clone(),
        tenant: tenant.to_string(),
    }
}

impl Drop for FeedWatch {
    fn drop(&mut self) {
        if let Some(mut count) = self.state.feed_watchers.get_mut(&self.tenant) {
            *count = count.saturating_sub(1);
        }
        self.state
            .feed_watchers
            .remove_if(&self.tenant, |_, count| *count == 0);
    }
}

pub fn watcher_count(state: &AppState, tenant: &str) -> usize {
    state
        .feed_watchers
        .get(tenant)
        .map(|count| *count)
        .unwrap_or(0)
}

/// Starts the tenant's feed task unless one is already running.
pub fn ensure_feed(state: &Arc<AppState>, tenant: &str) {
    if state.feeds.contains_key(tenant) {
        return;
    }

    if let Entry::Vacant(slot) = state.feeds.entry(tenant.to_string()) {
        let (snapshot, snapshots) = state.store.subscribe(tenant);
        let mut feed = OrderFeed::new();
        feed.apply_snapshot(snapshot.to_vec(), Utc::now());
        slot.insert(feed);

        tokio::spawn(run_feed(
            state.clone(),
            tenant.to_string(),
            snapshot.len(),
            snapshots,
        ));
        info!(tenant, orders = snapshot.len(), "feed started");
    }
}

/// Reads the tenant's feed derived from the latest snapshot. Without a
/// running feed task the timers are derived fresh for this read.
pub fn read_feed<T>(state: &AppState, tenant: &str, read: impl FnOnce(&OrderFeed) -> T) -> T {
    let snapshot = state.store.snapshot(tenant);

    if let Some(mut feed) = state.feeds.get_mut(tenant) {
        recompute(state, tenant, &mut feed, snapshot.to_vec());
        return read(&feed);
    }

    let mut feed = OrderFeed::new();
    feed.apply_snapshot(snapshot.to_vec(), Utc::now());
    state.metrics.feed_recomputes_total.inc();
    read(&feed)
}

fn recompute(state: &AppState, tenant: &str, feed: &mut OrderFeed, orders: Vec<Order>) {
    feed.apply_snapshot(orders, Utc::now());

    state.metrics.feed_recomputes_total.inc();
    state
        .metrics
        .orders_in_feed
        .with_label_values(&[tenant])
        .set(feed.orders().len() as i64);
    state
        .metrics
        .active_prep_timers
        .with_label_values(&[tenant])
        .set(feed.timers().len() as i64);
}

/// Drops the feed when nobody watches it. The check and the removal happen
/// under the feed's lock so a concurrent `watch_feed` either keeps this task
/// or starts a fresh one.
fn retire_if_unwatched(state: &AppState, tenant: &str) -> bool {
    let retired = state
        .feeds
        .remove_if(tenant, |_, _| watcher_count(state, tenant) == 0)
        .is_some();

    if retired {
        let _ = state.metrics.orders_in_feed.remove_label_values(&[tenant]);
        let _ = state.metrics.active_prep_timers.remove_label_values(&[tenant]);
    }
    retired
}

/// Owns one tenant's derived state: re-derives on every snapshot and counts
/// timers down once per tick.
pub async fn run_feed(
    state: Arc<AppState>,
    tenant: String,
    initial_orders: usize,
    mut snapshots: broadcast::Receiver<Snapshot>,
) {
    let mut arrivals = ArrivalTracker::new();
    arrivals.observe(initial_orders);

    let mut ticker = tokio::time::interval(state.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            received = snapshots.recv() => {
                let snapshot = match received {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(tenant = %tenant, skipped, "feed lagged; resyncing from store");
                        state.store.snapshot(&tenant)
                    }
                    Err(RecvError::Closed) => break,
                };
                if !on_snapshot(&state, &tenant, &mut arrivals, snapshot) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if retire_if_unwatched(&state, &tenant) {
                    break;
                }

                let timers = match state.feeds.get_mut(&tenant) {
                    Some(mut feed) => {
                        feed.tick();
                        (!feed.timers().is_empty()).then(|| feed.timers().as_map().clone())
                    }
                    None => break,
                };

                if let Some(timers) = timers {
                    let _ = state.feed_events_tx.send(FeedEvent::TimersTicked {
                        tenant: tenant.clone(),
                        timers,
                    });
                }
            }
        }
    }

    info!(tenant = %tenant, "feed stopped");
}

/// Returns false once the feed is gone.
fn on_snapshot(
    state: &AppState,
    tenant: &str,
    arrivals: &mut ArrivalTracker,
    snapshot: Snapshot,
) -> bool {
    if let Some(count) = arrivals.observe(snapshot.len()) {
        info!(tenant, count, "new orders arrived");
        let _ = state.feed_events_tx.send(FeedEvent::NewOrders {
            tenant: tenant.to_string(),
            count,
        });
    }

    let view = match state.feeds.get_mut(tenant) {
        Some(mut feed) => {
            recompute(state, tenant, &mut feed, snapshot.to_vec());
            feed.view(tenant, Utc::now())
        }
        None => return false,
    };

    let _ = state.feed_events_tx.send(FeedEvent::FeedUpdated {
        tenant: tenant.to_string(),
        feed: view,
    });
    true
}

/// The single entry point for order status changes. The transition is
/// planned against the stored order under the store's lock.
pub fn apply_action(
    state: &AppState,
    tenant: &str,
    order_id: &str,
    action: OrderAction,
    role: Role,
    options: &TransitionOptions,
) -> Result<Order, AppError> {
    let now = Utc::now();
    let result = state.store.write_order_with(tenant, order_id, |current| {
        plan_transition(current, action, role, options, now).map(|transition| transition.patch)
    });

    let outcome = if result.is_ok() { "success" } else { "rejected" };
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[action.as_str(), outcome])
        .inc();

    let order = match result {
        Ok(order) => order,
        Err(err) => {
            warn!(tenant, order_id, action = action.as_str(), error = %err, "transition rejected");
            return Err(err);
        }
    };

    let from = action.source_status();
    let event = FeedEvent::StatusChanged {
        tenant: tenant.to_string(),
        order_id: order.id.clone(),
        from: from.to_string(),
        to: order.status.to_string(),
        notify_customer: customer_should_be_notified(&order, now),
        notify_drivers: drivers_should_be_notified(&from, &order),
    };
    let _ = state.feed_events_tx.send(event);

    info!(
        tenant,
        order_id = %order.id,
        from = %from,
        to = %order.status,
        "order status changed"
    );

    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{apply_action, read_feed, watch_feed, watcher_count};
    use crate::engine::transitions::{OrderAction, TransitionOptions};
    use crate::error::AppError;
    use crate::models::order::{DeliveryMethod, Order, OrderStatus};
    use crate::models::user::Role;
    use crate::state::{AppState, FeedEvent, StateOptions};

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(StateOptions {
            bcrypt_cost: 4,
            ..StateOptions::default()
        }))
    }

    fn delivery(id: &str) -> Order {
        let mut order = Order::new(id, OrderStatus::Pending);
        order.delivery_method = Some(DeliveryMethod::Delivery);
        order
    }

    #[tokio::test]
    async fn transition_emits_status_event() {
        let state = state();
        let mut events = state.feed_events_tx.subscribe();
        state.store.insert_order("luqma", delivery("o1")).unwrap();

        let order = apply_action(
            &state,
            "luqma",
            "o1",
            OrderAction::Accept,
            Role::Employee,
            &TransitionOptions::default(),
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);

        match events.recv().await.unwrap() {
            FeedEvent::StatusChanged {
                from,
                to,
                notify_customer,
                notify_drivers,
                ..
            } => {
                assert_eq!(from, "pending");
                assert_eq!(to, "preparing");
                assert!(!notify_customer);
                assert!(notify_drivers);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_transition_leaves_the_order_alone() {
        let state = state();
        state.store.insert_order("luqma", delivery("o1")).unwrap();

        let err = apply_action(
            &state,
            "luqma",
            "o1",
            OrderAction::Deliver,
            Role::Driver,
            &TransitionOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(
            state.store.get_order("luqma", "o1").unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn read_feed_reflects_latest_write() {
        let state = state();
        state.store.insert_order("luqma", delivery("o1")).unwrap();
        apply_action(
            &state,
            "luqma",
            "o1",
            OrderAction::Accept,
            Role::Admin,
            &TransitionOptions {
                prep_time_minutes: Some(20),
            },
        )
        .unwrap();

        let remaining = read_feed(&state, "luqma", |feed| feed.timers().get("o1"));
        assert!(matches!(remaining, Some(seconds) if (1190..=1200).contains(&seconds)));
        assert!(state.feeds.is_empty());
    }

    #[tokio::test]
    async fn feed_task_retires_after_the_last_watcher_leaves() {
        let state = Arc::new(AppState::new(StateOptions {
            bcrypt_cost: 4,
            tick_interval: Duration::from_millis(10),
            ..StateOptions::default()
        }));
        state.store.register_tenant("luqma");

        let first = watch_feed(&state, "luqma");
        let second = watch_feed(&state, "luqma");
        assert_eq!(watcher_count(&state, "luqma"), 2);
        assert!(state.feeds.contains_key("luqma"));

        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.feeds.contains_key("luqma"));

        drop(second);
        assert_eq!(watcher_count(&state, "luqma"), 0);
        for _ in 0..100 {
            if !state.feeds.contains_key("luqma") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!state.feeds.contains_key("luqma"));
        assert!(state.feed_watchers.is_empty());
    }
}
