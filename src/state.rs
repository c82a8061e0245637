use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::feed::{FeedView, OrderFeed};
use crate::identity::IdentityProvider;
use crate::observability::metrics::Metrics;
use crate::store::DocumentStore;

/// Events pushed to console clients over the websocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    FeedUpdated {
        tenant: String,
        feed: FeedView,
    },
    TimersTicked {
        tenant: String,
        timers: std::collections::BTreeMap<String, i64>,
    },
    NewOrders {
        tenant: String,
        count: usize,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        tenant: String,
        order_id: String,
        from: String,
        to: String,
        notify_customer: bool,
        notify_drivers: bool,
    },
}

impl FeedEvent {
    pub fn tenant(&self) -> &str {
        match self {
            FeedEvent::FeedUpdated { tenant, .. }
            | FeedEvent::TimersTicked { tenant, .. }
            | FeedEvent::NewOrders { tenant, .. }
            | FeedEvent::StatusChanged { tenant, .. } => tenant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateOptions {
    pub event_buffer_size: usize,
    pub tick_interval: Duration,
    pub bcrypt_cost: u32,
    pub menu_reopen_hour: u32,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: 1024,
            tick_interval: Duration::from_secs(1),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            menu_reopen_hour: 7,
        }
    }
}

pub struct AppState {
    pub store: DocumentStore,
    pub identity: IdentityProvider,
    pub feeds: DashMap<String, OrderFeed>,
    pub feed_watchers: DashMap<String, usize>,
    pub feed_events_tx: broadcast::Sender<FeedEvent>,
    pub metrics: Metrics,
    pub tick_interval: Duration,
    pub menu_reopen_hour: u32,
}

impl AppState {
    pub fn new(options: StateOptions) -> Self {
        let (feed_events_tx, _unused_rx) = broadcast::channel(options.event_buffer_size.max(1));

        Self {
            store: DocumentStore::new(options.event_buffer_size),
            identity: IdentityProvider::new(options.bcrypt_cost),
            feeds: DashMap::new(),
            feed_watchers: DashMap::new(),
            feed_events_tx,
            metrics: Metrics::new(),
            tick_interval: options.tick_interval,
            menu_reopen_hour: options.menu_reopen_hour,
        }
    }
}
