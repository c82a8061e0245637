use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub feed_recomputes_total: IntCounter,
    pub active_prep_timers: IntGaugeVec,
    pub orders_in_feed: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order status transitions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let feed_recomputes_total = IntCounter::new(
            "feed_recomputes_total",
            "Feed derivations triggered by order snapshots",
        )
        .expect("valid feed_recomputes_total metric");

        let active_prep_timers = IntGaugeVec::new(
            Opts::new("active_prep_timers", "Orders with a running prep countdown"),
            &["tenant"],
        )
        .expect("valid active_prep_timers metric");

        let orders_in_feed = IntGaugeVec::new(
            Opts::new("orders_in_feed", "Orders in the latest snapshot per tenant"),
            &["tenant"],
        )
        .expect("valid orders_in_feed metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(feed_recomputes_total.clone()))
            .expect("register feed_recomputes_total");
        registry
            .register(Box::new(active_prep_timers.clone()))
            .expect("register active_prep_timers");
        registry
            .register(Box::new(orders_in_feed.clone()))
            .expect("register orders_in_feed");

        Self {
            registry,
            order_transitions_total,
            feed_recomputes_total,
            active_prep_timers,
            orders_in_feed,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
