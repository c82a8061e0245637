use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::order::{Order, OrderStatus};

/// Remaining prep seconds for every order currently being prepared.
///
/// Entries are created once per order and then only counted down by
/// [`PrepTimers::tick`]. An entry that reaches zero stays at zero until a
/// recompute no longer sees the order in `preparing`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepTimers {
    remaining: BTreeMap<String, i64>,
}

impl PrepTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the map with a full order snapshot.
    pub fn recompute(&mut self, orders: &[Order], now: DateTime<Utc>) {
        let preparing: BTreeMap<&str, &Order> = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Preparing && !order.id.is_empty())
            .map(|order| (order.id.as_str(), order))
            .collect();

        self.remaining
            .retain(|id, _| preparing.contains_key(id.as_str()));

        for (id, order) in preparing {
            if !self.remaining.contains_key(id) {
                self.remaining
                    .insert(id.to_string(), remaining_prep_seconds(order, now));
            }
        }
    }

    /// One elapsed second.
    pub fn tick(&mut self) {
        for seconds in self.remaining.values_mut() {
            *seconds = (*seconds - 1).max(0);
        }
    }

    pub fn get(&self, order_id: &str) -> Option<i64> {
        self.remaining.get(order_id).copied()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, i64> {
        &self.remaining
    }
}

/// `prepTimeMinutes * 60` minus the seconds since preparation started, never
/// below zero. Without a usable start time the full duration is returned.
pub fn remaining_prep_seconds(order: &Order, now: DateTime<Utc>) -> i64 {
    let total = order.prep_time_seconds();
    let Some(started) = order.preparation_started() else {
        return total;
    };

    // A start stamped ahead of this clock counts as just started.
    let elapsed = (now - started).num_seconds().max(0);
    (total - elapsed).max(0)
}
