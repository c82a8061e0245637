use chrono::{DateTime, Utc};

use crate::models::order::{DeliveryMethod, Order, OrderStatus};

/// Whether the customer hears about `order` entering its current status.
///
/// Only statuses the customer can act on are announced, and a scheduled
/// order stays silent until its time has come.
pub fn customer_should_be_notified(order: &Order, now: DateTime<Utc>) -> bool {
    if order.scheduled_for().is_some_and(|scheduled| scheduled > now) {
        return false;
    }

    let status = &order.status;
    match order.delivery_method.as_ref() {
        Some(DeliveryMethod::Delivery) => matches!(
            status,
            OrderStatus::Pending | OrderStatus::OutForDelivery | OrderStatus::Delivered
        ),
        _ => matches!(status, OrderStatus::Pending | OrderStatus::Ready),
    }
}

/// Drivers are pinged when a delivery order starts cooking or is ready to go.
pub fn drivers_should_be_notified(previous: &OrderStatus, order: &Order) -> bool {
    previous != &order.status
        && order.is_delivery()
        && matches!(order.status, OrderStatus::Preparing | OrderStatus::Ready)
}

/// Tracks snapshot sizes to spot newly arrived orders. The first snapshot
/// only sets the baseline.
#[derive(Debug, Default)]
pub struct ArrivalTracker {
    previous: Option<usize>,
}

impl ArrivalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders that arrived since the last snapshot, if any.
    pub fn observe(&mut self, count: usize) -> Option<usize> {
        let previous = self.previous.replace(count)?;
        (count > previous).then(|| count - previous)
    }
}
