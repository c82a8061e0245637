use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::localized::LocalizedText;
use crate::models::timestamp::{self, Timestamp};

pub const DEFAULT_PREP_TIME_MINUTES: i64 = 15;

/// Order status as stored on the document.
///
/// Unknown strings survive as `Unrecognized` instead of failing the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Completed,
    Served,
    Unrecognized(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Served => "served",
            OrderStatus::Unrecognized(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Served
        )
    }

    /// Collapses the done synonyms for presentation.
    pub fn display(&self) -> DisplayStatus {
        match self {
            OrderStatus::Pending => DisplayStatus::Pending,
            OrderStatus::Preparing => DisplayStatus::Preparing,
            OrderStatus::Ready => DisplayStatus::Ready,
            OrderStatus::OutForDelivery => DisplayStatus::OutForDelivery,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Served => {
                DisplayStatus::Done
            }
            OrderStatus::Unrecognized(_) => DisplayStatus::Other,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => OrderStatus::Pending,
            "preparing" => OrderStatus::Preparing,
            "ready" => OrderStatus::Ready,
            "out_for_delivery" => OrderStatus::OutForDelivery,
            "delivered" => OrderStatus::Delivered,
            "completed" => OrderStatus::Completed,
            "served" => OrderStatus::Served,
            _ => OrderStatus::Unrecognized(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Preparing,
    Ready,
    OutForDelivery,
    Done,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeliveryMethod {
    Delivery,
    EatIn,
    Pickup,
    Unrecognized(String),
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &str {
        match self {
            DeliveryMethod::Delivery => "delivery",
            DeliveryMethod::EatIn => "eat_in",
            DeliveryMethod::Pickup => "pickup",
            DeliveryMethod::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for DeliveryMethod {
    fn from(value: String) -> Self {
        match value.as_str() {
            "delivery" => DeliveryMethod::Delivery,
            "eat_in" => DeliveryMethod::EatIn,
            "pickup" => DeliveryMethod::Pickup,
            _ => DeliveryMethod::Unrecognized(value),
        }
    }
}

impl From<DeliveryMethod> for String {
    fn from(value: DeliveryMethod) -> Self {
        match value {
            DeliveryMethod::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: LocalizedText,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_extras: Vec<Value>,
}

impl CartItem {
    /// Labels of the selected extras; entries without a label are skipped.
    pub fn extra_labels(&self) -> Vec<String> {
        self.selected_extras
            .iter()
            .filter_map(|extra| {
                let label = extra.get("label")?;
                let text = match label {
                    Value::String(plain) => plain.clone(),
                    other => other.get("ar").and_then(Value::as_str)?.to_string(),
                };
                (!text.is_empty()).then_some(text)
            })
            .collect()
    }

    /// One kitchen ticket line, e.g. `2x Shawarma (garlic, pickles)`.
    pub fn ticket_line(&self) -> String {
        let extras = self.extra_labels();
        let mut line = format!("{}x {}", self.quantity, self.name.primary());
        if !extras.is_empty() {
            line.push_str(&format!(" ({})", extras.join(", ")));
        }
        if let Some(options) = self.options_text.as_deref().filter(|text| !text.is_empty()) {
            line.push_str(&format!(" [{options}]"));
        }
        line
    }
}

fn default_quantity() -> u32 {
    1
}

/// One customer purchase, as held in a tenant's `orders` collection.
///
/// Fields the console does not interpret are kept in `extra` so writes never
/// drop data owned by the ordering surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparing_started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time_minutes: Option<i64>,
    #[serde(default)]
    pub cart: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_for_delivery_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    pub fn new(id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            id: id.into(),
            status,
            delivery_method: None,
            delivery_date_time: None,
            accepted_at: None,
            preparing_started_at: None,
            prep_time_minutes: None,
            cart: Vec::new(),
            created_at: None,
            name: None,
            phone: None,
            address: None,
            note: None,
            payment_method: None,
            total: None,
            ready_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            completed_at: None,
            served_at: None,
            extra: Map::new(),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp::resolve(self.created_at.as_ref())
    }

    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        timestamp::resolve(self.delivery_date_time.as_ref())
    }

    /// When preparation began: `acceptedAt`, then `preparingStartedAt`.
    pub fn preparation_started(&self) -> Option<DateTime<Utc>> {
        timestamp::resolve(self.accepted_at.as_ref())
            .or_else(|| timestamp::resolve(self.preparing_started_at.as_ref()))
    }

    pub fn prep_time_seconds(&self) -> i64 {
        self.prep_time_minutes
            .unwrap_or(DEFAULT_PREP_TIME_MINUTES)
            .max(0)
            .saturating_mul(60)
    }

    pub fn is_delivery(&self) -> bool {
        self.delivery_method == Some(DeliveryMethod::Delivery)
    }

    /// First six characters of the id, as printed on tickets.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(6) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}
