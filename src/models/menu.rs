use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::localized::LocalizedText;
use crate::models::timestamp::{self, Timestamp};

/// The tenant's menu document: categories plus meals keyed by category id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Menu {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub items: BTreeMap<String, Vec<Meal>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: LocalizedText,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unavailable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_until: Option<Timestamp>,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_available() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// How a meal is offered to customers.
///
/// `Hidden` removes the meal from the customer menu; `Unavailable` keeps it
/// listed but not orderable. Both may carry an instant after which the meal
/// is offered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { until: Option<DateTime<Utc>> },
    Hidden { until: Option<DateTime<Utc>> },
}

impl Meal {
    /// Resolves the stored flags. `available=false` wins over `unavailable`,
    /// and a `hideUntil` in the past means the meal is back on offer.
    pub fn availability(&self, now: DateTime<Utc>) -> Availability {
        let until = timestamp::resolve(self.hide_until.as_ref());
        if until.is_some_and(|until| until <= now) {
            return Availability::Available;
        }

        if !self.available {
            Availability::Hidden { until }
        } else if self.unavailable {
            Availability::Unavailable { until }
        } else {
            Availability::Available
        }
    }

    /// Writes one consistent set of flags for `availability`.
    pub fn set_availability(&mut self, availability: Availability) {
        let (available, unavailable, until) = match availability {
            Availability::Available => (true, false, None),
            Availability::Unavailable { until } => (true, true, until),
            Availability::Hidden { until } => (false, false, until),
        };

        self.available = available;
        self.unavailable = unavailable;
        self.hide_until = until.map(Timestamp::from);
    }
}
