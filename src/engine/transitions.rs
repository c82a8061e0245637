use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::order::{DeliveryMethod, Order, OrderStatus};
use crate::models::user::Role;

const MIN_PREP_MINUTES: i64 = 1;
const MAX_PREP_MINUTES: i64 = 240;

/// A staff or driver button press. Each action maps to exactly one edge of
/// the order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Accept,
    MarkReady,
    Dispatch,
    Deliver,
    Complete,
    Serve,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Accept => "accept",
            OrderAction::MarkReady => "mark_ready",
            OrderAction::Dispatch => "dispatch",
            OrderAction::Deliver => "deliver",
            OrderAction::Complete => "complete",
            OrderAction::Serve => "serve",
        }
    }

    /// The only status this action starts from.
    pub fn source_status(&self) -> OrderStatus {
        self.rule().from
    }

    fn rule(&self) -> Rule {
        const KITCHEN: &[Role] = &[Role::Admin, Role::Employee];
        const ROAD: &[Role] = &[Role::Admin, Role::Driver];

        match self {
            OrderAction::Accept => Rule {
                from: OrderStatus::Pending,
                to: OrderStatus::Preparing,
                method: MethodRule::Any,
                roles: KITCHEN,
                stamp: "acceptedAt",
            },
            OrderAction::MarkReady => Rule {
                from: OrderStatus::Preparing,
                to: OrderStatus::Ready,
                method: MethodRule::Any,
                roles: KITCHEN,
                stamp: "readyAt",
            },
            OrderAction::Dispatch => Rule {
                from: OrderStatus::Ready,
                to: OrderStatus::OutForDelivery,
                method: MethodRule::Delivery,
                roles: ROAD,
                stamp: "outForDeliveryAt",
            },
            OrderAction::Deliver => Rule {
                from: OrderStatus::OutForDelivery,
                to: OrderStatus::Delivered,
                method: MethodRule::Delivery,
                roles: ROAD,
                stamp: "deliveredAt",
            },
            OrderAction::Complete => Rule {
                from: OrderStatus::Ready,
                to: OrderStatus::Completed,
                method: MethodRule::Pickup,
                roles: KITCHEN,
                stamp: "completedAt",
            },
            OrderAction::Serve => Rule {
                from: OrderStatus::Ready,
                to: OrderStatus::Served,
                method: MethodRule::EatIn,
                roles: KITCHEN,
                stamp: "servedAt",
            },
        }
    }
}

impl FromStr for OrderAction {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "accept" => Ok(OrderAction::Accept),
            "mark_ready" => Ok(OrderAction::MarkReady),
            "dispatch" => Ok(OrderAction::Dispatch),
            "deliver" => Ok(OrderAction::Deliver),
            "complete" => Ok(OrderAction::Complete),
            "serve" => Ok(OrderAction::Serve),
            other => Err(AppError::BadRequest(format!(
                "unknown action: {other}, expected accept/mark_ready/dispatch/deliver/complete/serve"
            ))),
        }
    }
}

enum MethodRule {
    Any,
    Delivery,
    EatIn,
    /// Anything that is neither delivered nor eaten in.
    Pickup,
}

impl MethodRule {
    fn allows(&self, method: Option<&DeliveryMethod>) -> bool {
        match self {
            MethodRule::Any => true,
            MethodRule::Delivery => method == Some(&DeliveryMethod::Delivery),
            MethodRule::EatIn => method == Some(&DeliveryMethod::EatIn),
            MethodRule::Pickup => !matches!(
                method,
                Some(DeliveryMethod::Delivery) | Some(DeliveryMethod::EatIn)
            ),
        }
    }
}

struct Rule {
    from: OrderStatus,
    to: OrderStatus,
    method: MethodRule,
    roles: &'static [Role],
    stamp: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOptions {
    pub prep_time_minutes: Option<i64>,
}

/// A validated transition and the partial document that applies it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub patch: Map<String, Value>,
}

/// Checks `action` against the lifecycle table for `order` as it is now.
pub fn plan_transition(
    order: &Order,
    action: OrderAction,
    role: Role,
    options: &TransitionOptions,
    now: DateTime<Utc>,
) -> Result<Transition, AppError> {
    let rule = action.rule();

    if !rule.roles.contains(&role) {
        return Err(AppError::Forbidden(format!(
            "role {} cannot {}",
            role.as_str(),
            action.as_str()
        )));
    }

    if order.status != rule.from {
        return Err(AppError::InvalidTransition {
            from: order.status.clone(),
            to: rule.to,
        });
    }

    if !rule.method.allows(order.delivery_method.as_ref()) {
        let method = order
            .delivery_method
            .as_ref()
            .map(DeliveryMethod::as_str)
            .unwrap_or("unspecified");
        return Err(AppError::Conflict(format!(
            "{} is not available for {method} orders",
            action.as_str()
        )));
    }

    let mut patch = Map::new();
    patch.insert("status".to_string(), Value::String(rule.to.as_str().to_string()));
    patch.insert(rule.stamp.to_string(), Value::String(now.to_rfc3339()));

    if let Some(minutes) = options.prep_time_minutes {
        if action != OrderAction::Accept {
            return Err(AppError::BadRequest(
                "prepTimeMinutes can only be set when accepting".to_string(),
            ));
        }
        if !(MIN_PREP_MINUTES..=MAX_PREP_MINUTES).contains(&minutes) {
            return Err(AppError::BadRequest(format!(
                "prepTimeMinutes must be between {MIN_PREP_MINUTES} and {MAX_PREP_MINUTES}"
            )));
        }
        patch.insert("prepTimeMinutes".to_string(), Value::from(minutes));
    }

    Ok(Transition {
        from: rule.from,
        to: rule.to,
        patch,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{plan_transition, OrderAction, TransitionOptions};
    use crate::error::AppError;
    use crate::models::order::{DeliveryMethod, Order, OrderStatus};
    use crate::models::user::Role;

    fn order(status: OrderStatus, method: DeliveryMethod) -> Order {
        let mut order = Order::new("o1", status);
        order.delivery_method = Some(method);
        order
    }

    fn plan(order: &Order, action: OrderAction, role: Role) -> Result<OrderStatus, AppError> {
        plan_transition(order, action, role, &TransitionOptions::default(), Utc::now())
            .map(|transition| transition.to)
    }

    #[test]
    fn delivery_order_walks_the_whole_lifecycle() {
        let mut current = order(OrderStatus::Pending, DeliveryMethod::Delivery);

        for (action, role, expected) in [
            (OrderAction::Accept, Role::Employee, OrderStatus::Preparing),
            (OrderAction::MarkReady, Role::Employee, OrderStatus::Ready),
            (OrderAction::Dispatch, Role::Driver, OrderStatus::OutForDelivery),
            (OrderAction::Deliver, Role::Driver, OrderStatus::Delivered),
        ] {
            let next = plan(&current, action, role).unwrap();
            assert_eq!(next, expected);
            current.status = next;
        }
    }

    #[test]
    fn pickup_and_eat_in_finish_at_the_counter() {
        let pickup = order(OrderStatus::Ready, DeliveryMethod::Pickup);
        let eat_in = order(OrderStatus::Ready, DeliveryMethod::EatIn);

        assert_eq!(
            plan(&pickup, OrderAction::Complete, Role::Employee).unwrap(),
            OrderStatus::Completed
        );
        assert_eq!(
            plan(&eat_in, OrderAction::Serve, Role::Admin).unwrap(),
            OrderStatus::Served
        );
        assert!(matches!(
            plan(&eat_in, OrderAction::Complete, Role::Admin),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            plan(&pickup, OrderAction::Dispatch, Role::Driver),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let pending = order(OrderStatus::Pending, DeliveryMethod::Delivery);

        match plan(&pending, OrderAction::MarkReady, Role::Admin) {
            Err(AppError::InvalidTransition { from, to }) => {
                assert_eq!(from, OrderStatus::Pending);
                assert_eq!(to, OrderStatus::Ready);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
    }

    #[test]
    fn terminal_orders_cannot_move() {
        let delivered = order(OrderStatus::Delivered, DeliveryMethod::Delivery);

        for action in [
            OrderAction::Accept,
            OrderAction::MarkReady,
            OrderAction::Dispatch,
            OrderAction::Deliver,
        ] {
            assert!(plan(&delivered, action, Role::Admin).is_err());
        }
    }

    #[test]
    fn drivers_cannot_touch_the_kitchen() {
        let pending = order(OrderStatus::Pending, DeliveryMethod::Delivery);
        let ready = order(OrderStatus::Ready, DeliveryMethod::Delivery);

        assert!(matches!(
            plan(&pending, OrderAction::Accept, Role::Driver),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            plan(&ready, OrderAction::Dispatch, Role::Employee),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn accept_stamps_start_and_prep_time() {
        let pending = order(OrderStatus::Pending, DeliveryMethod::Pickup);
        let options = TransitionOptions {
            prep_time_minutes: Some(25),
        };

        let transition =
            plan_transition(&pending, OrderAction::Accept, Role::Admin, &options, Utc::now())
                .unwrap();

        assert_eq!(transition.patch["status"], "preparing");
        assert_eq!(transition.patch["prepTimeMinutes"], 25);
        assert!(transition.patch["acceptedAt"].is_string());
    }

    #[test]
    fn prep_time_is_bounded() {
        let pending = order(OrderStatus::Pending, DeliveryMethod::Pickup);
        let options = TransitionOptions {
            prep_time_minutes: Some(0),
        };

        assert!(matches!(
            plan_transition(&pending, OrderAction::Accept, Role::Admin, &options, Utc::now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("mark_ready".parse::<OrderAction>().unwrap(), OrderAction::MarkReady);
        assert!("rollback".parse::<OrderAction>().is_err());
    }
}
