//! Tenant-scoped document store.
//!
//! Stands in for the hosted database: each tenant owns an `orders`
//! collection and one menu document. Every order write publishes the full
//! collection to subscribers, matching the snapshot-per-change contract the
//! feed runtime consumes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::menu::Menu;
use crate::models::order::Order;
use crate::models::timestamp::Timestamp;

pub type Snapshot = Arc<Vec<Order>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {0} already exists")]
    DuplicateOrder(String),

    #[error("write produced an invalid document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::DuplicateOrder(_) => AppError::Conflict(err.to_string()),
            StoreError::InvalidDocument(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

struct Tenant {
    orders: BTreeMap<String, Order>,
    menu: Menu,
    snapshots: broadcast::Sender<Snapshot>,
}

impl Tenant {
    fn new(buffer: usize) -> Self {
        let (snapshots, _unused_rx) = broadcast::channel(buffer);
        Self {
            orders: BTreeMap::new(),
            menu: Menu::default(),
            snapshots,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Arc::new(self.orders.values().cloned().collect())
    }

    fn publish(&self) {
        // No subscribers is fine; the next subscriber reads current state.
        let _ = self.snapshots.send(self.snapshot());
    }
}

pub struct DocumentStore {
    tenants: DashMap<String, Tenant>,
    buffer: usize,
}

impl DocumentStore {
    pub fn new(buffer: usize) -> Self {
        Self {
            tenants: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    fn tenant(&self, tenant: &str) -> dashmap::mapref::one::RefMut<'_, String, Tenant> {
        self.tenants
            .entry(tenant.to_string())
            .or_insert_with(|| Tenant::new(self.buffer))
    }

    /// Makes a tenant known so customers may place orders with it.
    pub fn register_tenant(&self, tenant: &str) {
        self.tenant(tenant);
    }

    pub fn has_tenant(&self, tenant: &str) -> bool {
        self.tenants.contains_key(tenant)
    }

    /// Subscribes to full-collection snapshots and returns the current one.
    pub fn subscribe(&self, tenant: &str) -> (Snapshot, broadcast::Receiver<Snapshot>) {
        let entry = self.tenant(tenant);
        (entry.snapshot(), entry.snapshots.subscribe())
    }

    pub fn snapshot(&self, tenant: &str) -> Snapshot {
        self.tenants
            .get(tenant)
            .map(|entry| entry.snapshot())
            .unwrap_or_default()
    }

    pub fn get_order(&self, tenant: &str, id: &str) -> Option<Order> {
        self.tenants
            .get(tenant)
            .and_then(|entry| entry.orders.get(id).cloned())
    }

    /// Inserts a new order, assigning an id and `createdAt` when missing.
    pub fn insert_order(&self, tenant: &str, mut order: Order) -> Result<Order, StoreError> {
        if order.id.trim().is_empty() {
            order.id = Uuid::new_v4().simple().to_string();
        }
        if order.created_at.is_none() {
            order.created_at = Some(Timestamp::from(Utc::now()));
        }

        let mut entry = self.tenant(tenant);
        if entry.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        entry.orders.insert(order.id.clone(), order.clone());
        entry.publish();

        debug!(tenant, order_id = %order.id, "order inserted");
        Ok(order)
    }

    /// Merges a partial document into an order.
    pub fn write_order(
        &self,
        tenant: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Order, StoreError> {
        self.write_order_with(tenant, id, |_| Ok::<_, StoreError>(patch))
    }

    /// Builds the patch from the order's current state and applies it while
    /// the tenant is locked, so concurrent writers see each other's result.
    pub fn write_order_with<F, E>(&self, tenant: &str, id: &str, build: F) -> Result<Order, E>
    where
        F: FnOnce(&Order) -> Result<Map<String, Value>, E>,
        E: From<StoreError>,
    {
        let mut entry = self.tenant(tenant);
        let current = entry
            .orders
            .get(id)
            .ok_or_else(|| StoreError::OrderNotFound(id.to_string()))?;

        let patch = build(current)?;
        let updated = merge_patch(current, patch)?;
        entry.orders.insert(id.to_string(), updated.clone());
        entry.publish();

        debug!(tenant, order_id = id, "order written");
        Ok(updated)
    }

    pub fn menu(&self, tenant: &str) -> Menu {
        self.tenants
            .get(tenant)
            .map(|entry| entry.menu.clone())
            .unwrap_or_default()
    }

    pub fn put_menu(&self, tenant: &str, menu: Menu) {
        self.tenant(tenant).menu = menu;
        debug!(tenant, "menu replaced");
    }

    /// Edits the menu document atomically. The edit runs on a copy and is
    /// only stored when it succeeds.
    pub fn update_menu<T, E, F>(&self, tenant: &str, edit: F) -> Result<T, E>
    where
        F: FnOnce(&mut Menu) -> Result<T, E>,
    {
        let mut entry = self.tenant(tenant);
        let mut draft = entry.menu.clone();
        let result = edit(&mut draft)?;
        entry.menu = draft;
        Ok(result)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    pub fn order_count(&self) -> usize {
        self.tenants.iter().map(|entry| entry.orders.len()).sum()
    }
}

fn merge_patch(current: &Order, patch: Map<String, Value>) -> Result<Order, StoreError> {
    let mut document = serde_json::to_value(current)?;
    if let Value::Object(fields) = &mut document {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            fields.insert(key, value);
        }
    }
    Ok(serde_json::from_value(document)?)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{DocumentStore, StoreError};
    use crate::models::order::{Order, OrderStatus};

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn insert_assigns_id_and_creation_time() {
        let store = DocumentStore::new(16);
        let order = store
            .insert_order("luqma", Order::new("", OrderStatus::Pending))
            .unwrap();

        assert_eq!(order.id.len(), 32);
        assert!(order.created_at().is_some());
        assert_eq!(store.snapshot("luqma").len(), 1);
        assert!(store.snapshot("other").is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = DocumentStore::new(16);
        store
            .insert_order("luqma", Order::new("a", OrderStatus::Pending))
            .unwrap();

        assert!(matches!(
            store.insert_order("luqma", Order::new("a", OrderStatus::Ready)),
            Err(StoreError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn partial_write_keeps_other_fields() {
        let store = DocumentStore::new(16);
        let mut order = Order::new("a", OrderStatus::Pending);
        order.phone = Some("0500000000".to_string());
        order.extra.insert("tableNumber".to_string(), json!(7));
        store.insert_order("luqma", order).unwrap();

        let updated = store
            .write_order("luqma", "a", patch(json!({ "status": "preparing", "id": "hijack" })))
            .unwrap();

        assert_eq!(updated.id, "a");
        assert_eq!(updated.status, OrderStatus::Preparing);
        assert_eq!(updated.phone.as_deref(), Some("0500000000"));
        assert_eq!(updated.extra["tableNumber"], 7);
    }

    #[test]
    fn writes_publish_snapshots() {
        let store = DocumentStore::new(16);
        let (initial, mut rx) = store.subscribe("luqma");
        assert!(initial.is_empty());

        store
            .insert_order("luqma", Order::new("a", OrderStatus::Pending))
            .unwrap();
        store
            .write_order("luqma", "a", patch(json!({ "status": "preparing" })))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap().len(), 1);
        assert_eq!(rx.try_recv().unwrap()[0].status, OrderStatus::Preparing);
    }

    #[test]
    fn failed_menu_edit_is_discarded() {
        let store = DocumentStore::new(16);
        let result: Result<(), &str> = store.update_menu("luqma", |menu| {
            menu.items.insert("mains".to_string(), Vec::new());
            Err("nope")
        });

        assert!(result.is_err());
        assert!(store.menu("luqma").items.is_empty());
    }

    #[test]
    fn missing_order_write_fails() {
        let store = DocumentStore::new(16);
        assert!(matches!(
            store.write_order("luqma", "ghost", Map::new()),
            Err(StoreError::OrderNotFound(_))
        ));
    }
}
