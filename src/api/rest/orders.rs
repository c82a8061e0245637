use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::api::rest::auth::{CurrentUser, ADMIN, KITCHEN, STAFF};
use crate::engine::analytics::{analytics, Analytics, AnalyticsRange};
use crate::engine::feed::FeedView;
use crate::engine::runtime::{apply_action, read_feed};
use crate::engine::transitions::{OrderAction, TransitionOptions};
use crate::engine::views::{dashboard_stats, driver_board, DashboardStats, DriverBoard};
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::user::Role;
use crate::state::AppState;

const ROAD: &[Role] = &[Role::Admin, Role::Driver];

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants/:tenant/orders", post(create_order))
        .route("/tenants/:tenant/orders/:id", get(get_order))
        .route(
            "/tenants/:tenant/orders/:id/actions/:action",
            post(order_action),
        )
        .route("/tenants/:tenant/feed", get(staff_feed))
        .route("/tenants/:tenant/driver/orders", get(driver_orders))
        .route("/tenants/:tenant/dashboard", get(dashboard))
        .route("/tenants/:tenant/analytics", get(tenant_analytics))
}

/// Ingests an order placed by a customer. The order always starts out
/// pending. Only businesses the store already knows take orders: the default
/// tenant and any tenant an admin has set up a menu for.
async fn create_order(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(mut order): Json<Order>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if !state.store.has_tenant(&tenant) {
        return Err(AppError::NotFound(format!("unknown business {tenant}")));
    }

    order.status = Default::default();
    let order = state.store.insert_order(&tenant, order)?;

    info!(tenant = %tenant, order_id = %order.id, "order received");
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, String)>,
    user: CurrentUser,
) -> Result<Json<Order>, AppError> {
    user.authorize(&tenant, STAFF)?;

    let order = state
        .store
        .get_order(&tenant, &id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order))
}

async fn order_action(
    State(state): State<Arc<AppState>>,
    Path((tenant, id, action)): Path<(String, String, String)>,
    user: CurrentUser,
    options: Option<Json<TransitionOptions>>,
) -> Result<Json<Order>, AppError> {
    let action: OrderAction = action.parse()?;
    let role = user.authorize(&tenant, STAFF)?;
    let options = options.map(|Json(options)| options).unwrap_or_default();

    let order = apply_action(&state, &tenant, &id, action, role, &options)?;
    Ok(Json(order))
}

async fn staff_feed(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
) -> Result<Json<FeedView>, AppError> {
    user.authorize(&tenant, KITCHEN)?;

    let view = read_feed(&state, &tenant, |feed| feed.view(&tenant, Utc::now()));
    Ok(Json(view))
}

async fn driver_orders(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
) -> Result<Json<DriverBoard>, AppError> {
    user.authorize(&tenant, ROAD)?;

    let board = read_feed(&state, &tenant, |feed| {
        driver_board(feed.orders(), feed.timers(), Utc::now())
    });
    Ok(Json(board))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
) -> Result<Json<DashboardStats>, AppError> {
    user.authorize(&tenant, ADMIN)?;

    let stats = read_feed(&state, &tenant, |feed| {
        dashboard_stats(feed.orders(), Utc::now())
    });
    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct AnalyticsParams {
    #[serde(default)]
    pub range: AnalyticsRange,
}

async fn tenant_analytics(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(params): Query<AnalyticsParams>,
    user: CurrentUser,
) -> Result<Json<Analytics>, AppError> {
    user.authorize(&tenant, ADMIN)?;

    let orders = state.store.snapshot(&tenant);
    Ok(Json(analytics(&orders, params.range, Utc::now())))
}
