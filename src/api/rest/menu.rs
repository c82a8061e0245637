use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::rest::auth::{CurrentUser, ADMIN};
use crate::engine::menu::{
    add_meal, delete_category, delete_meal, move_meal, normalize_order, reorder_categories,
    reorder_meals, set_category_hidden, set_meal_availability, sorted_meals, update_meal,
    upsert_category, AvailabilityAction, CategoryInput,
};
use crate::error::AppError;
use crate::models::menu::{Availability, Category, Meal, Menu};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants/:tenant/menu", get(get_menu).put(replace_menu))
        .route("/tenants/:tenant/menu/normalize", post(normalize))
        .route("/tenants/:tenant/menu/category-order", put(order_categories))
        .route("/tenants/:tenant/menu/categories", post(save_category))
        .route(
            "/tenants/:tenant/menu/categories/:category",
            put(toggle_category).delete(remove_category),
        )
        .route(
            "/tenants/:tenant/menu/categories/:category/meals",
            post(create_meal),
        )
        .route(
            "/tenants/:tenant/menu/categories/:category/meal-order",
            put(order_meals),
        )
        .route(
            "/tenants/:tenant/menu/categories/:category/meals/:meal",
            put(edit_meal).delete(remove_meal),
        )
        .route(
            "/tenants/:tenant/menu/categories/:category/meals/:meal/move",
            post(relocate_meal),
        )
        .route(
            "/tenants/:tenant/menu/categories/:category/meals/:meal/availability",
            post(change_availability),
        )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealView {
    #[serde(flatten)]
    pub meal: Meal,
    pub availability: Availability,
}

#[derive(Serialize)]
pub struct MenuView {
    pub categories: Vec<Category>,
    pub items: std::collections::BTreeMap<String, Vec<MealView>>,
}

/// The menu with each category's meals in display order and their resolved
/// availability.
async fn get_menu(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> Json<MenuView> {
    let menu = state.store.menu(&tenant);
    let now = Utc::now();

    let mut categories = menu.categories.clone();
    categories.sort_by_key(|category| category.order.unwrap_or(i64::MAX));

    let items = menu
        .items
        .iter()
        .map(|(category_id, meals)| {
            let meals = sorted_meals(meals)
                .into_iter()
                .map(|meal| MealView {
                    availability: meal.availability(now),
                    meal,
                })
                .collect();
            (category_id.clone(), meals)
        })
        .collect();

    Json(MenuView { categories, items })
}

async fn replace_menu(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
    Json(menu): Json<Menu>,
) -> Result<StatusCode, AppError> {
    user.authorize(&tenant, ADMIN)?;
    state.store.put_menu(&tenant, menu);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct NormalizeResponse {
    pub updated: Vec<String>,
}

async fn normalize(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
) -> Result<Json<NormalizeResponse>, AppError> {
    user.authorize(&tenant, ADMIN)?;

    let updated = state
        .store
        .update_menu(&tenant, |menu| Ok::<_, AppError>(normalize_order(menu)))?;

    info!(tenant = %tenant, categories = updated.len(), "menu order normalized");
    Ok(Json(NormalizeResponse { updated }))
}

#[derive(Deserialize)]
pub struct OrderRequest {
    pub ids: Vec<String>,
}

async fn order_categories(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
    Json(payload): Json<OrderRequest>,
) -> Result<StatusCode, AppError> {
    user.authorize(&tenant, ADMIN)?;
    state
        .store
        .update_menu(&tenant, |menu| reorder_categories(menu, &payload.ids))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_category(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    user: CurrentUser,
    Json(payload): Json<CategoryInput>,
) -> Result<Json<Category>, AppError> {
    user.authorize(&tenant, ADMIN)?;
    let category = state
        .store
        .update_menu(&tenant, |menu| upsert_category(menu, payload))?;
    Ok(Json(category))
}

#[derive(Deserialize)]
pub struct HiddenRequest {
    pub hidden: bool,
}

async fn toggle_category(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id)): Path<(String, String)>,
    user: CurrentUser,
    Json(payload): Json<HiddenRequest>,
) -> Result<Json<Category>, AppError> {
    user.authorize(&tenant, ADMIN)?;
    let category = state.store.update_menu(&tenant, |menu| {
        set_category_hidden(menu, &category_id, payload.hidden)
    })?;
    Ok(Json(category))
}

async fn remove_category(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id)): Path<(String, String)>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    user.authorize(&tenant, ADMIN)?;
    state
        .store
        .update_menu(&tenant, |menu| delete_category(menu, &category_id))?;

    info!(tenant = %tenant, category_id = %category_id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn create_meal(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id)): Path<(String, String)>,
    user: CurrentUser,
    Json(meal): Json<Meal>,
) -> Result<(StatusCode, Json<Meal>), AppError> {
    user.authorize(&tenant, ADMIN)?;
    let meal = state
        .store
        .update_menu(&tenant, |menu| add_meal(menu, &category_id, meal, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn order_meals(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id)): Path<(String, String)>,
    user: CurrentUser,
    Json(payload): Json<OrderRequest>,
) -> Result<StatusCode, AppError> {
    user.authorize(&tenant, ADMIN)?;
    state
        .store
        .update_menu(&tenant, |menu| reorder_meals(menu, &category_id, &payload.ids))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn edit_meal(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id, meal_id)): Path<(String, String, String)>,
    user: CurrentUser,
    Json(meal): Json<Meal>,
) -> Result<Json<Meal>, AppError> {
    user.authorize(&tenant, ADMIN)?;
    let meal = state
        .store
        .update_menu(&tenant, |menu| update_meal(menu, &category_id, &meal_id, meal))?;
    Ok(Json(meal))
}

async fn remove_meal(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id, meal_id)): Path<(String, String, String)>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    user.authorize(&tenant, ADMIN)?;
    state
        .store
        .update_menu(&tenant, |menu| delete_meal(menu, &category_id, &meal_id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub to: String,
    pub position: Option<usize>,
}

async fn relocate_meal(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id, meal_id)): Path<(String, String, String)>,
    user: CurrentUser,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<Meal>, AppError> {
    user.authorize(&tenant, ADMIN)?;
    let meal = state.store.update_menu(&tenant, |menu| {
        move_meal(menu, &meal_id, &category_id, &payload.to, payload.position)
    })?;

    info!(
        tenant = %tenant,
        meal_id = %meal_id,
        from = %category_id,
        to = %payload.to,
        "meal moved"
    );
    Ok(Json(meal))
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub action: AvailabilityAction,
}

async fn change_availability(
    State(state): State<Arc<AppState>>,
    Path((tenant, category_id, meal_id)): Path<(String, String, String)>,
    user: CurrentUser,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<MealView>, AppError> {
    user.authorize(&tenant, ADMIN)?;

    let now = Utc::now();
    let reopen_hour = state.menu_reopen_hour;
    let meal = state.store.update_menu(&tenant, |menu| {
        set_meal_availability(menu, &category_id, &meal_id, payload.action, now, reopen_hour)
    })?;

    Ok(Json(MealView {
        availability: meal.availability(now),
        meal,
    }))
}
