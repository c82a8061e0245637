use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Claims, Role, Session};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/admin/users", post(create_user))
        .route("/admin/claims", post(set_claims).delete(remove_claims))
}

/// The session behind the request's bearer token.
pub struct CurrentUser(pub Session);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let raw = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("expected a bearer token".to_string()))?;

        session_for_token(state, raw).map(CurrentUser)
    }
}

pub fn session_for_token(state: &AppState, raw: &str) -> Result<Session, AppError> {
    let token = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized("malformed token".to_string()))?;

    state
        .identity
        .session(&token)
        .ok_or_else(|| AppError::Unauthorized("session expired or revoked".to_string()))
}

/// Role of `session` on `tenant`, if it is one of `allowed`.
pub fn authorize(session: &Session, tenant: &str, allowed: &[Role]) -> Result<Role, AppError> {
    let role = session
        .role
        .ok_or_else(|| AppError::Forbidden("this account has no role assigned".to_string()))?;

    if !session.can_access(tenant) {
        return Err(AppError::Forbidden(format!("no access to business {tenant}")));
    }
    if !allowed.contains(&role) {
        return Err(AppError::Forbidden(format!(
            "role {} is not allowed here",
            role.as_str()
        )));
    }

    Ok(role)
}

impl CurrentUser {
    pub fn authorize(&self, tenant: &str, allowed: &[Role]) -> Result<Role, AppError> {
        authorize(&self.0, tenant, allowed)
    }
}

pub const STAFF: &[Role] = &[Role::Admin, Role::Employee, Role::Driver];
pub const KITCHEN: &[Role] = &[Role::Admin, Role::Employee];
pub const ADMIN: &[Role] = &[Role::Admin];

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<Session>, AppError> {
    let session =
        blocking(move || state.identity.sign_in(&payload.email, &payload.password)).await?;
    Ok(Json(session))
}

/// Runs bcrypt work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Internal(format!("blocking task failed: {err}")))?
}

async fn sign_out(State(state): State<Arc<AppState>>, user: CurrentUser) -> StatusCode {
    state.identity.sign_out(&user.0.token);
    info!(uid = %user.0.uid, "signed out");
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
    pub business_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub uid: Uuid,
    pub email: String,
    pub role: Option<Role>,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    require_admin(&user)?;
    let claims = new_user_claims(&user.0, payload.business_id.as_deref())?;

    let record = blocking(move || {
        state.identity.create_user_with_claims(
            &payload.email,
            &payload.password,
            payload.role,
            claims,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            uid: record.uid,
            email: record.email,
            role: record.role,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsRequest {
    pub email: String,
    pub business_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

async fn set_claims(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<ClaimsRequest>,
) -> Result<Json<Claims>, AppError> {
    user.authorize(&payload.business_id, ADMIN)?;

    let claims = state
        .identity
        .set_custom_claims(&payload.email, &payload.business_id, &payload.roles)?;
    Ok(Json(claims))
}

async fn remove_claims(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<ClaimsRequest>,
) -> Result<Json<Claims>, AppError> {
    user.authorize(&payload.business_id, ADMIN)?;

    let claims = state
        .identity
        .remove_business_claims(&payload.email, &payload.business_id)?;
    Ok(Json(claims))
}

/// Claims for an account created by `creator`. Scoped admins can only
/// create accounts inside one of their own businesses.
pub fn new_user_claims(creator: &Session, business_id: Option<&str>) -> Result<Claims, AppError> {
    match (creator.business_ids.as_deref(), business_id) {
        (_, Some(business_id)) => {
            authorize(creator, business_id, ADMIN)?;
            Ok(Claims::scoped_to(business_id))
        }
        (None, None) => Ok(Claims::default()),
        (Some([only]), None) => Ok(Claims::scoped_to(only)),
        (Some(_), None) => Err(AppError::BadRequest(
            "businessId is required for this account".to_string(),
        )),
    }
}

fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    match user.0.role {
        Some(Role::Admin) => Ok(()),
        Some(role) => Err(AppError::Forbidden(format!(
            "role {} cannot manage users",
            role.as_str()
        ))),
        None => Err(AppError::Forbidden(
            "this account has no role assigned".to_string(),
        )),
    }
}
