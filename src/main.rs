use std::sync::Arc;
use std::time::Duration;

use order_console::api;
use order_console::config::Config;
use order_console::error::AppError;
use order_console::models::user::Role;
use order_console::state::{AppState, StateOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(AppState::new(StateOptions {
        event_buffer_size: config.event_buffer_size,
        tick_interval: Duration::from_millis(config.tick_interval_ms),
        bcrypt_cost: config.bcrypt_cost,
        menu_reopen_hour: config.menu_reopen_hour,
    }));

    if let Some((email, password)) = &config.bootstrap_admin {
        match shared_state
            .identity
            .create_user(email, password, Some(Role::Admin))
        {
            Ok(user) => tracing::info!(uid = %user.uid, "bootstrap admin created"),
            Err(err) => tracing::warn!(error = %err, "bootstrap admin not created"),
        }
    }

    shared_state.store.register_tenant(&config.default_tenant);

    let app = api::rest::router(shared_state.clone(), &config.static_dir);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        tenant = %config.default_tenant,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
