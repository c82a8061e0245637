use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub tick_interval_ms: u64,
    pub default_tenant: String,
    pub menu_reopen_hour: u32,
    pub bcrypt_cost: u32,
    pub bootstrap_admin: Option<(String, String)>,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let menu_reopen_hour = parse_or_default("MENU_REOPEN_HOUR", 7)?;
        if menu_reopen_hour > 23 {
            return Err(AppError::Internal(format!(
                "invalid MENU_REOPEN_HOUR: {menu_reopen_hour} is not an hour of the day"
            )));
        }

        let tick_interval_ms = parse_or_default("TICK_INTERVAL_MS", 1000)?;
        if tick_interval_ms == 0 {
            return Err(AppError::Internal(
                "invalid TICK_INTERVAL_MS: must be > 0".to_string(),
            ));
        }

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL"),
            env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            tick_interval_ms,
            default_tenant: env::var("DEFAULT_TENANT").unwrap_or_else(|_| "luqma".to_string()),
            menu_reopen_hour,
            bcrypt_cost: parse_or_default("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            bootstrap_admin,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
