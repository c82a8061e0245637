pub mod analytics;
pub mod feed;
pub mod menu;
pub mod notify;
pub mod runtime;
pub mod timers;
pub mod transitions;
pub mod views;
