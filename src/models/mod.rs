pub mod localized;
pub mod menu;
pub mod order;
pub mod timestamp;
pub mod user;
