mod auth;
mod health_check;

pub use auth::{current_user, logout, logout_all, refresh, validate};
pub use health_check::health_check;
