//! Records read or written by the token core.

mod refresh_token;
mod user;

pub use refresh_token::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome};
pub use user::{UserIdentity, UserRole, UserStatus};
