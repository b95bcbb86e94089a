//! Storage collaborators for user snapshots and refresh token records.
//!
//! The token core only talks to these traits. `postgres` holds the sqlx
//! implementations, `memory` the in-process ones used by tests.

use async_trait::async_trait;

use crate::domain::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome, UserIdentity};
use crate::error::DatabaseError;

mod memory;
mod postgres;

pub use memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
pub use postgres::{PgRefreshTokenStore, PgUserStore};

/// Read-only access to user snapshots keyed by identifier
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserIdentity>, DatabaseError>;
}

/// Durable refresh token records keyed by token string
///
/// Implementations must enforce uniqueness of the token string atomically
/// and report a clash as `DatabaseError::UniqueConstraintViolation`.
/// Revocation is a single-row update.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a new, unrevoked record. Storage assigns id and audit timestamps.
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, DatabaseError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError>;

    /// Set `revoked = true`, reporting whether this call performed the flip
    async fn mark_revoked(&self, token: &str) -> Result<RevokeOutcome, DatabaseError>;

    /// Revoke every active record owned by the user, returning how many flipped
    async fn mark_all_revoked_for_user(&self, user_id: i64) -> Result<u64, DatabaseError>;

    /// Delete records whose `expires_at <= now`, returning how many were removed
    async fn delete_expired(&self, now: i64) -> Result<u64, DatabaseError>;
}
