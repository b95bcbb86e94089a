use chrono::{DateTime, Utc};

/// One issued refresh credential as held by the storage layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    /// Opaque token string, stored exactly as issued
    pub token: String,
    pub user_id: i64,
    /// Epoch seconds, copied from the token's `exp` claim
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Usable only while not revoked and strictly before expiry
    pub fn is_usable_at(&self, now: i64) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// Insert payload for the refresh token store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshToken {
    pub token: String,
    pub user_id: i64,
    pub expires_at: i64,
}

/// Result of flipping the revoked flag on a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
    NotFound,
}
