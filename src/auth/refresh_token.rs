/// Refresh Token Ledger
///
/// Authoritative record of issued refresh tokens. A refresh token that
/// verifies cryptographically is still rejected unless its record exists,
/// is not revoked and has not reached `expires_at`. This is what makes
/// server-side logout possible for otherwise self-verifying tokens.
///
/// Record states: Active -> Revoked (explicit, one way). Expiry is derived
/// at query time from `expires_at` and never stored.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::domain::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome, UserIdentity};
use crate::error::LedgerError;
use crate::store::RefreshTokenStore;

/// Short SHA-256 prefix used to identify a token in logs
///
/// Token strings are credentials and never appear in log output.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[derive(Clone)]
pub struct RefreshTokenLedger {
    store: Arc<dyn RefreshTokenStore>,
}

impl RefreshTokenLedger {
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self { store }
    }

    /// Save a newly issued refresh token
    ///
    /// # Errors
    /// `DuplicateToken` if the token string is already recorded; the
    /// existing record is left untouched
    pub async fn record(
        &self,
        token: &str,
        user: &UserIdentity,
        expires_at: i64,
    ) -> Result<RefreshTokenRecord, LedgerError> {
        let record = self
            .store
            .insert(NewRefreshToken {
                token: token.to_string(),
                user_id: user.id,
                expires_at,
            })
            .await
            .map_err(LedgerError::from)
            .map_err(|e| {
                if e == LedgerError::DuplicateToken {
                    tracing::warn!(
                        user_id = user.id,
                        token = %token_fingerprint(token),
                        "Refresh token already recorded"
                    );
                }
                e
            })?;

        tracing::debug!(
            user_id = user.id,
            token = %token_fingerprint(token),
            expires_at = expires_at,
            "Refresh token recorded"
        );

        Ok(record)
    }

    pub async fn find(&self, token: &str) -> Result<Option<RefreshTokenRecord>, LedgerError> {
        Ok(self.store.find_by_token(token).await?)
    }

    /// Whether the token is known, not revoked and strictly before expiry
    pub async fn is_usable(&self, token: &str, now: i64) -> Result<bool, LedgerError> {
        match self.store.find_by_token(token).await? {
            None => {
                tracing::warn!(token = %token_fingerprint(token), "Refresh token not found in ledger");
                Ok(false)
            }
            Some(record) if record.is_usable_at(now) => Ok(true),
            Some(record) if record.revoked => {
                tracing::warn!(user_id = record.user_id, "Attempt to use revoked refresh token");
                Ok(false)
            }
            Some(record) => {
                tracing::info!(user_id = record.user_id, "Refresh token expired");
                Ok(false)
            }
        }
    }

    /// Revoke a single refresh token. Revoking twice is not an error.
    ///
    /// # Errors
    /// `NotFound` if the token was never recorded
    pub async fn revoke(&self, token: &str) -> Result<(), LedgerError> {
        match self.store.mark_revoked(token).await? {
            RevokeOutcome::Revoked | RevokeOutcome::AlreadyRevoked => {
                tracing::info!(token = %token_fingerprint(token), "Refresh token revoked");
                Ok(())
            }
            RevokeOutcome::NotFound => Err(LedgerError::NotFound),
        }
    }

    /// Revoke the token only if it is still active, returning whether this
    /// call performed the revocation. Used for rotation so that two
    /// concurrent refreshes with the same token cannot both succeed.
    pub async fn revoke_if_active(&self, token: &str) -> Result<bool, LedgerError> {
        Ok(self.store.mark_revoked(token).await? == RevokeOutcome::Revoked)
    }

    /// Revoke all refresh tokens for a user (logout on every device)
    pub async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, LedgerError> {
        let count = self.store.mark_all_revoked_for_user(user_id).await?;
        tracing::info!(user_id = user_id, count = count, "All refresh tokens revoked for user");
        Ok(count)
    }

    /// Delete records that expired at or before `now`
    pub async fn purge_expired(&self, now: i64) -> Result<u64, LedgerError> {
        let count = self.store.delete_expired(now).await?;
        if count > 0 {
            tracing::info!(count = count, "Expired refresh tokens purged");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{UserRole, UserStatus};
    use crate::store::InMemoryRefreshTokenStore;

    fn ledger() -> RefreshTokenLedger {
        RefreshTokenLedger::new(Arc::new(InMemoryRefreshTokenStore::new()))
    }

    fn user() -> UserIdentity {
        UserIdentity::new(42, "jdoe", "jdoe@example.com", None, None, UserRole::User, UserStatus::Active)
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = token_fingerprint("a.b.c");
        assert_eq!(a, token_fingerprint("a.b.c"));
        assert_ne!(a, token_fingerprint("a.b.d"));
        assert_eq!(a.len(), 12);
    }

    #[tokio::test]
    async fn record_starts_active() {
        let ledger = ledger();
        let record = ledger.record("tok", &user(), 2000).await.unwrap();

        assert_eq!(record.token, "tok");
        assert_eq!(record.user_id, 42);
        assert_eq!(record.expires_at, 2000);
        assert!(!record.revoked);
        assert!(ledger.is_usable("tok", 1999).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_record_is_rejected_and_first_kept() {
        let ledger = ledger();
        let first = ledger.record("tok", &user(), 2000).await.unwrap();

        let err = ledger.record("tok", &user(), 9000).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateToken);

        let stored = ledger.find("tok").await.unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn is_usable_rules() {
        let ledger = ledger();
        ledger.record("live", &user(), 2000).await.unwrap();
        ledger.record("dead", &user(), 2000).await.unwrap();
        ledger.revoke("dead").await.unwrap();

        assert!(!ledger.is_usable("unknown", 1000).await.unwrap());
        assert!(!ledger.is_usable("dead", 1000).await.unwrap());
        assert!(!ledger.is_usable("live", 2000).await.unwrap());
        assert!(!ledger.is_usable("live", 2001).await.unwrap());
        assert!(ledger.is_usable("live", 1999).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let ledger = ledger();
        ledger.record("tok", &user(), 2000).await.unwrap();

        assert!(ledger.revoke("tok").await.is_ok());
        assert!(ledger.revoke("tok").await.is_ok());
        assert!(ledger.find("tok").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn revoke_unknown_is_not_found() {
        assert_eq!(ledger().revoke("nope").await, Err(LedgerError::NotFound));
    }

    #[tokio::test]
    async fn revoke_if_active_succeeds_once() {
        let ledger = ledger();
        ledger.record("tok", &user(), 2000).await.unwrap();

        assert!(ledger.revoke_if_active("tok").await.unwrap());
        assert!(!ledger.revoke_if_active("tok").await.unwrap());
        assert!(!ledger.revoke_if_active("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_and_purge() {
        let ledger = ledger();
        ledger.record("a", &user(), 100).await.unwrap();
        ledger.record("b", &user(), 5000).await.unwrap();

        assert_eq!(ledger.revoke_all_for_user(42).await.unwrap(), 2);
        assert!(!ledger.is_usable("b", 0).await.unwrap());

        assert_eq!(ledger.purge_expired(100).await.unwrap(), 1);
        assert!(ledger.find("a").await.unwrap().is_none());
        assert!(ledger.find("b").await.unwrap().is_some());
    }
}
