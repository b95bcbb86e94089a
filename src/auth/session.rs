/// Session issuance and renewal
///
/// Orchestrates the token codec, the refresh token ledger, the user store
/// and the clock. Every `now` used here comes from the injected clock.

use serde::Serialize;
use std::sync::Arc;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::clock::Clock;
use crate::auth::jwt::TokenCodec;
use crate::auth::refresh_token::{token_fingerprint, RefreshTokenLedger};
use crate::domain::UserIdentity;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::store::UserStore;

/// Access and refresh token pair handed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct SessionService {
    codec: TokenCodec,
    ledger: RefreshTokenLedger,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        codec: TokenCodec,
        ledger: RefreshTokenLedger,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            ledger,
            users,
            clock,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn ledger(&self) -> &RefreshTokenLedger {
        &self.ledger
    }

    /// Issue an access and refresh token for an already authenticated user
    /// and record the refresh token in the ledger
    ///
    /// Both token strings are produced before the ledger is touched, so a
    /// signing failure leaves no record behind.
    pub async fn issue_session(&self, user: &UserIdentity) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let (pair, refresh_claims) = self.mint(user, now)?;

        self.ledger
            .record(&pair.refresh_token, user, refresh_claims.exp)
            .await?;

        tracing::info!(user_id = user.id, "Session issued");
        Ok(pair)
    }

    /// Look the user up and issue a session if the account is active
    pub async fn issue_session_for(&self, user_id: i64) -> Result<TokenPair, AppError> {
        let user = self.active_user(user_id).await?;
        self.issue_session(&user).await
    }

    /// Exchange a refresh token for a new token pair (token rotation)
    ///
    /// The presented token must verify, be a refresh token, be usable in
    /// the ledger and belong to an active user. The old token is revoked
    /// and the new refresh token recorded; if another request already
    /// rotated the same token, this one fails with `RevokedToken`.
    ///
    /// Rotation fails closed: the old token is revoked before the new one
    /// is recorded, so a storage error while recording leaves the client
    /// with no usable refresh token and it must log in again.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let context = ErrorContext::new("token_refresh");
        let now = self.clock.now();

        let claims = self.codec.verify(presented, now)?;
        if claims.kind != TokenKind::Refresh {
            tracing::warn!(user_id = claims.user_id, kind = claims.kind.as_str(), "Wrong token kind for refresh");
            return Err(AuthError::WrongTokenKind.into());
        }
        let context = context.with_user_id(claims.user_id);

        if !self.ledger.is_usable(presented, now).await? {
            return Err(AuthError::RevokedToken.into());
        }

        let user = self.active_user(claims.user_id).await?;
        let (pair, refresh_claims) = self.mint(&user, now)?;

        if !self.ledger.revoke_if_active(presented).await? {
            tracing::warn!(
                request_id = %context.request_id,
                user_id = user.id,
                token = %token_fingerprint(presented),
                "Refresh token was rotated concurrently"
            );
            return Err(AuthError::RevokedToken.into());
        }

        if let Err(e) = self
            .ledger
            .record(&pair.refresh_token, &user, refresh_claims.exp)
            .await
        {
            let e = AppError::from(e);
            context.log_error(&e);
            return Err(e);
        }

        tracing::info!(
            request_id = %context.request_id,
            user_id = user.id,
            "Token refreshed successfully"
        );
        Ok(pair)
    }

    /// Revoke one refresh token (logout)
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        self.ledger.revoke(refresh_token).await?;
        Ok(())
    }

    /// Revoke every refresh token the user holds
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, AppError> {
        Ok(self.ledger.revoke_all_for_user(user_id).await?)
    }

    /// Verify a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.verify(access_token, self.clock.now())?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(claims)
    }

    /// Current snapshot of the user an access token was issued to
    pub async fn current_user(&self, claims: &Claims) -> Result<UserIdentity, AppError> {
        self.users
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| AuthError::UnknownSubject.into())
    }

    /// Garbage-collect refresh token records past their expiry
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        Ok(self.ledger.purge_expired(self.clock.now()).await?)
    }

    fn mint(&self, user: &UserIdentity, now: i64) -> Result<(TokenPair, Claims), AppError> {
        let access_token = self.codec.issue_access_token(user, now)?;
        let refresh_claims = self.codec.refresh_claims(user, now);
        let refresh_token = self.codec.sign(&refresh_claims)?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl(),
        };
        Ok((pair, refresh_claims))
    }

    async fn active_user(&self, user_id: i64) -> Result<UserIdentity, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnknownSubject)?;

        if !user.is_active() {
            tracing::warn!(user_id = user_id, status = user.status.as_str(), "Inactive account");
            return Err(AuthError::AccountInactive.into());
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::FixedClock;
    use crate::configuration::JwtSettings;
    use crate::domain::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome, UserRole, UserStatus};
    use crate::error::{DatabaseError, LedgerError};
    use crate::store::{InMemoryRefreshTokenStore, InMemoryUserStore, RefreshTokenStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to the in-memory store; inserts fail once `fail_inserts` is set
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryRefreshTokenStore,
        fail_inserts: AtomicBool,
    }

    #[async_trait]
    impl RefreshTokenStore for FlakyStore {
        async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, DatabaseError> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(DatabaseError::ConnectionPool("connection reset".to_string()));
            }
            self.inner.insert(token).await
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
            self.inner.find_by_token(token).await
        }

        async fn mark_revoked(&self, token: &str) -> Result<RevokeOutcome, DatabaseError> {
            self.inner.mark_revoked(token).await
        }

        async fn mark_all_revoked_for_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
            self.inner.mark_all_revoked_for_user(user_id).await
        }

        async fn delete_expired(&self, now: i64) -> Result<u64, DatabaseError> {
            self.inner.delete_expired(now).await
        }
    }

    struct Harness {
        service: SessionService,
        clock: Arc<FixedClock>,
        users: InMemoryUserStore,
    }

    async fn harness() -> Harness {
        let settings = JwtSettings {
            secret: "session-test-secret-with-at-least-32-bytes".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
            audience: "test-api".to_string(),
        };
        let clock = Arc::new(FixedClock::new(1000));
        let users = InMemoryUserStore::new();
        users.upsert(jdoe()).await;

        let service = SessionService::new(
            TokenCodec::new(&settings).unwrap(),
            RefreshTokenLedger::new(Arc::new(InMemoryRefreshTokenStore::new())),
            Arc::new(users.clone()),
            clock.clone(),
        );

        Harness {
            service,
            clock,
            users,
        }
    }

    fn jdoe() -> UserIdentity {
        UserIdentity::new(
            42,
            "jdoe",
            "jdoe@example.com",
            Some("John"),
            Some("Doe"),
            UserRole::User,
            UserStatus::Active,
        )
    }

    #[tokio::test]
    async fn issue_session_at_fixed_time() {
        let h = harness().await;
        let pair = h.service.issue_session(&jdoe()).await.unwrap();

        let access = h.service.codec().verify(&pair.access_token, 1000).unwrap();
        assert_eq!(access.exp, 4600);
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.role, Some(UserRole::User));

        let refresh = h.service.codec().verify(&pair.refresh_token, 1000).unwrap();
        assert_eq!(refresh.exp, 605800);
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert!(refresh.email.is_none() && refresh.role.is_none());

        let record = h.service.ledger().find(&pair.refresh_token).await.unwrap().unwrap();
        assert_eq!(record.expires_at, 605800);
        assert_eq!(record.user_id, 42);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);
    }

    #[tokio::test]
    async fn refresh_rotates_the_token() {
        let h = harness().await;
        let first = h.service.issue_session_for(42).await.unwrap();

        h.clock.advance(60);
        let second = h.service.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        let access = h.service.authenticate(&second.access_token).unwrap();
        assert_eq!(access.iat, 1060);

        let old = h.service.ledger().find(&first.refresh_token).await.unwrap().unwrap();
        assert!(old.revoked);

        let reuse = h.service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(reuse, AppError::Auth(AuthError::RevokedToken)));
    }

    #[tokio::test]
    async fn logged_out_token_cannot_refresh() {
        let h = harness().await;
        let pair = h.service.issue_session(&jdoe()).await.unwrap();

        h.service.logout(&pair.refresh_token).await.unwrap();
        h.service.logout(&pair.refresh_token).await.unwrap();

        let err = h.service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::RevokedToken)));
    }

    #[tokio::test]
    async fn signed_but_unrecorded_refresh_token_is_rejected() {
        let h = harness().await;
        let token = h.service.codec().issue_refresh_token(&jdoe(), 1000).unwrap();

        let err = h.service.refresh(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::RevokedToken)));
    }

    #[tokio::test]
    async fn access_token_cannot_refresh_and_refresh_cannot_authenticate() {
        let h = harness().await;
        let pair = h.service.issue_session(&jdoe()).await.unwrap();

        let err = h.service.refresh(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::WrongTokenKind)));

        assert_eq!(
            h.service.authenticate(&pair.refresh_token),
            Err(AuthError::WrongTokenKind)
        );
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let h = harness().await;
        let pair = h.service.issue_session(&jdoe()).await.unwrap();

        h.clock.set(605799);
        assert!(h.service.ledger().is_usable(&pair.refresh_token, 605799).await.unwrap());
        assert!(h.service.codec().verify(&pair.refresh_token, 605799).is_ok());

        h.clock.set(605800);
        let err = h.service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::ExpiredToken)));
    }

    #[tokio::test]
    async fn inactive_user_cannot_refresh() {
        let h = harness().await;
        let pair = h.service.issue_session(&jdoe()).await.unwrap();

        let mut suspended = jdoe();
        suspended.status = UserStatus::Suspended;
        h.users.upsert(suspended).await;

        let err = h.service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountInactive)));
        assert!(h.service.ledger().is_usable(&pair.refresh_token, 1000).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_cannot_get_a_session() {
        let h = harness().await;
        let err = h.service.issue_session_for(7).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::UnknownSubject)));
    }

    #[tokio::test]
    async fn logout_unknown_token_is_not_found() {
        let h = harness().await;
        let err = h.service.logout("a.b.c").await.unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::NotFound)));
    }

    #[tokio::test]
    async fn logout_all_revokes_every_session() {
        let h = harness().await;
        let a = h.service.issue_session(&jdoe()).await.unwrap();
        let b = h.service.issue_session(&jdoe()).await.unwrap();

        assert_eq!(h.service.logout_all(42).await.unwrap(), 2);
        assert!(!h.service.ledger().is_usable(&a.refresh_token, 1000).await.unwrap());
        assert!(!h.service.ledger().is_usable(&b.refresh_token, 1000).await.unwrap());
    }

    #[tokio::test]
    async fn purge_uses_the_injected_clock() {
        let h = harness().await;
        h.service.issue_session(&jdoe()).await.unwrap();

        assert_eq!(h.service.purge_expired().await.unwrap(), 0);
        h.clock.set(605799);
        assert_eq!(h.service.purge_expired().await.unwrap(), 0);
        h.clock.set(605800);
        assert_eq!(h.service.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rotation_fails_closed_when_recording_fails() {
        let h = harness().await;
        let store = Arc::new(FlakyStore::default());
        let service = SessionService::new(
            h.service.codec().clone(),
            RefreshTokenLedger::new(store.clone()),
            Arc::new(h.users.clone()),
            h.clock.clone(),
        );
        let pair = service.issue_session(&jdoe()).await.unwrap();

        store.fail_inserts.store(true, Ordering::SeqCst);
        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::Storage(_))));

        assert!(!service.ledger().is_usable(&pair.refresh_token, 1000).await.unwrap());
        let again = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(again, AppError::Auth(AuthError::RevokedToken)));
    }
}
