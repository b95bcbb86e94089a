//! In-process stores backed by `tokio::sync::RwLock` maps

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{RefreshTokenStore, UserStore};
use crate::domain::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome, UserIdentity};
use crate::error::DatabaseError;

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<i64, UserIdentity>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user snapshot
    pub async fn upsert(&self, user: UserIdentity) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserIdentity>, DatabaseError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, DatabaseError> {
        let mut tokens = self.tokens.write().await;

        if tokens.contains_key(&token.token) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens.token".to_string(),
            ));
        }

        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            revoked: false,
            created_at: now,
            updated_at: now,
        };

        tokens.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn mark_revoked(&self, token: &str) -> Result<RevokeOutcome, DatabaseError> {
        let mut tokens = self.tokens.write().await;

        match tokens.get_mut(token) {
            None => Ok(RevokeOutcome::NotFound),
            Some(record) if record.revoked => Ok(RevokeOutcome::AlreadyRevoked),
            Some(record) => {
                record.revoked = true;
                record.updated_at = Utc::now();
                Ok(RevokeOutcome::Revoked)
            }
        }
    }

    async fn mark_all_revoked_for_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let mut tokens = self.tokens.write().await;
        let now = Utc::now();
        let mut count = 0;

        for record in tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                record.updated_at = now;
                count += 1;
            }
        }

        Ok(count)
    }

    async fn delete_expired(&self, now: i64) -> Result<u64, DatabaseError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();

        tokens.retain(|_, record| !record.is_expired_at(now));

        Ok((before - tokens.len()) as u64)
    }
}
