//! Postgres-backed stores
//!
//! Schema lives in `migrations/`. `refresh_tokens.token` carries a UNIQUE
//! constraint, so duplicate inserts surface as SQLSTATE 23505.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{RefreshTokenStore, UserStore};
use crate::domain::{NewRefreshToken, RefreshTokenRecord, RevokeOutcome, UserIdentity, UserRole, UserStatus};
use crate::error::DatabaseError;

type RefreshTokenRow = (i64, String, i64, i64, bool, DateTime<Utc>, DateTime<Utc>);

fn into_record(row: RefreshTokenRow) -> RefreshTokenRecord {
    let (id, token, user_id, expires_at, revoked, created_at, updated_at) = row;
    RefreshTokenRecord {
        id,
        token,
        user_id,
        expires_at,
        revoked,
        created_at,
        updated_at,
    }
}

fn revoke_outcome(updated: bool, exists: bool) -> RevokeOutcome {
    match (updated, exists) {
        (true, _) => RevokeOutcome::Revoked,
        (false, true) => RevokeOutcome::AlreadyRevoked,
        (false, false) => RevokeOutcome::NotFound,
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserIdentity>, DatabaseError> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, Option<String>, String, String)>(
            r#"
            SELECT id, username, email, first_name, last_name, role, status
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, username, email, first_name, last_name, role, status)) = row else {
            return Ok(None);
        };

        let role: UserRole = role.parse().map_err(DatabaseError::UnexpectedError)?;
        let status: UserStatus = status.parse().map_err(DatabaseError::UnexpectedError)?;

        Ok(Some(UserIdentity::new(
            id,
            &username,
            &email,
            first_name.as_deref(),
            last_name.as_deref(),
            role,
            status,
        )))
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, DatabaseError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (token, user_id, expires_at, is_revoked, created_at, updated_at)
            VALUES ($1, $2, to_timestamp($3::float8), false, now(), now())
            RETURNING id, token, user_id, EXTRACT(EPOCH FROM expires_at)::BIGINT,
                      is_revoked, created_at, updated_at
            "#,
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(into_record(row))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, token, user_id, EXTRACT(EPOCH FROM expires_at)::BIGINT,
                   is_revoked, created_at, updated_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_record))
    }

    /// Conditional update and existence check in one statement
    async fn mark_revoked(&self, token: &str) -> Result<RevokeOutcome, DatabaseError> {
        let (updated, exists) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            WITH updated AS (
                UPDATE refresh_tokens
                SET is_revoked = true, updated_at = now()
                WHERE token = $1 AND is_revoked = false
                RETURNING 1
            )
            SELECT EXISTS (SELECT 1 FROM updated),
                   EXISTS (SELECT 1 FROM refresh_tokens WHERE token = $1)
            "#,
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(revoke_outcome(updated, exists))
    }

    async fn mark_all_revoked_for_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, updated_at = now()
            WHERE user_id = $1 AND is_revoked = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= to_timestamp($1::float8)")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_outcome_mapping() {
        assert_eq!(revoke_outcome(true, true), RevokeOutcome::Revoked);
        assert_eq!(revoke_outcome(false, true), RevokeOutcome::AlreadyRevoked);
        assert_eq!(revoke_outcome(false, false), RevokeOutcome::NotFound);
    }
}
