/// JWT Claims structure
///
/// Payload of both token kinds. Access tokens carry the user's profile
/// fields; refresh tokens carry only identity and a unique `jti`.

use serde::{Deserialize, Serialize};

use crate::domain::{UserIdentity, UserRole};

/// Token kind tag, serialized as the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims carried by every issued token
///
/// `iat` and `exp` are epoch seconds taken from the issuer's clock.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Subject (username)
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "firstName", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    /// Tokens minted without a `type` claim are access tokens
    #[serde(rename = "type", default)]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    /// Claims for an access token: identity plus profile fields
    pub fn access(user: &UserIdentity, now: i64, ttl_seconds: i64, issuer: &str, audience: &str) -> Self {
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            sub: user.username.clone(),
            user_id: user.id,
            email: Some(user.email.clone()),
            first_name: Some(user.first_name.clone().unwrap_or_default()),
            last_name: Some(user.last_name.clone().unwrap_or_default()),
            role: Some(user.role),
            kind: TokenKind::Access,
            jti: None,
            exp: now + ttl_seconds,
            iat: now,
        }
    }

    /// Claims for a refresh token: identity only, tagged with `token_id`
    pub fn refresh(
        user: &UserIdentity,
        now: i64,
        ttl_seconds: i64,
        issuer: &str,
        audience: &str,
        token_id: String,
    ) -> Self {
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            sub: user.username.clone(),
            user_id: user.id,
            email: None,
            first_name: None,
            last_name: None,
            role: None,
            kind: TokenKind::Refresh,
            jti: Some(token_id),
            exp: now + ttl_seconds,
            iat: now,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}
