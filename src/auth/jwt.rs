/// JWT Token Generation and Validation
///
/// Compact HS256 tokens: `b64url(header).b64url(payload).b64url(hmac)`.
/// Issuance and verification are pure; the caller supplies `now`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::domain::UserIdentity;
use crate::error::{AppError, AuthError, ConfigError};

/// Signs and verifies tokens with one shared secret
#[derive(Clone)]
pub struct TokenCodec {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenCodec {
    /// Build a codec from validated settings
    ///
    /// # Errors
    /// Returns a config error if the secret is missing or shorter than
    /// 32 bytes, or a TTL is not positive
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `verify`
        validation.validate_exp = false;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(Self {
            header: Header::new(Algorithm::HS256),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: config.access_token_expiry,
            refresh_ttl: config.refresh_token_expiry,
        })
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    pub fn access_claims(&self, user: &UserIdentity, now: i64) -> Claims {
        Claims::access(user, now, self.access_ttl, &self.issuer, &self.audience)
    }

    /// Refresh claims get a fresh random `jti` so that two refresh tokens
    /// minted for one user within the same second never collide
    pub fn refresh_claims(&self, user: &UserIdentity, now: i64) -> Claims {
        Claims::refresh(
            user,
            now,
            self.refresh_ttl,
            &self.issuer,
            &self.audience,
            Uuid::new_v4().to_string(),
        )
    }

    /// Serialize and sign a claim set
    ///
    /// # Errors
    /// Returns an internal error if serialization or signing fails
    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Generate an access token for `user`, valid from `now` for the access TTL
    pub fn issue_access_token(&self, user: &UserIdentity, now: i64) -> Result<String, AppError> {
        self.sign(&self.access_claims(user, now))
    }

    /// Generate a refresh token for `user`, valid from `now` for the refresh TTL
    pub fn issue_refresh_token(&self, user: &UserIdentity, now: i64) -> Result<String, AppError> {
        self.sign(&self.refresh_claims(user, now))
    }

    /// Validate a token and extract its claims
    ///
    /// # Errors
    /// - `MalformedToken`: not three segments, bad base64url, unparseable or
    ///   incomplete payload, foreign issuer or audience
    /// - `InvalidSignature`: keyed hash mismatch or unexpected algorithm
    /// - `ExpiredToken`: signature valid but `now >= exp`
    pub fn verify(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(AuthError::MalformedToken);
        }
        // Every segment must be base64url before the signature is looked at
        if segments.iter().any(|segment| BASE64URL.decode(segment).is_err()) {
            return Err(AuthError::MalformedToken);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::MissingAlgorithm => AuthError::InvalidSignature,
                    _ => AuthError::MalformedToken,
                }
            })?;

        if claims.exp <= claims.iat {
            return Err(AuthError::MalformedToken);
        }

        if claims.is_expired_at(now) {
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims)
    }
}
