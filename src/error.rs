/// Error Handling Module
///
/// One error type per concern, unified under `AppError`:
/// 1. Token verification failures (`AuthError`)
/// 2. Refresh token ledger failures (`LedgerError`)
/// 3. Storage collaborator failures (`DatabaseError`)
/// 4. Configuration failures (`ConfigError`)
/// 5. HTTP response mapping with structured error logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Token authentication errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong segment count, bad base64url, or a payload missing required claims
    MalformedToken,
    /// Keyed hash does not match the header and payload
    InvalidSignature,
    ExpiredToken,
    /// The ledger no longer considers the refresh token usable
    RevokedToken,
    /// An access token was presented where a refresh token was expected, or vice versa
    WrongTokenKind,
    MissingToken,
    /// The token names a user the user store does not know
    UnknownSubject,
    AccountInactive,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MalformedToken => write!(f, "Malformed token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::RevokedToken => write!(f, "Token has been revoked"),
            AuthError::WrongTokenKind => write!(f, "Wrong token type"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::UnknownSubject => write!(f, "Token subject does not exist"),
            AuthError::AccountInactive => write!(f, "Account is inactive"),
        }
    }
}

impl StdError for AuthError {}

/// Storage operation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                DatabaseError::UniqueConstraintViolation(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            sqlx::Error::Database(_) | sqlx::Error::ColumnDecode { .. } => {
                DatabaseError::QueryExecution(err.to_string())
            }
            _ => DatabaseError::UnexpectedError(err.to_string()),
        }
    }
}

/// Refresh token ledger errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The token string is already recorded
    DuplicateToken,
    /// No record exists for the token string
    NotFound,
    Storage(DatabaseError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::DuplicateToken => write!(f, "Refresh token already recorded"),
            LedgerError::NotFound => write!(f, "Refresh token not found"),
            LedgerError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for LedgerError {}

impl From<DatabaseError> for LedgerError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueConstraintViolation(_) => LedgerError::DuplicateToken,
            other => LedgerError::Storage(other),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingRequired(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Auth(AuthError),
    Ledger(LedgerError),
    Database(DatabaseError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Ledger(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.into())
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

fn database_status(e: &DatabaseError) -> (StatusCode, &'static str, String) {
    match e {
        DatabaseError::UniqueConstraintViolation(_) => {
            (StatusCode::CONFLICT, "DUPLICATE_ENTRY", e.to_string())
        }
        DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
        DatabaseError::ConnectionPool(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database service temporarily unavailable".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "DATABASE_ERROR",
            "Database error occurred".to_string(),
        ),
    }
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            // Malformed and badly signed tokens look the same from outside
            AppError::Auth(e) => match e {
                AuthError::MalformedToken
                | AuthError::InvalidSignature
                | AuthError::WrongTokenKind
                | AuthError::UnknownSubject => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID",
                    "Invalid token".to_string(),
                ),
                AuthError::ExpiredToken => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_EXPIRED",
                    "Token has expired".to_string(),
                ),
                AuthError::RevokedToken => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_REVOKED",
                    "Token has been revoked".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Missing authentication token".to_string(),
                ),
                AuthError::AccountInactive => (
                    StatusCode::FORBIDDEN,
                    "ACCOUNT_INACTIVE",
                    "Account is inactive".to_string(),
                ),
            },

            AppError::Ledger(e) => match e {
                LedgerError::DuplicateToken => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_TOKEN",
                    "Refresh token already recorded".to_string(),
                ),
                LedgerError::NotFound => (
                    StatusCode::NOT_FOUND,
                    "TOKEN_NOT_FOUND",
                    "Refresh token not found".to_string(),
                ),
                LedgerError::Storage(db) => database_status(db),
            },

            AppError::Database(e) => database_status(e),

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Authentication error"
                );
            }
            AppError::Ledger(LedgerError::Storage(e)) | AppError::Database(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Database error"
                );
            }
            AppError::Ledger(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Refresh token ledger error"
                );
            }
            AppError::Config(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Configuration error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for correlating log lines of one operation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<i64>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Auth(_) | AppError::Ledger(LedgerError::DuplicateToken | LedgerError::NotFound) => {
                tracing::warn!(
                    error = %error,
                    context = ?context,
                    "Token operation rejected"
                );
            }
            _ => {
                tracing::error!(
                    error = %error,
                    context = ?context,
                    "Token operation failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_and_bad_signature_are_indistinguishable_externally() {
        let malformed = AppError::Auth(AuthError::MalformedToken);
        let bad_sig = AppError::Auth(AuthError::InvalidSignature);

        let (status_a, body_a) = ErrorHandler::error_response(&malformed, "req-1");
        let (status_b, body_b) = ErrorHandler::error_response(&bad_sig, "req-1");

        assert_eq!(status_a, status_b);
        assert_eq!(body_a.code, body_b.code);
        assert_eq!(body_a.message, body_b.message);
        assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_and_revoked_have_their_own_codes() {
        let (_, expired) = ErrorHandler::error_response(&AppError::Auth(AuthError::ExpiredToken), "r");
        let (_, revoked) = ErrorHandler::error_response(&AppError::Auth(AuthError::RevokedToken), "r");

        assert_eq!(expired.code, "TOKEN_EXPIRED");
        assert_eq!(revoked.code, "TOKEN_REVOKED");
    }

    #[test]
    fn ledger_errors_map_to_conflict_and_not_found() {
        assert_eq!(
            AppError::Ledger(LedgerError::DuplicateToken).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Ledger(LedgerError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Auth(AuthError::AccountInactive).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn unique_violation_becomes_duplicate_token() {
        let err: LedgerError =
            DatabaseError::UniqueConstraintViolation("refresh_tokens_token_key".to_string()).into();
        assert_eq!(err, LedgerError::DuplicateToken);

        let err: LedgerError = DatabaseError::QueryExecution("boom".to_string()).into();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn error_context_carries_user() {
        let ctx = ErrorContext::new("token_refresh");
        assert_eq!(ctx.operation, "token_refresh");
        assert!(ctx.user_id.is_none());

        let ctx = ctx.with_user_id(42);
        assert_eq!(ctx.user_id, Some(42));
    }
}
