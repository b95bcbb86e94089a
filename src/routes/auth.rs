/// Authentication Routes
///
/// Token renewal, logout and bearer-token introspection. Issuing the first
/// session belongs to the login flow, which lives outside this service and
/// calls `SessionService::issue_session` directly.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{Claims, SessionService};
use crate::domain::{UserIdentity, UserRole, UserStatus};
use crate::error::{AppError, ErrorContext};

/// Token refresh / logout request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Success envelope shared by every endpoint
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data,
        }
    }
}

/// User information response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl From<UserIdentity> for UserInfo {
    fn from(user: UserIdentity) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name.unwrap_or_default(),
            last_name: user.last_name.unwrap_or_default(),
            role: user.role,
            status: user.status,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new access token and a rotated refresh
/// token. The presented token is revoked.
///
/// # Errors
/// - 401: Malformed, badly signed, expired, revoked or wrong-kind token
/// - 403: Owning account is inactive
pub async fn refresh(
    form: web::Json<RefreshTokenRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let pair = sessions.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Token refreshed", pair)))
}

/// POST /auth/logout
///
/// Revoke the given refresh token. Repeating the call succeeds.
///
/// # Errors
/// - 404: Token was never issued by this service
pub async fn logout(
    form: web::Json<RefreshTokenRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout");

    sessions.logout(&form.refresh_token).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::info!(request_id = %context.request_id, "Logged out");
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Logged out", ())))
}

/// POST /auth/logout-all
///
/// Revoke every refresh token of the authenticated user.
/// **Requires valid JWT access token** in Authorization header.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let revoked = sessions.logout_all(claims.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Logged out from all devices",
        LogoutAllResponse { revoked },
    )))
}

/// GET /auth/validate
///
/// Echo the verified claims of the bearer token.
pub async fn validate(claims: web::ReqData<Claims>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok("Token is valid", claims.into_inner()))
}

/// GET /auth/me
///
/// Current authenticated user's information, read from the user store.
///
/// # Errors
/// - 401: Missing or invalid token, or the user no longer exists
pub async fn current_user(
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.current_user(&claims).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Current user", UserInfo::from(user))))
}
