use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Clock, RefreshTokenLedger, SessionService, SystemClock, TokenCodec};
use crate::configuration::{DatabaseSettings, Settings};
use crate::error::AppError;
use crate::middleware::JwtMiddleware;
use crate::routes::{current_user, health_check, logout, logout_all, refresh, validate};
use crate::store::{PgRefreshTokenStore, PgUserStore};

pub fn get_connection_pool(config: &DatabaseSettings) -> Result<PgPool, AppError> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(&config.connection_string())
        .map_err(AppError::from)
}

/// Wire the Postgres stores, codec and wall clock into a session service
pub async fn build_session_service(settings: &Settings) -> Result<SessionService, AppError> {
    let pool = get_connection_pool(&settings.database)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;

    let codec = TokenCodec::new(&settings.jwt)?;
    let ledger = RefreshTokenLedger::new(Arc::new(PgRefreshTokenStore::new(pool.clone())));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    Ok(SessionService::new(
        codec,
        ledger,
        Arc::new(PgUserStore::new(pool)),
        clock,
    ))
}

/// Periodically delete refresh tokens past their expiry
pub fn spawn_purge_task(sessions: web::Data<SessionService>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                tracing::error!(error = %e, "Failed to purge expired refresh tokens");
            }
        }
    });
}

pub fn run(
    listener: TcpListener,
    sessions: web::Data<SessionService>,
) -> Result<Server, std::io::Error> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(sessions.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            // Protected routes (require a bearer access token)
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware::new(sessions.clone()))
                    .route("/logout-all", web::post().to(logout_all))
                    .route("/validate", web::get().to(validate))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
