//! Integration tests for the session_auth server

use actix_web::web;
use std::net::TcpListener;
use std::sync::Arc;
use session_auth::auth::{FixedClock, RefreshTokenLedger, SessionService, TokenCodec};
use session_auth::configuration::JwtSettings;
use session_auth::startup::run;
use session_auth::store::{InMemoryRefreshTokenStore, InMemoryUserStore};

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let settings = JwtSettings {
        secret: "health-check-secret-of-at-least-32-bytes".to_string(),
        access_token_expiry: 3600,
        refresh_token_expiry: 604800,
        issuer: "test".to_string(),
        audience: "test-api".to_string(),
    };
    let sessions = SessionService::new(
        TokenCodec::new(&settings).expect("valid settings"),
        RefreshTokenLedger::new(Arc::new(InMemoryRefreshTokenStore::new())),
        Arc::new(InMemoryUserStore::new()),
        Arc::new(FixedClock::new(1000)),
    );

    let server = run(listener, web::Data::new(sessions))
        .expect("Failed to create server");

    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let addr = spawn_app();
    let client = reqwest::Client::new();

    for path in ["/auth/me", "/auth/validate"] {
        let response = client
            .get(&format!("{}{}", addr, path))
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(401, response.status().as_u16(), "{} should require auth", path);
    }
}
