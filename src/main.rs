use actix_web::web;
use std::net::TcpListener;
use std::time::Duration;
use session_auth::configuration::get_configuration;
use session_auth::startup::{build_session_service, run, spawn_purge_task};
use session_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    // The signing secret has no default; refuse to start without it
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let sessions = build_session_service(&configuration).await.map_err(|e| {
        tracing::error!("Failed to initialize session service: {}", e);
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Startup error")
    })?;
    let sessions = web::Data::new(sessions);

    let purge_every = configuration.application.purge_interval_secs;
    if purge_every > 0 {
        spawn_purge_task(sessions.clone(), Duration::from_secs(purge_every));
        tracing::info!(interval_secs = purge_every, "Expired token purge scheduled");
    }

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, sessions)?;
    server.await
}
