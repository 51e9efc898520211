use std::time::Duration;

use backend_client::BackendClient;
use server::ServerState;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "channelhub={level},server={level},backend_client={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let portal = settings.portal()?;
    let backend = BackendClient::new(
        &settings.backend.base_url,
        Duration::from_secs(settings.backend.timeout_secs),
    )?;
    tracing::info!(
        backend = %backend.base_url(),
        time_zone = %portal.time_zone,
        "portal configured"
    );

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, settings.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    server::run_with_listener(ServerState::new(backend, portal), listener).await?;
    Ok(())
}
