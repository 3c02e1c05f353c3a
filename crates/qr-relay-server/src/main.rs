use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use qr_relay_server::config::Settings;
use qr_relay_server::services::{spawn_sweeper, RelayService, UpstreamClient};
use qr_relay_server::utils::logger;
use qr_relay_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    logger::init_logger(&settings.logging)?;

    info!("🚀 Starting QR login relay...");
    info!(
        "✅ Configuration loaded (upstream: {}, ttl: {}s, cooldown: {}s)",
        settings.upstream.base_url,
        settings.relay.session_ttl_secs,
        settings.relay.qr_cooldown_secs
    );

    // Initialize services
    let upstream = Arc::new(UpstreamClient::new(settings.upstream.clone())?);
    let relay = Arc::new(RelayService::new(upstream, settings.relay.clone()));

    let _sweeper = spawn_sweeper(
        relay.clone(),
        Duration::from_secs(settings.relay.sweep_interval_secs),
    );

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let app = build_router(AppState {
        relay,
        settings: Arc::new(settings),
    });

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
