use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camera_bridge::application::session::SessionLifecycle;
use camera_bridge::application::signaling::SignalingHandler;
use camera_bridge::config::Settings;
use camera_bridge::infrastructure::driven::{GStreamerCapture, SessionRegistry, Vp8EncoderFactory, WebRtcTransport};
use camera_bridge::infrastructure::driving::create_router;
use camera_bridge::infrastructure::AppState;

const DEFAULT_LOG_FILTER: &str = "camera_bridge=info,webrtc=warn,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let settings = Settings::load()?;
    info!("Camera bridge starting");

    let capture = Arc::new(GStreamerCapture::new()?);
    let encoders = Arc::new(Vp8EncoderFactory::new()?);
    let transport = Arc::new(WebRtcTransport::new(&settings.webrtc, encoders)?);

    let registry = Arc::new(SessionRegistry::new(settings.sessions.limit()));
    match registry.limit() {
        Some(limit) => info!("Admitting up to {} concurrent sessions", limit),
        None => info!("Admitting unlimited concurrent sessions"),
    }
    let lifecycle = Arc::new(SessionLifecycle::new(transport, registry));
    let signaling = Arc::new(SignalingHandler::new(
        Arc::clone(&lifecycle),
        capture,
        settings.source_binding()?,
    ));
    info!(
        "Bridging {} at {} fps",
        signaling.source().locator,
        signaling.source().frame_rate
    );

    let state = AppState {
        signaling,
        lifecycle: Arc::clone(&lifecycle),
    };
    let app = create_router(state, &settings.server.static_dir);

    let addr = settings.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    lifecycle.close_all().await;
    info!("Camera bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, closing sessions");
}
