//! Exhibit Kiosk - detection relay and display engine
//!
//! Main entry point. Always runs the relay (MQTT ingest + push channel);
//! runs the kiosk engine in the same process when KIOSK_ENABLED is set.

use exhibit_kiosk::{
    batch_window::BatchWindow,
    event_adapter::EventAdapter,
    event_hub::EventHub,
    kiosk::{self, KioskEngine},
    light::LightTrigger,
    mqtt_ingest::MqttIngest,
    narration::{NarrationPlayer, NarrationScript},
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exhibit_kiosk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Exhibit Kiosk v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        mqtt_url = %config.mqtt_url,
        topics = ?config.mqtt_topics,
        batch_size = config.batch_size,
        kiosk_enabled = config.kiosk_enabled,
        "Configuration loaded"
    );

    // Initialize relay components
    let hub = Arc::new(EventHub::new());
    let adapter = Arc::new(EventAdapter::new(
        config.allowed_classes.clone(),
        config.min_confidence,
        config.recent_ids_max,
    ));
    tracing::info!("EventAdapter initialized");

    let ingest = MqttIngest::new(
        config.mqtt_url.clone(),
        config.mqtt_topics.clone(),
        adapter,
        hub.clone(),
    );
    let _ingest_task = ingest.start()?;
    tracing::info!("MqttIngest started");

    // Kiosk engine (stream client + window + renderer + narration)
    if config.kiosk_enabled {
        let (window, snapshots, clears) = BatchWindow::new(
            config.batch_size,
            config.pause_before_clear,
            config.clear_anim,
        );

        let light = Arc::new(LightTrigger::new(config.light_url.clone()));
        let _light_task = light.start(clears);
        tracing::info!(url = %config.light_url, "LightTrigger started");

        let narration_rx = match NarrationScript::load(&config.narration_path).await {
            Ok(script) => {
                let (_handle, rx) = NarrationPlayer::new(script).start();
                rx
            }
            Err(e) => {
                tracing::warn!(
                    path = %config.narration_path.display(),
                    error = %e,
                    "Failed to load narration, player idle"
                );
                let (_tx, rx) = tokio::sync::watch::channel(String::new());
                rx
            }
        };

        let (engine, status_rx) = KioskEngine::new(config.stream_url.clone(), window.clone());
        let _stream_task = engine.start();
        let _render_task = kiosk::start_render_loop(snapshots, narration_rx, status_rx);
        tracing::info!(url = %config.stream_url, "Kiosk engine started");
    }

    // Create application state and router
    let state = AppState {
        config: config.clone(),
        hub,
    };

    let app = web_api::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
