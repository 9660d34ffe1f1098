//! Plate Gate server
//!
//! Main entry point: builds the pipeline and serves the management API.

use axum::http::HeaderValue;
use plate_gate::{
    access_store::{AccessStore, MemoryAccessStore, MySqlAccessStore},
    ai_client::{HttpDetectorLoader, TesseractOcr},
    decision_stage::DecisionStage,
    door_actuator::HttpDoorTrigger,
    event_log_service::EventLogService,
    frame_source::FfmpegBackend,
    plate_reader::{PlateReader, ReaderConfig},
    realtime_hub::RealtimeHub,
    result_sink::ResultSink,
    state::{AppConfig, AppState, SystemHealth},
    stream_supervisor::{StreamSupervisor, SupervisorConfig},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Inference server request timeout
const DETECTOR_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn AccessStore>> {
    if let Some(url) = &config.database_url {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        tracing::info!("Database connected");
        return Ok(Arc::new(MySqlAccessStore::new(pool)));
    }

    let store = match &config.seed_file {
        Some(path) => MemoryAccessStore::load_seed_file(path).await?,
        None => MemoryAccessStore::new(),
    };
    tracing::warn!("DATABASE_URL not set, using in-memory store");
    Ok(Arc::new(store))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plate_gate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Plate Gate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        persistent = config.database_url.is_some(),
        detector_url = %config.detector_url,
        tesseract_langs = %config.tesseract_langs,
        cooldown_ms = config.detection_cooldown.as_millis() as u64,
        detect_every_n_frames = config.detect_every_n_frames,
        "Configuration loaded"
    );

    let store = build_store(&config).await?;

    // Capabilities
    let loader = Arc::new(HttpDetectorLoader::new(config.detector_url.clone(), DETECTOR_TIMEOUT));
    let ocr = Arc::new(TesseractOcr::new(
        config.tesseract_bin.clone(),
        config.tesseract_langs.clone(),
        config.ocr_timeout,
    ));
    let backend = Arc::new(FfmpegBackend::new(
        config.ffmpeg_bin.clone(),
        config.capture_open_timeout,
        config.capture_read_timeout,
    ));
    let door_trigger = Arc::new(HttpDoorTrigger::new());

    // Pipeline
    let reader = PlateReader::new(
        loader,
        ocr,
        ReaderConfig {
            cooldown: config.detection_cooldown,
            min_confidence: config.min_confidence,
            ..Default::default()
        },
    )
    .spawn();
    tracing::info!("PlateReader started");

    let decision = Arc::new(
        DecisionStage::new(store.clone(), door_trigger.clone()).with_door_timeout(config.door_timeout),
    );

    let event_log = Arc::new(EventLogService::new(config.recent_capacity));
    let realtime = Arc::new(RealtimeHub::new());
    let sink = Arc::new(ResultSink::new(store.clone(), event_log.clone(), realtime.clone()));

    let supervisor = Arc::new(StreamSupervisor::new(
        store.clone(),
        backend,
        reader,
        decision,
        sink,
        SupervisorConfig {
            detect_every_n_frames: config.detect_every_n_frames,
            ..Default::default()
        },
    ));
    tracing::info!("StreamSupervisor initialized");

    let state = AppState {
        config: config.clone(),
        store,
        supervisor: supervisor.clone(),
        event_log,
        realtime,
        door_trigger,
        system_health: Arc::new(RwLock::new(SystemHealth::default())),
        started_at: Instant::now(),
    };

    // Start system health monitoring
    let health_monitor = state.system_health.clone();
    tokio::spawn(async move {
        use sysinfo::System;
        let mut sys = System::new_all();
        let mut interval = tokio::time::interval(HEALTH_SAMPLE_INTERVAL);

        loop {
            interval.tick().await;
            sys.refresh_cpu();
            sys.refresh_memory();

            // Average CPU usage across all cores
            let cpu = {
                let cpus = sys.cpus();
                if cpus.is_empty() {
                    0.0
                } else {
                    cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
                }
            };

            let mut health = health_monitor.write().await;
            health.update(cpu, sys.used_memory(), sys.total_memory());
        }
    });

    let app = web_api::create_router(state.clone())
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stopping camera workers");
    supervisor.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
