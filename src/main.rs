use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use chairtime::clock::BusinessClock;
use chairtime::engine::{CancellationPolicy, Engine, EngineConfig};
use chairtime::notify::LogNotifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("CHAIRTIME_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    chairtime::observability::init(metrics_port);

    let port = std::env::var("CHAIRTIME_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("CHAIRTIME_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("CHAIRTIME_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let shop_name =
        std::env::var("CHAIRTIME_SHOP_NAME").unwrap_or_else(|_| "Chairtime".into());
    let country_code =
        std::env::var("CHAIRTIME_COUNTRY_CODE").unwrap_or_else(|_| "57".into());
    let offset_minutes: i32 = std::env::var("CHAIRTIME_UTC_OFFSET_MINUTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(-300);
    let compact_threshold: u64 = std::env::var("CHAIRTIME_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let policy: CancellationPolicy = std::env::var("CHAIRTIME_WAITLIST_POLICY")
        .unwrap_or_else(|_| "promote".into())
        .parse()
        .map_err(|()| "CHAIRTIME_WAITLIST_POLICY must be 'promote' or 'notify'")?;

    let clock = BusinessClock::from_offset_minutes(offset_minutes)
        .ok_or("CHAIRTIME_UTC_OFFSET_MINUTES out of range")?;

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("chairtime.wal");

    let engine = Arc::new(Engine::new(
        wal_path,
        Arc::new(LogNotifier),
        EngineConfig { clock, policy, shop_name, country_code },
    )?);
    engine.seed_default_services().await?;

    tokio::spawn(chairtime::reaper::run_compactor(engine.clone(), compact_threshold));

    let app = chairtime::http::router(engine);
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("chairtime listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  waitlist policy: {policy:?}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chairtime stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");
}
