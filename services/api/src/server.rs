use crate::cli::ServeArgs;
use crate::infra::{in_memory_marketplace, AppState};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use praevon::clock::SystemClock;
use praevon::config::AppConfig;
use praevon::error::AppError;
use praevon::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let marketplace = in_memory_marketplace(&config.storage, Arc::new(SystemClock))?;
    let storage_port = config.storage.base_url.port_or_known_default();
    let app = with_platform_routes(marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    if storage_port != Some(addr.port()) {
        warn!(base_url = %config.storage.base_url, "capability urls point away from this process; the blob emulator will not receive uploads");
    }
    info!(?config.environment, %addr, storage = ?config.storage, "praevon marketplace ready");

    axum::serve(listener, app).await?;
    Ok(())
}
