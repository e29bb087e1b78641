use crate::cli::ServeArgs;
use crate::infra::{configured_store, AppState};
use crate::routes::with_estimates_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use commence_planner::config::AppConfig;
use commence_planner::error::AppError;
use commence_planner::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = configured_store(&config.data, config.planning.clone())?;
    if config.data.reference_path.is_none() {
        warn!("APP_REFERENCE_PATH is not set; starting with empty reference data");
    }
    info!(
        actual_snapshots = store.snapshots,
        base_scenario_id = ?store.base_id,
        current_year = config.planning.current_year,
        horizon_years = config.planning.horizon_years,
        default_rate = %config.planning.default_rate,
        "estimates store loaded"
    );

    let app = with_estimates_routes(store.service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "commencing enrolment planner ready");

    axum::serve(listener, app).await?;
    Ok(())
}
