use crate::cli::ServeArgs;
use crate::infra::{seeded_store, AppState};
use crate::routes::with_membership_routes;
use agri_loyalty::config::AppConfig;
use agri_loyalty::error::AppError;
use agri_loyalty::membership::MembershipService;
use agri_loyalty::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let store = Arc::new(seeded_store(&config.rewards, Utc::now()));
    let service = Arc::new(MembershipService::new(
        store,
        config.rewards.program_settings(),
    ));

    let app = with_membership_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        exchange_enabled = config.rewards.exchange_enabled,
        utc_offset_minutes = config.rewards.utc_offset_minutes,
        "rewards engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
