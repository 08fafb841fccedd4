use crate::cli::ServeArgs;
use crate::infra::{build_service, resolve_contractors, resolve_policy, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lead_dispatch::config::AppConfig;
use lead_dispatch::error::AppError;
use lead_dispatch::telemetry;
use lead_dispatch::workflows::allocation::TracingPublisher;
use std::sync::atomic::{AtomicBool, Ordering};
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let policy = resolve_policy(&config.dispatch, args.config.as_deref())?;
    let contractors = resolve_contractors(args.contractors.as_deref())?;
    let roster_size = contractors.len();
    let service = build_service(
        &config.dispatch,
        policy,
        contractors,
        Arc::new(TracingPublisher),
    )?;

    let app = with_operational_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        roster_size,
        default_strategy = %config.dispatch.default_strategy,
        "lead dispatch service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
