use crate::cli::ServeArgs;
use crate::infra::{build_supervisor, AppState, InMemorySessionStore};
use crate::routes::with_conversation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_orchestrator::config::AppConfig;
use loan_orchestrator::error::AppError;
use loan_orchestrator::telemetry;
use loan_orchestrator::workflows::loan::conversation_router;
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

    let supervisor = Arc::new(build_supervisor(&config.letters.output_dir));
    let store = Arc::new(InMemorySessionStore::default());

    let app = with_conversation_routes(conversation_router(supervisor, store))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
