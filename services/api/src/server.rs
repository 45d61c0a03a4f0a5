use crate::cli::ServeArgs;
use crate::infra::{demo_roster, load_roster, seed_store, AppState};
use crate::routes::with_attendance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rollcall::attendance::AttendanceApi;
use rollcall::config::AppConfig;
use rollcall::error::AppError;
use rollcall::telemetry;
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

    let mut users = Vec::new();
    if let Some(path) = args.roster.as_deref() {
        users.extend(load_roster(path)?);
    }
    if args.demo_roster {
        users.extend(demo_roster());
    }
    if users.is_empty() {
        warn!("no roster loaded; every request will be rejected as an unknown actor");
    }
    let roster_size = users.len();
    let store = seed_store(users)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let api = Arc::new(AttendanceApi::new(store, config.policy));
    let app = with_attendance_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        roster_size,
        window_hours = config.policy.window_hours,
        "attendance service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
