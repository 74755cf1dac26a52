use crate::cli::ServeArgs;
use crate::infra::{AppState, DryRunTelephonyGateway, MaintenanceState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vaani::config::AppConfig;
use vaani::error::AppError;
use vaani::pipeline::alerts::{
    run_worker, AlertServices, DeliveryScheduler, DirectoryService, InMemoryAlertRegistry,
    InMemoryNotificationLog, InMemoryOpportunityStore, InMemoryProfileStore, InMemoryTaskIntake,
    IngestService, NotificationDispatcher, SchedulerConfig,
};
use vaani::pipeline::calls::{CallServices, InMemoryCallLog, SessionManager};
use vaani::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry.log_level);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let profiles = Arc::new(InMemoryProfileStore::default());
    let opportunities = Arc::new(InMemoryOpportunityStore::default());
    let registry = Arc::new(InMemoryAlertRegistry::default());
    let intake = Arc::new(InMemoryTaskIntake::default());
    let log = Arc::new(InMemoryNotificationLog::default());
    let call_log = Arc::new(InMemoryCallLog::default());
    let gateway = Arc::new(DryRunTelephonyGateway::default());

    let alert_services = Arc::new(AlertServices {
        directory: DirectoryService::new(profiles.clone(), registry.clone()),
        ingest: IngestService::new(opportunities.clone()),
        dispatcher: NotificationDispatcher::new(
            registry,
            profiles.clone(),
            intake.clone(),
            log.clone(),
        ),
        profiles: profiles.clone(),
        opportunities: opportunities.clone(),
        log: log.clone(),
    });
    let call_services = Arc::new(CallServices {
        manager: SessionManager::new(call_log.clone()),
        log: call_log,
    });
    let maintenance_state = MaintenanceState {
        opportunities: opportunities.clone(),
        calls: call_services.clone(),
    };

    let scheduler_config = SchedulerConfig {
        claim_batch: config.worker.claim_batch,
        poll_interval: config.worker.poll_interval,
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(DeliveryScheduler::new(
        intake,
        gateway,
        profiles,
        opportunities,
        log,
        scheduler_config,
    ));
    tokio::spawn(run_worker(scheduler));

    let app = with_service_routes(alert_services, call_services)
        .layer(Extension(app_state))
        .layer(Extension(maintenance_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "vaani alert service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
