use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use vaani::pipeline::alerts::{
    CallOutcome, CallRequest, GatewayError, InMemoryOpportunityStore, TaskId, TelephonyGateway,
};
use vaani::pipeline::calls::{CallServices, InMemoryCallLog};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Concrete stores the maintenance endpoints reach past the trait seams for,
/// since retention purges are adapter-level operations.
#[derive(Clone)]
pub(crate) struct MaintenanceState {
    pub(crate) opportunities: Arc<InMemoryOpportunityStore>,
    pub(crate) calls: Arc<CallServices<InMemoryCallLog>>,
}

/// Stand-in telephony provider used while no outbound trunk is configured.
/// Every placement is logged and reported answered; a repeated
/// (dedup_key, attempt) pair is answered again without a second placement.
#[derive(Default)]
pub(crate) struct DryRunTelephonyGateway {
    placed: Mutex<HashSet<(TaskId, u32)>>,
}

impl TelephonyGateway for DryRunTelephonyGateway {
    fn place_call(&self, request: &CallRequest) -> Result<CallOutcome, GatewayError> {
        let mut placed = self.placed.lock().expect("gateway mutex poisoned");
        if !placed.insert((request.dedup_key.clone(), request.attempt)) {
            debug!(
                task_id = %request.dedup_key.0,
                attempt = request.attempt,
                "suppressing duplicate call placement"
            );
            return Ok(CallOutcome::Answered);
        }
        info!(
            task_id = %request.dedup_key.0,
            attempt = request.attempt,
            phone = %request.phone,
            title = %request.title,
            language = %request.language,
            "dry-run call placed"
        );
        Ok(CallOutcome::Answered)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
