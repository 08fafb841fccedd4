use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::audit::{AllocationPublisher, AuditLog, AuditOutcome, AuditQuery};
use super::domain::{Contractor, ContractorId, Lead, LeadId};
use super::engine::SYSTEM_ACTOR;
use super::service::{AllocationRequest, DispatchError, LeadDispatchService};
use super::store::ContractorStore;
use super::strategy::AllocationStrategy;

/// Router builder exposing allocation, audit, and contractor-load endpoints.
pub fn allocation_router<S, L, P>(service: Arc<LeadDispatchService<S, L, P>>) -> Router
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/allocations",
            post(allocate_handler::<S, L, P>).get(audit_handler::<S, L, P>),
        )
        .route(
            "/api/v1/allocations/win-probabilities",
            post(win_probabilities_handler::<S, L, P>),
        )
        .route(
            "/api/v1/contractors/load",
            get(load_report_handler::<S, L, P>),
        )
        .route(
            "/api/v1/contractors/rebalance",
            post(rebalance_handler::<S, L, P>),
        )
        .route(
            "/api/v1/contractors/:contractor_id",
            put(upsert_contractor_handler::<S, L, P>),
        )
        .with_state(service)
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn allocate_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
    axum::Json(request): axum::Json<AllocationRequest>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    match service.allocate(request) {
        Ok(event) if event.is_simulation() => (StatusCode::OK, axum::Json(event)).into_response(),
        Ok(event) => (StatusCode::CREATED, axum::Json(event)).into_response(),
        Err(DispatchError::Failure(failure)) => {
            let payload = json!({
                "error": failure.summary(),
                "failure": failure,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(DispatchError::Conflict(conflict)) => error_response(StatusCode::CONFLICT, conflict),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuditParams {
    lead_id: Option<String>,
    contractor_id: Option<String>,
    strategy: Option<String>,
    outcome: Option<AuditOutcome>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl AuditParams {
    fn into_query(self) -> Result<AuditQuery, String> {
        let strategy = self
            .strategy
            .map(|value| value.parse::<AllocationStrategy>())
            .transpose()?;
        Ok(AuditQuery {
            lead_id: self.lead_id.map(LeadId),
            contractor_id: self.contractor_id.map(ContractorId),
            strategy,
            outcome: self.outcome,
            from: self.from,
            to: self.to,
            limit: self.limit,
        })
    }
}

pub(crate) async fn audit_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
    Query(params): Query<AuditParams>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    let query = match params.into_query() {
        Ok(query) => query,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error),
    };

    match service.audit_trail(&query) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

fn default_trials() -> u32 {
    1_000
}

#[derive(Debug, Deserialize)]
pub(crate) struct WinProbabilityRequest {
    lead: Lead,
    #[serde(default)]
    strategy: Option<AllocationStrategy>,
    #[serde(default = "default_trials")]
    trials: u32,
    #[serde(default)]
    seed: u64,
}

pub(crate) async fn win_probabilities_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
    axum::Json(request): axum::Json<WinProbabilityRequest>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    let strategy = request.strategy.unwrap_or(service.default_strategy());
    match service.win_probabilities(&request.lead, strategy, request.trials, request.seed) {
        Ok(estimate) => (StatusCode::OK, axum::Json(estimate)).into_response(),
        Err(DispatchError::Failure(failure)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, failure.summary())
        }
        Err(err @ DispatchError::InvalidTrials { .. }) => {
            error_response(StatusCode::BAD_REQUEST, err)
        }
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RebalanceRequest {
    #[serde(default)]
    performed_by: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) async fn rebalance_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
    axum::Json(request): axum::Json<RebalanceRequest>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    let performed_by = request.performed_by.as_deref().unwrap_or(SYSTEM_ACTOR);
    match service.rebalance(performed_by, request.reason, Utc::now()) {
        Ok(action) => (StatusCode::OK, axum::Json(action)).into_response(),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

pub(crate) async fn load_report_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    match service.load_report(Utc::now()) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

pub(crate) async fn upsert_contractor_handler<S, L, P>(
    State(service): State<Arc<LeadDispatchService<S, L, P>>>,
    Path(contractor_id): Path<String>,
    axum::Json(contractor): axum::Json<Contractor>,
) -> Response
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    if contractor.id.0 != contractor_id {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "path contractor {contractor_id} does not match body contractor {}",
                contractor.id
            ),
        );
    }

    match service.upsert_contractor(contractor) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}
