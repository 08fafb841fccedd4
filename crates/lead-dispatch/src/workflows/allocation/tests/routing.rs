use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::allocation::audit::InMemoryAuditLog;
use crate::workflows::allocation::domain::{ContractorId, Coordinates};
use crate::workflows::allocation::router::{allocate_handler, allocation_router};
use crate::workflows::allocation::service::{AllocationRequest, LeadDispatchService};
use crate::workflows::allocation::store::{ContractorStore, InMemoryContractorStore};
use crate::workflows::allocation::strategy::AllocationStrategy;

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn allocate_route_returns_created_event() {
    let (service, _, _, _) = build_service(reference_pair());
    let router = allocation_router(Arc::new(service));
    let body = serde_json::to_value(request(AllocationStrategy::PerformanceBased)).unwrap();

    let response = router
        .oneshot(json_request("POST", "/api/v1/allocations", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json(response).await;
    assert_eq!(payload["allocated_to"], "C-B");
    assert_eq!(payload["event_type"], "lead_assigned");
    assert_eq!(payload["decision"]["strategy"], "performance_based");
}

#[tokio::test]
async fn simulation_route_returns_ok_and_leaves_state_alone() {
    let (service, store, _, _) = build_service(reference_pair());
    let router = allocation_router(Arc::new(service));
    let body = serde_json::to_value(
        AllocationRequest::new(lead())
            .with_strategy(AllocationStrategy::WeightedRandom)
            .with_seed(5)
            .simulated(),
    )
    .unwrap();

    let response = router
        .oneshot(json_request("POST", "/api/v1/allocations", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["audit"]["simulated"], true);
    assert_eq!(payload["audit"]["seed"], 5);

    let untouched = store
        .get(&ContractorId("C-B".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(untouched.capacity.current_active_jobs, 2);
}

#[tokio::test]
async fn allocate_handler_returns_unprocessable_for_failures() {
    let (service, _, _, _) = build_service(vec![contractor("C-001", 1.0)]);
    let far_lead = lead_at("lead-far", Coordinates::new(35.68, 139.69));

    let response = allocate_handler::<
        InMemoryContractorStore,
        InMemoryAuditLog,
        RecordingPublisher,
    >(State(Arc::new(service)), axum::Json(AllocationRequest::new(far_lead)))
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json(response).await;
    assert_eq!(payload["failure"]["lead_id"], "lead-far");
    assert_eq!(payload["failure"]["reason"]["kind"], "no_eligible_contractors");
}

#[tokio::test]
async fn allocate_handler_returns_internal_error_when_audit_is_down() {
    let service = LeadDispatchService::new(
        store_with(vec![contractor("C-001", 1.0)]),
        Arc::new(UnavailableAuditLog),
        Arc::new(RecordingPublisher::default()),
        config(),
    );

    let response = allocate_handler::<
        InMemoryContractorStore,
        UnavailableAuditLog,
        RecordingPublisher,
    >(State(Arc::new(service)), axum::Json(AllocationRequest::new(lead())))
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json(response).await;
    assert!(payload["error"]
        .as_str()
        .unwrap()
        .contains("could not be audited"));
}

#[tokio::test]
async fn audit_route_filters_by_contractor() {
    let (service, _, _, _) = build_service(reference_pair());
    let service = Arc::new(service);
    service
        .allocate(request(AllocationStrategy::PerformanceBased))
        .unwrap();
    service
        .allocate(request(AllocationStrategy::ProximityBased))
        .unwrap();

    let response = allocation_router(service)
        .oneshot(
            Request::get("/api/v1/allocations?contractor_id=C-A&strategy=proximity-based")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let entries = payload.as_array().expect("array of entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "allocated");
    assert_eq!(entries[0]["allocated_to"], "C-A");
}

#[tokio::test]
async fn audit_route_rejects_unknown_strategy() {
    let (service, _, _, _) = build_service(reference_pair());

    let response = allocation_router(Arc::new(service))
        .oneshot(
            Request::get("/api/v1/allocations?strategy=lottery")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn load_route_reports_every_contractor() {
    let (service, _, _, _) = build_service(reference_pair());

    let response = allocation_router(Arc::new(service))
        .oneshot(
            Request::get("/api/v1/contractors/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["contractors"].as_array().unwrap().len(), 2);
    assert!(payload["fairness_score"].as_u64().is_some());
}

#[tokio::test]
async fn contractor_upsert_route_replaces_snapshot() {
    let (service, store, _, _) = build_service(reference_pair());
    let mut updated = contractor("C-A", 2.0);
    updated.capacity.max_active_jobs = 25;
    let body = serde_json::to_value(&updated).unwrap();

    let response = allocation_router(Arc::new(service))
        .oneshot(json_request("PUT", "/api/v1/contractors/C-A", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let stored = store
        .get(&ContractorId("C-A".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(stored.capacity.max_active_jobs, 25);
}

#[tokio::test]
async fn contractor_upsert_route_rejects_mismatched_ids() {
    let (service, _, _, _) = build_service(reference_pair());
    let body = json!(contractor("C-Z", 2.0));

    let response = allocation_router(Arc::new(service))
        .oneshot(json_request("PUT", "/api/v1/contractors/C-A", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_route_honours_time_range() {
    let (service, _, _, _) = build_service(reference_pair());
    let service = Arc::new(service);
    service
        .allocate(request(AllocationStrategy::PerformanceBased))
        .unwrap();

    let future = allocation_router(service.clone())
        .oneshot(
            Request::get("/api/v1/allocations?from=2100-01-01T00:00:00Z")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(future.status(), StatusCode::OK);
    assert!(read_json(future).await.as_array().unwrap().is_empty());

    let window = allocation_router(service)
        .oneshot(
            Request::get("/api/v1/allocations?from=2000-01-01T00:00:00Z&to=2100-01-01T00:00:00Z")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(read_json(window).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn audit_route_rejects_malformed_timestamps() {
    let (service, _, _, _) = build_service(reference_pair());

    let response = allocation_router(Arc::new(service))
        .oneshot(
            Request::get("/api/v1/allocations?to=yesterday")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn win_probability_route_returns_the_tally() {
    let (service, _, _, _) = build_service(reference_pair());
    let body = json!({
        "lead": lead(),
        "strategy": "performance_based",
        "trials": 20,
        "seed": 4,
    });

    let response = allocation_router(Arc::new(service))
        .oneshot(json_request("POST", "/api/v1/allocations/win-probabilities", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["trials"], 20);
    assert_eq!(payload["contractors"][0]["contractor_id"], "C-B");
    assert_eq!(payload["contractors"][0]["wins"], 20);
}

#[tokio::test]
async fn win_probability_route_rejects_zero_trials() {
    let (service, _, _, _) = build_service(reference_pair());
    let body = json!({ "lead": lead(), "trials": 0 });

    let response = allocation_router(Arc::new(service))
        .oneshot(json_request("POST", "/api/v1/allocations/win-probabilities", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rebalance_route_records_the_operator() {
    let (service, _, audit, _) = build_service(reference_pair());
    let body = json!({ "performed_by": "ops-lead", "reason": "quarterly reset" });

    let response = allocation_router(Arc::new(service))
        .oneshot(json_request("POST", "/api/v1/contractors/rebalance", &body))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["performed_by"], "ops-lead");
    assert_eq!(payload["contractors_affected"], 2);
    assert_eq!(audit.len().expect("audit readable"), 1);
}
