//! Concurrent allocations against a single contractor must never overshoot the
//! capacity cap, however the commits interleave.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};

use lead_dispatch::workflows::allocation::{
    AllocationConfig, AllocationRequest, AllocationStrategy, AvailabilityStatus, Capacity,
    Contractor, ContractorId, ContractorStore, Coordinates, DispatchError, InMemoryAuditLog,
    InMemoryContractorStore, Lead, LeadDispatchService, LeadId, LeadStatistics, LeadUrgency,
    PerformanceScore, ServiceArea, TracingPublisher,
};

const SITE: Coordinates = Coordinates {
    lat: 29.76,
    lng: -95.37,
};

fn solo_contractor() -> Contractor {
    Contractor {
        id: ContractorId("C-SOLO".to_string()),
        company_name: "Solo Mitigation".to_string(),
        availability: AvailabilityStatus::Available,
        service_area: ServiceArea {
            center: SITE,
            max_radius: 30.0,
        },
        capacity: Capacity {
            max_active_jobs: 10,
            current_active_jobs: 0,
        },
        performance: PerformanceScore {
            overall: 90.0,
            bonus_multiplier: 1.0,
        },
        lead_statistics: LeadStatistics::default(),
    }
}

fn lead(n: usize) -> Lead {
    Lead {
        id: LeadId(format!("lead-{n:03}")),
        location: SITE,
        urgency: LeadUrgency::Standard,
        category: "mold".to_string(),
        created_at: Utc::now(),
    }
}

#[test]
fn twenty_racing_allocations_admit_exactly_eight() {
    let store = Arc::new(
        InMemoryContractorStore::with_contractors(
            Utc::now(),
            Duration::days(30),
            vec![solo_contractor()],
        )
        .expect("store seeds"),
    );
    let audit = Arc::new(InMemoryAuditLog::new());
    let config = AllocationConfig::default()
        .validate()
        .expect("default policy is valid");
    let service = LeadDispatchService::new(
        store.clone(),
        audit.clone(),
        Arc::new(TracingPublisher),
        config,
    );

    let outcomes: Vec<Result<_, DispatchError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..20)
            .map(|n| {
                let service = &service;
                scope.spawn(move || {
                    service.allocate(
                        AllocationRequest::new(lead(n))
                            .with_strategy(AllocationStrategy::PerformanceBased),
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("allocation thread panicked"))
            .collect()
    });

    let admitted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(admitted, 8);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(
                matches!(err, DispatchError::Failure(_) | DispatchError::Conflict(_)),
                "unexpected error {err:?}"
            );
        }
    }

    let contractor = store
        .get(&ContractorId("C-SOLO".to_string()))
        .expect("store readable")
        .expect("contractor present");
    assert_eq!(contractor.capacity.current_active_jobs, 8);
    assert_eq!(contractor.lead_statistics.total_leads_received, 8);
    assert_eq!(store.period_total(), 8);
}

#[test]
fn released_jobs_reopen_capacity() {
    let store = Arc::new(
        InMemoryContractorStore::with_contractors(
            Utc::now(),
            Duration::days(30),
            vec![solo_contractor()],
        )
        .expect("store seeds"),
    );
    let config = AllocationConfig::default()
        .validate()
        .expect("default policy is valid");
    let service = LeadDispatchService::new(
        store.clone(),
        Arc::new(InMemoryAuditLog::new()),
        Arc::new(TracingPublisher),
        config,
    );

    for n in 0..8 {
        service
            .allocate(AllocationRequest::new(lead(n)))
            .expect("under the cap");
    }
    assert!(matches!(
        service.allocate(AllocationRequest::new(lead(8))),
        Err(DispatchError::Failure(_))
    ));

    service
        .complete_job(&ContractorId("C-SOLO".to_string()))
        .expect("job released");
    service
        .allocate(AllocationRequest::new(lead(9)))
        .expect("capacity reopened");
}
