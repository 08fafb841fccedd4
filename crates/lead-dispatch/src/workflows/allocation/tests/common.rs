use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::allocation::audit::{
    AllocationNotice, AllocationPublisher, AuditEntry, AuditError, AuditLog, AuditQuery,
    InMemoryAuditLog, PublishError,
};
use crate::workflows::allocation::config::{AllocationConfig, ValidatedConfig};
use crate::workflows::allocation::domain::{
    AvailabilityStatus, Capacity, Contractor, ContractorId, Coordinates, EventId, Lead, LeadId,
    LeadStatistics, LeadUrgency, PerformanceScore, ServiceArea,
};
use crate::workflows::allocation::event::AllocationEvent;
use crate::workflows::allocation::geo::EARTH_MEAN_RADIUS_MILES;
use crate::workflows::allocation::service::{AllocationRequest, LeadDispatchService};
use crate::workflows::allocation::store::InMemoryContractorStore;
use crate::workflows::allocation::strategy::AllocationStrategy;

pub(super) const SYDNEY: Coordinates = Coordinates {
    lat: -33.87,
    lng: 151.21,
};

pub(super) type TestService =
    LeadDispatchService<InMemoryContractorStore, InMemoryAuditLog, RecordingPublisher>;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 9, 30, 0).unwrap()
}

pub(super) fn config() -> ValidatedConfig {
    AllocationConfig::default()
        .validate()
        .expect("default config is valid")
}

pub(super) fn lead() -> Lead {
    lead_at("lead-001", SYDNEY)
}

pub(super) fn lead_at(id: &str, location: Coordinates) -> Lead {
    Lead {
        id: LeadId(id.to_string()),
        location,
        urgency: LeadUrgency::Urgent,
        category: "water_damage".to_string(),
        created_at: fixed_now(),
    }
}

/// Point due north of `origin` by `miles` along the meridian.
pub(super) fn north_of(origin: Coordinates, miles: f64) -> Coordinates {
    let degrees = (miles / EARTH_MEAN_RADIUS_MILES).to_degrees();
    Coordinates::new(origin.lat + degrees, origin.lng)
}

/// Available contractor whose service-area center sits `distance` miles from [`SYDNEY`].
pub(super) fn contractor(id: &str, distance: f64) -> Contractor {
    Contractor {
        id: ContractorId(id.to_string()),
        company_name: format!("{id} Restoration"),
        availability: AvailabilityStatus::Available,
        service_area: ServiceArea {
            center: north_of(SYDNEY, distance),
            max_radius: 20.0,
        },
        capacity: Capacity {
            max_active_jobs: 10,
            current_active_jobs: 2,
        },
        performance: PerformanceScore {
            overall: 85.0,
            bonus_multiplier: 1.0,
        },
        lead_statistics: LeadStatistics {
            lead_share_percentage: 30.0,
            ..LeadStatistics::default()
        },
    }
}

/// Contractors A and B from the reference scenario: A close but over the share cap,
/// B further out and well under it.
pub(super) fn reference_pair() -> Vec<Contractor> {
    let mut a = contractor("C-A", 2.0);
    a.performance.bonus_multiplier = 1.10;
    a.lead_statistics.lead_share_percentage = 45.0;

    let mut b = contractor("C-B", 8.0);
    b.performance.bonus_multiplier = 1.05;
    b.lead_statistics.lead_share_percentage = 20.0;

    vec![a, b]
}

pub(super) fn request(strategy: AllocationStrategy) -> AllocationRequest {
    AllocationRequest::new(lead()).with_strategy(strategy)
}

pub(super) fn store_with(contractors: Vec<Contractor>) -> Arc<InMemoryContractorStore> {
    Arc::new(
        InMemoryContractorStore::with_contractors(Utc::now(), Duration::days(30), contractors)
            .expect("seed contractor store"),
    )
}

pub(super) fn build_service(
    contractors: Vec<Contractor>,
) -> (
    TestService,
    Arc<InMemoryContractorStore>,
    Arc<InMemoryAuditLog>,
    Arc<RecordingPublisher>,
) {
    let store = store_with(contractors);
    let audit = Arc::new(InMemoryAuditLog::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let service =
        LeadDispatchService::new(store.clone(), audit.clone(), publisher.clone(), config());
    (service, store, audit, publisher)
}

#[derive(Default, Clone)]
pub(super) struct RecordingPublisher {
    notices: Arc<Mutex<Vec<AllocationNotice>>>,
    statistics: Arc<Mutex<Vec<EventId>>>,
    fail_notifications: bool,
}

impl RecordingPublisher {
    pub(super) fn failing() -> Self {
        Self {
            fail_notifications: true,
            ..Self::default()
        }
    }

    pub(super) fn notices(&self) -> Vec<AllocationNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }

    pub(super) fn statistics(&self) -> Vec<EventId> {
        self.statistics
            .lock()
            .expect("statistics mutex poisoned")
            .clone()
    }
}

impl AllocationPublisher for RecordingPublisher {
    fn notify_contractor(&self, notice: AllocationNotice) -> Result<(), PublishError> {
        if self.fail_notifications {
            return Err(PublishError::Transport("smtp relay offline".to_string()));
        }
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }

    fn record_statistics(&self, event: &AllocationEvent) -> Result<(), PublishError> {
        self.statistics
            .lock()
            .expect("statistics mutex poisoned")
            .push(event.id.clone());
        Ok(())
    }
}

/// Audit sink that refuses every write.
#[derive(Default)]
pub(super) struct UnavailableAuditLog;

impl AuditLog for UnavailableAuditLog {
    fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit database offline".to_string()))
    }

    fn query(&self, _query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        Err(AuditError::Unavailable("audit database offline".to_string()))
    }
}

pub(super) async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json body")
}
