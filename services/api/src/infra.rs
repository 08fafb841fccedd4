use chrono::{Duration, Utc};
use lead_dispatch::config::DispatchSettings;
use lead_dispatch::error::AppError;
use lead_dispatch::workflows::allocation::{
    AllocationEvent, AllocationNotice, AllocationPublisher, AvailabilityStatus, Capacity,
    Contractor, ContractorId, Coordinates, InMemoryAuditLog, InMemoryContractorStore,
    LeadDispatchService, LeadStatistics, LeadUrgency, PerformanceScore, PublishError,
    ServiceArea, ValidatedConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type DispatchService<P> =
    LeadDispatchService<InMemoryContractorStore, InMemoryAuditLog, P>;

/// Publisher that keeps every notice in memory so the CLI can show what would be sent.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNoticeOutbox {
    notices: Arc<Mutex<Vec<AllocationNotice>>>,
    statistics_updates: Arc<Mutex<u64>>,
}

impl AllocationPublisher for InMemoryNoticeOutbox {
    fn notify_contractor(&self, notice: AllocationNotice) -> Result<(), PublishError> {
        let mut guard = self
            .notices
            .lock()
            .map_err(|_| PublishError::Transport("outbox mutex poisoned".to_string()))?;
        info!(
            contractor_id = %notice.contractor_id,
            template = %notice.template,
            "notice queued"
        );
        guard.push(notice);
        Ok(())
    }

    fn record_statistics(&self, _event: &AllocationEvent) -> Result<(), PublishError> {
        let mut guard = self
            .statistics_updates
            .lock()
            .map_err(|_| PublishError::Statistics("statistics mutex poisoned".to_string()))?;
        *guard += 1;
        Ok(())
    }
}

impl InMemoryNoticeOutbox {
    pub(crate) fn notices(&self) -> Vec<AllocationNotice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub(crate) fn statistics_updates(&self) -> u64 {
        self.statistics_updates
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }
}

pub(crate) fn build_service<P>(
    settings: &DispatchSettings,
    allocation: ValidatedConfig,
    contractors: Vec<Contractor>,
    publisher: Arc<P>,
) -> Result<DispatchService<P>, AppError>
where
    P: AllocationPublisher + 'static,
{
    let period = allocation.evaluation_period.length();
    let store = InMemoryContractorStore::with_contractors(Utc::now(), period, contractors)
        .map_err(|err| AppError::Dispatch(err.into()))?;
    let service = LeadDispatchService::new(
        Arc::new(store),
        Arc::new(InMemoryAuditLog::new()),
        publisher,
        allocation,
    )
    .with_budget(settings.decision_budget)
    .with_default_strategy(settings.default_strategy);
    Ok(service)
}

/// Policy from a JSON file when given, otherwise the environment-derived one.
pub(crate) fn resolve_policy(
    settings: &DispatchSettings,
    path: Option<&Path>,
) -> Result<ValidatedConfig, AppError> {
    match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None => Ok(settings.allocation.clone()),
    }
}

pub(crate) fn resolve_contractors(path: Option<&Path>) -> Result<Vec<Contractor>, AppError> {
    match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None => Ok(sample_contractors()),
    }
}

pub(crate) fn parse_urgency(raw: &str) -> Result<LeadUrgency, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("unknown urgency '{raw}' (emergency|urgent|standard|scheduled)"))
}

/// Downtown Dallas; the sample roster and demo leads cluster around it.
pub(crate) const DEMO_CENTER: Coordinates = Coordinates {
    lat: 32.7767,
    lng: -96.7970,
};

struct Seed {
    id: &'static str,
    company: &'static str,
    lat_offset: f64,
    lng_offset: f64,
    radius: f64,
    max_jobs: u32,
    active_jobs: u32,
    overall: f64,
    multiplier: f64,
    share: f64,
}

const SAMPLE_ROSTER: [Seed; 5] = [
    Seed {
        id: "C-101",
        company: "Lone Star Restoration",
        lat_offset: 0.02,
        lng_offset: 0.01,
        radius: 25.0,
        max_jobs: 12,
        active_jobs: 7,
        overall: 92.0,
        multiplier: 1.10,
        share: 34.0,
    },
    Seed {
        id: "C-102",
        company: "Trinity Water Removal",
        lat_offset: -0.06,
        lng_offset: 0.08,
        radius: 20.0,
        max_jobs: 8,
        active_jobs: 2,
        overall: 84.0,
        multiplier: 1.05,
        share: 18.0,
    },
    Seed {
        id: "C-103",
        company: "Deep Ellum Mold Pros",
        lat_offset: 0.11,
        lng_offset: -0.04,
        radius: 15.0,
        max_jobs: 6,
        active_jobs: 5,
        overall: 88.0,
        multiplier: 1.00,
        share: 22.0,
    },
    Seed {
        id: "C-104",
        company: "Plano Fire & Smoke",
        lat_offset: 0.24,
        lng_offset: 0.05,
        radius: 30.0,
        max_jobs: 10,
        active_jobs: 1,
        overall: 79.0,
        multiplier: 1.00,
        share: 14.0,
    },
    Seed {
        id: "C-105",
        company: "Oak Cliff Storm Response",
        lat_offset: -0.09,
        lng_offset: -0.07,
        radius: 18.0,
        max_jobs: 9,
        active_jobs: 3,
        overall: 90.0,
        multiplier: 1.08,
        share: 12.0,
    },
];

pub(crate) fn sample_contractors() -> Vec<Contractor> {
    SAMPLE_ROSTER
        .iter()
        .map(|seed| Contractor {
            id: ContractorId(seed.id.to_string()),
            company_name: seed.company.to_string(),
            availability: AvailabilityStatus::Available,
            service_area: ServiceArea {
                center: Coordinates::new(
                    DEMO_CENTER.lat + seed.lat_offset,
                    DEMO_CENTER.lng + seed.lng_offset,
                ),
                max_radius: seed.radius,
            },
            capacity: Capacity {
                max_active_jobs: seed.max_jobs,
                current_active_jobs: seed.active_jobs,
            },
            performance: PerformanceScore {
                overall: seed.overall,
                bonus_multiplier: seed.multiplier,
            },
            lead_statistics: LeadStatistics {
                lead_share_percentage: seed.share,
                last_lead_received_at: Some(Utc::now() - Duration::hours(seed.max_jobs.into())),
                ..LeadStatistics::default()
            },
        })
        .collect()
}
