use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for inbound leads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub String);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for contractors. Ordering doubles as the deterministic tiebreak.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractorId(pub String);

impl fmt::Display for ContractorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for emitted allocation events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pre-resolved latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadUrgency {
    Emergency,
    Urgent,
    Standard,
    Scheduled,
}

impl LeadUrgency {
    pub fn label(&self) -> &'static str {
        match self {
            LeadUrgency::Emergency => "Emergency",
            LeadUrgency::Urgent => "Urgent",
            LeadUrgency::Standard => "Standard",
            LeadUrgency::Scheduled => "Scheduled",
        }
    }
}

/// Inbound service request awaiting assignment. Immutable once produced by intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub location: Coordinates,
    pub urgency: LeadUrgency,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Busy,
    Unavailable,
    OnLeave,
}

impl AvailabilityStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityStatus::Available)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Busy => "busy",
            AvailabilityStatus::Unavailable => "unavailable",
            AvailabilityStatus::OnLeave => "on leave",
        }
    }
}

/// Circular coverage area; the radius is expressed in miles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub center: Coordinates,
    pub max_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_active_jobs: u32,
    pub current_active_jobs: u32,
}

impl Capacity {
    /// Active jobs as a percentage of the maximum. A zero maximum reads as fully utilised.
    pub fn utilization_percentage(&self) -> f64 {
        if self.max_active_jobs == 0 {
            return 100.0;
        }
        self.current_active_jobs as f64 / self.max_active_jobs as f64 * 100.0
    }

    pub fn remaining(&self) -> u32 {
        self.max_active_jobs.saturating_sub(self.current_active_jobs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    /// Overall KPI score on a 0-100 scale.
    pub overall: f64,
    /// Multiplier above 1.0 converts into the scoring engine's performance bonus.
    pub bonus_multiplier: f64,
}

/// Lead distribution counters for the current evaluation period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeadStatistics {
    pub lead_share_percentage: f64,
    #[serde(default)]
    pub leads_this_period: u32,
    #[serde(default)]
    pub total_leads_received: u32,
    #[serde(default)]
    pub last_lead_received_at: Option<DateTime<Utc>>,
}

/// Service provider snapshot as supplied by the contractor CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: ContractorId,
    pub company_name: String,
    pub availability: AvailabilityStatus,
    pub service_area: ServiceArea,
    pub capacity: Capacity,
    pub performance: PerformanceScore,
    #[serde(default)]
    pub lead_statistics: LeadStatistics,
}
