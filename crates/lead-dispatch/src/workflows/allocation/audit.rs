use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ContractorId, EventId, LeadId};
use super::event::{AllocationEvent, AllocationFailure};
use super::strategy::AllocationStrategy;

/// One append-only audit record: a committed (or simulated) decision, an explicit
/// failure, or an operator action such as a manual rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditEntry {
    Allocated(AllocationEvent),
    Failed(AllocationFailure),
    ManualOverride(ManualOverride),
}

impl AuditEntry {
    /// `None` for operator actions, which are not tied to a lead.
    pub fn lead_id(&self) -> Option<&LeadId> {
        match self {
            AuditEntry::Allocated(event) => Some(&event.lead_id),
            AuditEntry::Failed(failure) => Some(&failure.lead_id),
            AuditEntry::ManualOverride(_) => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::Allocated(event) => event.timestamp,
            AuditEntry::Failed(failure) => failure.timestamp,
            AuditEntry::ManualOverride(action) => action.timestamp,
        }
    }

    pub fn strategy(&self) -> Option<AllocationStrategy> {
        match self {
            AuditEntry::Allocated(event) => Some(event.strategy()),
            AuditEntry::Failed(failure) => Some(failure.strategy),
            AuditEntry::ManualOverride(_) => None,
        }
    }

    pub fn contractor_id(&self) -> Option<&ContractorId> {
        match self {
            AuditEntry::Allocated(event) => Some(&event.allocated_to),
            AuditEntry::Failed(_) | AuditEntry::ManualOverride(_) => None,
        }
    }

    pub fn outcome(&self) -> AuditOutcome {
        match self {
            AuditEntry::Allocated(_) => AuditOutcome::Allocated,
            AuditEntry::Failed(_) => AuditOutcome::Failed,
            AuditEntry::ManualOverride(_) => AuditOutcome::ManualOverride,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, AuditEntry::Failed(_))
    }

    pub fn event_type_label(&self) -> &'static str {
        match self {
            AuditEntry::Allocated(event) => event.event_type.label(),
            AuditEntry::Failed(_) => "allocation_failed",
            AuditEntry::ManualOverride(_) => "manual_override",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allocated,
    Failed,
    ManualOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    /// Period counters cleared so every contractor restarts at a zero share.
    Rebalance,
}

impl OverrideAction {
    pub fn label(&self) -> &'static str {
        match self {
            OverrideAction::Rebalance => "Manual load rebalancing triggered",
        }
    }
}

/// Operator intervention recorded beside the allocation decisions it affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub timestamp: DateTime<Utc>,
    pub action: OverrideAction,
    pub performed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub previous_fairness_score: u32,
    pub contractors_affected: usize,
}

/// Filters for the operator audit view. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub lead_id: Option<LeadId>,
    pub contractor_id: Option<ContractorId>,
    pub strategy: Option<AllocationStrategy>,
    pub outcome: Option<AuditOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.lead_id.is_some() && entry.lead_id() != self.lead_id.as_ref() {
            return false;
        }
        if self.contractor_id.is_some() && entry.contractor_id() != self.contractor_id.as_ref() {
            return false;
        }
        if self.strategy.is_some() && entry.strategy() != self.strategy {
            return false;
        }
        if self.outcome.is_some_and(|outcome| entry.outcome() != outcome) {
            return false;
        }

        let timestamp = entry.timestamp();
        self.from.map_or(true, |from| timestamp >= from)
            && self.to.map_or(true, |to| timestamp <= to)
    }
}

/// Append-only sink for decision records.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit store unavailable: {0}")]
    Unavailable(String),
    #[error("audit log lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        Ok(self.entries.lock().map_err(|_| AuditError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Poisoned)?
            .push(entry);
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.lock().map_err(|_| AuditError::Poisoned)?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .filter(|entry| query.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Message handed to the notification dispatcher for the winning contractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationNotice {
    pub template: String,
    pub event_id: EventId,
    pub lead_id: LeadId,
    pub contractor_id: ContractorId,
    pub details: BTreeMap<String, String>,
}

impl AllocationNotice {
    pub const LEAD_ASSIGNED_TEMPLATE: &'static str = "lead_assigned";

    pub fn for_event(event: &AllocationEvent) -> Self {
        let mut details = BTreeMap::new();
        details.insert("strategy".to_string(), event.strategy().to_string());
        details.insert(
            "score".to_string(),
            format!("{:.2}", event.allocation_score.final_score),
        );
        if let Some(winner) = event
            .eligible_contractors
            .iter()
            .find(|candidate| candidate.contractor_id == event.allocated_to)
        {
            details.insert(
                "distance_miles".to_string(),
                format!("{:.1}", winner.distance_miles),
            );
            details.insert(
                "driving_minutes".to_string(),
                winner.driving_minutes.to_string(),
            );
        }

        Self {
            template: Self::LEAD_ASSIGNED_TEMPLATE.to_string(),
            event_id: event.id.clone(),
            lead_id: event.lead_id.clone(),
            contractor_id: event.allocated_to.clone(),
            details,
        }
    }
}

/// Outbound collaborators informed after a committed allocation.
pub trait AllocationPublisher: Send + Sync {
    fn notify_contractor(&self, notice: AllocationNotice) -> Result<(), PublishError>;
    fn record_statistics(&self, event: &AllocationEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("statistics sink rejected event: {0}")]
    Statistics(String),
}

/// Publisher that only logs; useful when no dispatcher is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl AllocationPublisher for TracingPublisher {
    fn notify_contractor(&self, notice: AllocationNotice) -> Result<(), PublishError> {
        tracing::info!(
            contractor_id = %notice.contractor_id,
            lead_id = %notice.lead_id,
            template = %notice.template,
            "contractor notified of lead"
        );
        Ok(())
    }

    fn record_statistics(&self, event: &AllocationEvent) -> Result<(), PublishError> {
        tracing::debug!(event_id = %event.id, "allocation statistics recorded");
        Ok(())
    }
}

const CSV_HEADERS: [&str; 9] = [
    "Timestamp",
    "Event Type",
    "Lead ID",
    "Contractor",
    "Strategy",
    "Score",
    "Success",
    "Eligible Count",
    "Duration (us)",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv export failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Write audit entries as CSV for compliance hand-off.
pub fn export_csv<W: Write>(entries: &[AuditEntry], writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADERS)?;

    for entry in entries {
        let (contractor, score, eligible, duration) = match entry {
            AuditEntry::Allocated(event) => (
                event.allocated_to.to_string(),
                format!("{:.2}", event.allocation_score.final_score),
                event.eligible_contractors.len().to_string(),
                event.audit.decision_duration_us.to_string(),
            ),
            AuditEntry::Failed(_) => (String::new(), String::new(), "0".to_string(), String::new()),
            AuditEntry::ManualOverride(action) => (
                String::new(),
                String::new(),
                action.contractors_affected.to_string(),
                String::new(),
            ),
        };

        csv_writer.write_record([
            entry.timestamp().to_rfc3339(),
            entry.event_type_label().to_string(),
            entry.lead_id().map(ToString::to_string).unwrap_or_default(),
            contractor,
            entry
                .strategy()
                .map_or_else(|| "manual".to_string(), |strategy| strategy.to_string()),
            score,
            entry.is_success().to_string(),
            eligible,
            duration,
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
