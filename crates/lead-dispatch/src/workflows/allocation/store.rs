use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Contractor, ContractorId, LeadId};
use super::event::AllocationEvent;

/// Winner increment applied after a real (non-simulated) decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentCommit {
    pub lead_id: LeadId,
    pub contractor_id: ContractorId,
    pub assigned_at: DateTime<Utc>,
    /// Utilisation cap to re-check under the contractor lock, if saturation protection is on.
    pub utilization_cap: Option<f64>,
}

impl AssignmentCommit {
    pub fn for_event(event: &AllocationEvent, utilization_cap: Option<f64>) -> Self {
        Self {
            lead_id: event.lead_id.clone(),
            contractor_id: event.allocated_to.clone(),
            assigned_at: event.timestamp,
            utilization_cap,
        }
    }
}

/// Two allocations raced for the same contractor's capacity boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("concurrency conflict assigning lead {lead_id} to {contractor_id}: {reason}")]
pub struct ConcurrencyConflict {
    pub lead_id: LeadId,
    pub contractor_id: ContractorId,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("contractor {0} not found")]
    NotFound(ContractorId),
    #[error("contractor store lock poisoned")]
    Poisoned,
    #[error("contractor store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Contractor state owned by the persistence layer.
///
/// Snapshots are point-in-time copies that filtering and scoring read
/// without locks; `commit_assignment` is the only shared mutation on the
/// allocation path and must be serialised per contractor.
pub trait ContractorStore: Send + Sync {
    fn snapshot(&self, now: DateTime<Utc>) -> Result<Vec<Contractor>, StoreError>;
    fn get(&self, id: &ContractorId) -> Result<Option<Contractor>, StoreError>;
    fn upsert(&self, contractor: Contractor) -> Result<(), StoreError>;
    fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<Contractor, CommitError>;
    fn release_job(&self, id: &ContractorId) -> Result<Contractor, StoreError>;
    /// Start a new evaluation period, clearing per-period lead counters.
    fn reset_period(&self, started_at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct PeriodWindow {
    started_at: DateTime<Utc>,
    length: Duration,
}

/// In-process store with one mutex per contractor.
///
/// The outer `RwLock` guards membership and the period total. Commits hold its
/// read side for their whole duration plus the single contractor's mutex, so
/// commits for different contractors never contend. Upserts and period resets
/// take the write side and never interleave with a commit.
#[derive(Debug)]
pub struct InMemoryContractorStore {
    contractors: RwLock<BTreeMap<ContractorId, Arc<Mutex<Contractor>>>>,
    period: Mutex<PeriodWindow>,
    period_total: AtomicU64,
}

impl InMemoryContractorStore {
    pub fn new(period_started_at: DateTime<Utc>, period_length: Duration) -> Self {
        Self {
            contractors: RwLock::new(BTreeMap::new()),
            period: Mutex::new(PeriodWindow {
                started_at: period_started_at,
                length: period_length,
            }),
            period_total: AtomicU64::new(0),
        }
    }

    pub fn with_contractors(
        period_started_at: DateTime<Utc>,
        period_length: Duration,
        contractors: impl IntoIterator<Item = Contractor>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(period_started_at, period_length);
        for contractor in contractors {
            store.upsert(contractor)?;
        }
        Ok(store)
    }

    pub fn period_total(&self) -> u64 {
        self.period_total.load(Ordering::Acquire)
    }

    fn clear_period_counters(&self) -> Result<(), StoreError> {
        let contractors = self.contractors.write().map_err(|_| StoreError::Poisoned)?;
        for entry in contractors.values() {
            let mut contractor = entry.lock().map_err(|_| StoreError::Poisoned)?;
            contractor.lead_statistics.leads_this_period = 0;
            contractor.lead_statistics.lead_share_percentage = 0.0;
        }
        self.period_total.store(0, Ordering::Release);
        Ok(())
    }

    fn roll_period_if_elapsed(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut window = self.period.lock().map_err(|_| StoreError::Poisoned)?;
        if now < window.started_at + window.length {
            return Ok(());
        }

        let period_seconds = window.length.num_seconds().max(1);
        let elapsed_periods = (now - window.started_at).num_seconds() / period_seconds;
        window.started_at += Duration::seconds(elapsed_periods * period_seconds);
        self.clear_period_counters()?;
        tracing::info!(
            period_started_at = %window.started_at,
            "lead share evaluation period rolled over"
        );
        Ok(())
    }

    fn entry(&self, id: &ContractorId) -> Result<Arc<Mutex<Contractor>>, StoreError> {
        let contractors = self.contractors.read().map_err(|_| StoreError::Poisoned)?;
        contractors
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

fn share_of(leads_this_period: u32, period_total: u64) -> f64 {
    (leads_this_period as f64 / period_total as f64 * 100.0).min(100.0)
}

impl ContractorStore for InMemoryContractorStore {
    fn snapshot(&self, now: DateTime<Utc>) -> Result<Vec<Contractor>, StoreError> {
        self.roll_period_if_elapsed(now)?;

        let contractors = self.contractors.read().map_err(|_| StoreError::Poisoned)?;
        let total = self.period_total.load(Ordering::Acquire);
        let mut snapshot = Vec::with_capacity(contractors.len());
        for entry in contractors.values() {
            let mut contractor = entry.lock().map_err(|_| StoreError::Poisoned)?.clone();
            if total > 0 {
                contractor.lead_statistics.lead_share_percentage =
                    share_of(contractor.lead_statistics.leads_this_period, total);
            }
            snapshot.push(contractor);
        }
        Ok(snapshot)
    }

    fn get(&self, id: &ContractorId) -> Result<Option<Contractor>, StoreError> {
        let contractors = self.contractors.read().map_err(|_| StoreError::Poisoned)?;
        match contractors.get(id) {
            Some(entry) => Ok(Some(
                entry.lock().map_err(|_| StoreError::Poisoned)?.clone(),
            )),
            None => Ok(None),
        }
    }

    fn upsert(&self, contractor: Contractor) -> Result<(), StoreError> {
        let mut contractors = self.contractors.write().map_err(|_| StoreError::Poisoned)?;
        let added = contractor.lead_statistics.leads_this_period as u64;
        let removed = match contractors.get(&contractor.id) {
            Some(existing) => {
                let mut current = existing.lock().map_err(|_| StoreError::Poisoned)?;
                let previous = current.lead_statistics.leads_this_period as u64;
                *current = contractor;
                previous
            }
            None => {
                contractors.insert(contractor.id.clone(), Arc::new(Mutex::new(contractor)));
                0
            }
        };

        if added >= removed {
            self.period_total.fetch_add(added - removed, Ordering::AcqRel);
        } else {
            self.period_total.fetch_sub(removed - added, Ordering::AcqRel);
        }
        Ok(())
    }

    fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<Contractor, CommitError> {
        let contractors = self.contractors.read().map_err(|_| StoreError::Poisoned)?;
        let entry = contractors
            .get(&commit.contractor_id)
            .ok_or_else(|| StoreError::NotFound(commit.contractor_id.clone()))?;
        let mut contractor = entry.lock().map_err(|_| StoreError::Poisoned)?;

        let conflict = |reason: String| ConcurrencyConflict {
            lead_id: commit.lead_id.clone(),
            contractor_id: commit.contractor_id.clone(),
            reason,
        };

        if !contractor.availability.is_available() {
            return Err(conflict(format!(
                "contractor became {}",
                contractor.availability.label()
            ))
            .into());
        }
        if let Some(cap) = commit.utilization_cap {
            let utilization = contractor.capacity.utilization_percentage();
            if utilization >= cap {
                return Err(conflict(format!(
                    "capacity reached {:.0}% (cap {}%)",
                    utilization, cap
                ))
                .into());
            }
        }

        contractor.capacity.current_active_jobs =
            contractor.capacity.current_active_jobs.saturating_add(1);
        let stats = &mut contractor.lead_statistics;
        stats.leads_this_period = stats.leads_this_period.saturating_add(1);
        stats.total_leads_received = stats.total_leads_received.saturating_add(1);
        stats.last_lead_received_at = Some(
            stats
                .last_lead_received_at
                .map_or(commit.assigned_at, |previous| previous.max(commit.assigned_at)),
        );
        let total = self.period_total.fetch_add(1, Ordering::AcqRel) + 1;
        stats.lead_share_percentage = share_of(stats.leads_this_period, total);

        Ok(contractor.clone())
    }

    fn release_job(&self, id: &ContractorId) -> Result<Contractor, StoreError> {
        let entry = self.entry(id)?;
        let mut contractor = entry.lock().map_err(|_| StoreError::Poisoned)?;
        contractor.capacity.current_active_jobs =
            contractor.capacity.current_active_jobs.saturating_sub(1);
        Ok(contractor.clone())
    }

    fn reset_period(&self, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut window = self.period.lock().map_err(|_| StoreError::Poisoned)?;
        self.clear_period_counters()?;
        window.started_at = started_at;
        Ok(())
    }
}
