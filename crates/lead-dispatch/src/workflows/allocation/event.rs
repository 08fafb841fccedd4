use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::deadline::DecisionStage;
use super::domain::{ContractorId, EventId, LeadId};
use super::eligibility::Rejection;
use super::scoring::{AllocationScore, ScoredContractor};
use super::strategy::AllocationStrategy;

/// Rough driving-time estimate used by the dispatch view.
const DRIVING_MINUTES_PER_MILE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationEventType {
    LeadAssigned,
    LeadSimulated,
}

impl AllocationEventType {
    pub fn label(&self) -> &'static str {
        match self {
            AllocationEventType::LeadAssigned => "lead_assigned",
            AllocationEventType::LeadSimulated => "lead_simulated",
        }
    }
}

/// Owned row of the score table considered for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsideredContractor {
    pub contractor_id: ContractorId,
    pub company_name: String,
    pub distance_miles: f64,
    pub driving_minutes: u32,
    pub performance_score: f64,
    pub remaining_capacity: u32,
    pub lead_share_percentage: f64,
    pub score: AllocationScore,
    pub eligibility_reason: String,
}

impl From<&ScoredContractor<'_>> for ConsideredContractor {
    fn from(value: &ScoredContractor<'_>) -> Self {
        let contractor = value.eligible.contractor;
        Self {
            contractor_id: contractor.id.clone(),
            company_name: contractor.company_name.clone(),
            distance_miles: value.eligible.distance_miles,
            driving_minutes: (value.eligible.distance_miles * DRIVING_MINUTES_PER_MILE).round()
                as u32,
            performance_score: contractor.performance.overall,
            remaining_capacity: contractor.capacity.remaining(),
            lead_share_percentage: contractor.lead_statistics.lead_share_percentage,
            score: value.score.clone(),
            eligibility_reason: value.eligible.reason.clone(),
        }
    }
}

/// Why the winner was picked and what else was on the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub strategy: AllocationStrategy,
    pub winner: ContractorId,
    pub reasoning: Vec<String>,
    pub alternates: Vec<ContractorId>,
    /// Highest-ranked contractor other than the winner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_up: Option<ContractorId>,
    /// Winner's final score minus the runner-up's, or the full score when unopposed.
    /// Negative when a rotating or random strategy picked below the top rank.
    #[serde(default)]
    pub margin_of_victory: f64,
    /// Winner's final score over 100.
    #[serde(default)]
    pub confidence: f64,
    pub constraints: Vec<String>,
}

/// Actor and reproducibility metadata stamped on every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub system_version: String,
    pub config_version: u32,
    pub seed: u64,
    pub simulated: bool,
    pub decision_duration_us: u64,
}

/// Immutable, append-only record of one allocation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub id: EventId,
    pub lead_id: LeadId,
    pub timestamp: DateTime<Utc>,
    pub event_type: AllocationEventType,
    pub allocated_to: ContractorId,
    pub allocation_score: AllocationScore,
    pub eligible_contractors: Vec<ConsideredContractor>,
    pub rejected_contractors: Vec<Rejection>,
    pub decision: AllocationDecision,
    pub audit: AuditInfo,
}

impl AllocationEvent {
    pub fn strategy(&self) -> AllocationStrategy {
        self.decision.strategy
    }

    pub fn is_simulation(&self) -> bool {
        self.audit.simulated
    }

    pub fn summary(&self) -> String {
        format!(
            "lead {} allocated to {} via {} (score {:.2}, {} eligible)",
            self.lead_id,
            self.allocated_to,
            self.decision.strategy,
            self.allocation_score.final_score,
            self.eligible_contractors.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NoEligibleContractors {
        pool_size: usize,
        rejected: Vec<Rejection>,
    },
    EngineDisabled,
    BudgetExceeded {
        budget_ms: u64,
        stage: DecisionStage,
    },
}

impl FailureReason {
    pub fn summary(&self) -> String {
        match self {
            FailureReason::NoEligibleContractors {
                pool_size,
                rejected,
            } => {
                if *pool_size == 0 {
                    "no contractors in pool".to_string()
                } else {
                    let detail = rejected
                        .iter()
                        .map(|rejection| {
                            format!("{}: {}", rejection.contractor_id, rejection.reason.summary())
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    format!("no eligible contractors among {pool_size} ({detail})")
                }
            }
            FailureReason::EngineDisabled => "allocation engine disabled".to_string(),
            FailureReason::BudgetExceeded { budget_ms, stage } => format!(
                "decision exceeded {budget_ms} ms budget during {}",
                stage.label()
            ),
        }
    }
}

/// Explicit "no winner" outcome for a lead; never auto-retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationFailure {
    pub lead_id: LeadId,
    pub timestamp: DateTime<Utc>,
    pub strategy: AllocationStrategy,
    pub simulated: bool,
    pub reason: FailureReason,
}

impl AllocationFailure {
    pub fn summary(&self) -> String {
        format!(
            "allocation failed for lead {}: {}",
            self.lead_id,
            self.reason.summary()
        )
    }
}

impl fmt::Display for AllocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for AllocationFailure {}
