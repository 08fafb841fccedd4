use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::config::ValidatedConfig;
use super::deadline::{BudgetExceeded, Deadline, DecisionStage, DEFAULT_DECISION_BUDGET};
use super::domain::{Contractor, EventId, Lead};
use super::eligibility::{filter_eligible, EligibilityReport};
use super::event::{
    AllocationDecision, AllocationEvent, AllocationEventType, AllocationFailure, AuditInfo,
    ConsideredContractor, FailureReason,
};
use super::scoring::rank_contractors;
use super::strategy::AllocationStrategy;

/// Alternates recorded below the winner for operator follow-up.
pub const MAX_ALTERNATES: usize = 2;

pub const SYSTEM_ACTOR: &str = "system";

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_event_id(simulated: bool) -> EventId {
    let id = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let prefix = if simulated { "sim" } else { "alloc" };
    EventId(format!("{prefix}-{id:06}"))
}

/// Everything a single decision reads. All inputs are borrowed and treated as immutable.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub lead: &'a Lead,
    pub contractors: &'a [Contractor],
    pub strategy: AllocationStrategy,
    pub seed: u64,
    pub now: DateTime<Utc>,
    pub simulated: bool,
    pub performed_by: &'a str,
}

/// Stateless decision engine: filter, score, select, and assemble the event.
///
/// The engine never mutates contractor state; committing the winner is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct AllocationEngine {
    config: ValidatedConfig,
    budget: Duration,
}

impl AllocationEngine {
    pub fn new(config: ValidatedConfig) -> Self {
        Self {
            config,
            budget: DEFAULT_DECISION_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn decide(&self, ctx: &DecisionContext<'_>) -> Result<AllocationEvent, AllocationFailure> {
        let deadline = Deadline::start(self.budget);
        let fail = |reason: FailureReason| AllocationFailure {
            lead_id: ctx.lead.id.clone(),
            timestamp: ctx.now,
            strategy: ctx.strategy,
            simulated: ctx.simulated,
            reason,
        };
        let over_budget = |exceeded: BudgetExceeded| {
            fail(FailureReason::BudgetExceeded {
                budget_ms: u64::try_from(exceeded.budget.as_millis()).unwrap_or(u64::MAX),
                stage: exceeded.stage,
            })
        };

        if !self.config.enabled {
            return Err(fail(FailureReason::EngineDisabled));
        }

        let EligibilityReport { eligible, rejected } =
            filter_eligible(ctx.lead, ctx.contractors, &self.config, &deadline)
                .map_err(over_budget)?;
        if eligible.is_empty() {
            return Err(fail(FailureReason::NoEligibleContractors {
                pool_size: ctx.contractors.len(),
                rejected,
            }));
        }

        let ranked = rank_contractors(eligible, &self.config, &deadline).map_err(over_budget)?;
        deadline
            .check(DecisionStage::Selection)
            .map_err(over_budget)?;

        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
        let Some(winner) = ctx.strategy.select(&ranked, &mut rng) else {
            return Err(fail(FailureReason::NoEligibleContractors {
                pool_size: ctx.contractors.len(),
                rejected,
            }));
        };

        let others: Vec<_> = ranked
            .iter()
            .filter(|candidate| candidate.id() != winner.id())
            .collect();
        let alternates = others
            .iter()
            .take(MAX_ALTERNATES)
            .map(|candidate| candidate.id().clone())
            .collect();
        let runner_up = others.first();
        let margin_of_victory = winner.score.final_score
            - runner_up.map_or(0.0, |candidate| candidate.score.final_score);

        let reasoning = vec![
            ctx.strategy.rationale().to_string(),
            format!(
                "Selected {} (rank {} of {}, score {:.2}, {:.1} mi)",
                winner.id(),
                winner.score.rank,
                ranked.len(),
                winner.score.final_score,
                winner.eligible.distance_miles
            ),
        ];

        let event_type = if ctx.simulated {
            AllocationEventType::LeadSimulated
        } else {
            AllocationEventType::LeadAssigned
        };

        let event = AllocationEvent {
            id: next_event_id(ctx.simulated),
            lead_id: ctx.lead.id.clone(),
            timestamp: ctx.now,
            event_type,
            allocated_to: winner.id().clone(),
            allocation_score: winner.score.clone(),
            eligible_contractors: ranked.iter().map(ConsideredContractor::from).collect(),
            rejected_contractors: rejected,
            decision: AllocationDecision {
                strategy: ctx.strategy,
                winner: winner.id().clone(),
                reasoning,
                alternates,
                runner_up: runner_up.map(|candidate| candidate.id().clone()),
                margin_of_victory,
                confidence: winner.score.final_score / 100.0,
                constraints: self.config.constraint_notes(),
            },
            audit: AuditInfo {
                performed_by: ctx.performed_by.to_string(),
                performed_at: ctx.now,
                system_version: env!("CARGO_PKG_VERSION").to_string(),
                config_version: self.config.version,
                seed: ctx.seed,
                simulated: ctx.simulated,
                decision_duration_us: u64::try_from(deadline.elapsed().as_micros())
                    .unwrap_or(u64::MAX),
            },
        };

        tracing::debug!(
            lead_id = %event.lead_id,
            contractor_id = %event.allocated_to,
            strategy = %ctx.strategy,
            score = event.allocation_score.final_score,
            simulated = ctx.simulated,
            "allocation decided"
        );

        Ok(event)
    }
}
