use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::audit::{
    AllocationNotice, AllocationPublisher, AuditEntry, AuditError, AuditLog, AuditQuery,
    ManualOverride, OverrideAction,
};
use super::config::ValidatedConfig;
use super::domain::{Contractor, ContractorId, Lead};
use super::engine::{AllocationEngine, DecisionContext, SYSTEM_ACTOR};
use super::event::{AllocationEvent, AllocationFailure};
use super::report::LoadBalancingReport;
use super::simulation::{estimate_win_probabilities, WinProbabilities, MAX_SIMULATION_TRIALS};
use super::store::{
    AssignmentCommit, CommitError, ConcurrencyConflict, ContractorStore, StoreError,
};
use super::strategy::AllocationStrategy;

/// Inbound allocation call. Missing strategy and seed fall back to the service defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub lead: Lead,
    #[serde(default)]
    pub strategy: Option<AllocationStrategy>,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl AllocationRequest {
    pub fn new(lead: Lead) -> Self {
        Self {
            lead,
            strategy: None,
            simulate: false,
            seed: None,
            performed_by: None,
        }
    }

    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn simulated(mut self) -> Self {
        self.simulate = true;
        self
    }
}

/// Service composing the decision engine with contractor state, audit, and outbound hooks.
pub struct LeadDispatchService<S, L, P> {
    store: Arc<S>,
    audit: Arc<L>,
    publisher: Arc<P>,
    engine: Arc<AllocationEngine>,
    default_strategy: AllocationStrategy,
}

impl<S, L, P> LeadDispatchService<S, L, P>
where
    S: ContractorStore + 'static,
    L: AuditLog + 'static,
    P: AllocationPublisher + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<L>, publisher: Arc<P>, config: ValidatedConfig) -> Self {
        Self {
            store,
            audit,
            publisher,
            engine: Arc::new(AllocationEngine::new(config)),
            default_strategy: AllocationStrategy::WeightedRandom,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.engine = Arc::new((*self.engine).clone().with_budget(budget));
        self
    }

    pub fn with_default_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn config(&self) -> &ValidatedConfig {
        self.engine.config()
    }

    pub fn default_strategy(&self) -> AllocationStrategy {
        self.default_strategy
    }

    /// Run filter, score and select for one lead; commit and emit unless simulating.
    ///
    /// A commit-time conflict is retried once against a fresh snapshot.
    pub fn allocate(&self, request: AllocationRequest) -> Result<AllocationEvent, DispatchError> {
        let strategy = request.strategy.unwrap_or(self.default_strategy);
        let seed = request.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let performed_by = request.performed_by.as_deref().unwrap_or(SYSTEM_ACTOR);

        let mut retried = false;
        loop {
            let now = Utc::now();
            let contractors = self.store.snapshot(now)?;
            let ctx = DecisionContext {
                lead: &request.lead,
                contractors: &contractors,
                strategy,
                seed,
                now,
                simulated: request.simulate,
                performed_by,
            };

            let event = match self.engine.decide(&ctx) {
                Ok(event) => event,
                Err(failure) => return Err(self.record_failure(failure)),
            };

            if request.simulate {
                info!(
                    lead_id = %event.lead_id,
                    contractor_id = %event.allocated_to,
                    strategy = %strategy,
                    "allocation simulated"
                );
                return Ok(event);
            }

            let commit = AssignmentCommit::for_event(&event, self.config().utilization_cap());
            match self.store.commit_assignment(&commit) {
                Ok(_) => return self.emit(event),
                Err(CommitError::Conflict(conflict)) if !retried => {
                    warn!(
                        lead_id = %conflict.lead_id,
                        contractor_id = %conflict.contractor_id,
                        reason = %conflict.reason,
                        "allocation conflicted at commit; retrying with fresh snapshot"
                    );
                    retried = true;
                }
                Err(CommitError::Conflict(conflict)) => {
                    warn!(
                        lead_id = %conflict.lead_id,
                        contractor_id = %conflict.contractor_id,
                        "allocation conflicted after retry"
                    );
                    return Err(DispatchError::Conflict(conflict));
                }
                Err(CommitError::Store(err)) => return Err(err.into()),
            }
        }
    }

    /// Dry run with an explicit seed; never touches contractor state, audit, or notifications.
    pub fn simulate(
        &self,
        lead: Lead,
        strategy: AllocationStrategy,
        seed: u64,
    ) -> Result<AllocationEvent, DispatchError> {
        self.allocate(
            AllocationRequest::new(lead)
                .with_strategy(strategy)
                .with_seed(seed)
                .simulated(),
        )
    }

    /// Repeat a simulated decision `trials` times over one snapshot and tally the winners.
    ///
    /// Nothing is committed, audited or notified, and the same seed always yields
    /// the same distribution for an unchanged roster.
    pub fn win_probabilities(
        &self,
        lead: &Lead,
        strategy: AllocationStrategy,
        trials: u32,
        seed: u64,
    ) -> Result<WinProbabilities, DispatchError> {
        if trials == 0 || trials > MAX_SIMULATION_TRIALS {
            return Err(DispatchError::InvalidTrials {
                requested: trials,
                max: MAX_SIMULATION_TRIALS,
            });
        }

        let now = Utc::now();
        let contractors = self.store.snapshot(now)?;
        let ctx = DecisionContext {
            lead,
            contractors: &contractors,
            strategy,
            seed,
            now,
            simulated: true,
            performed_by: SYSTEM_ACTOR,
        };
        let estimate = estimate_win_probabilities(&self.engine, &ctx, trials)
            .map_err(|failure| self.record_failure(failure))?;

        info!(
            lead_id = %lead.id,
            strategy = %strategy,
            trials,
            seed,
            "win probabilities estimated"
        );
        Ok(estimate)
    }

    /// Operator-triggered rebalance: restart the evaluation period so every
    /// contractor's share starts from zero, and audit who did it.
    pub fn rebalance(
        &self,
        performed_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ManualOverride, DispatchError> {
        let before = self.load_report(now)?;
        self.store.reset_period(now)?;

        let action = ManualOverride {
            timestamp: now,
            action: OverrideAction::Rebalance,
            performed_by: performed_by.to_string(),
            reason,
            previous_fairness_score: before.fairness_score,
            contractors_affected: before.contractors.len(),
        };
        self.audit.append(AuditEntry::ManualOverride(action.clone()))?;

        info!(
            performed_by = %action.performed_by,
            previous_fairness_score = action.previous_fairness_score,
            contractors_affected = action.contractors_affected,
            "manual load rebalance applied"
        );
        Ok(action)
    }

    pub fn audit_trail(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, DispatchError> {
        Ok(self.audit.query(query)?)
    }

    pub fn load_report(&self, now: DateTime<Utc>) -> Result<LoadBalancingReport, DispatchError> {
        let contractors = self.store.snapshot(now)?;
        Ok(LoadBalancingReport::from_contractors(
            &contractors,
            self.config(),
        ))
    }

    pub fn contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, DispatchError> {
        Ok(self.store.get(id)?)
    }

    /// Replace a contractor snapshot pushed by the CRUD layer.
    pub fn upsert_contractor(&self, contractor: Contractor) -> Result<(), DispatchError> {
        self.store.upsert(contractor)?;
        Ok(())
    }

    /// Job lifecycle hook: frees one active-job slot for the contractor.
    pub fn complete_job(&self, id: &ContractorId) -> Result<Contractor, DispatchError> {
        Ok(self.store.release_job(id)?)
    }

    fn record_failure(&self, failure: AllocationFailure) -> DispatchError {
        warn!(
            lead_id = %failure.lead_id,
            strategy = %failure.strategy,
            simulated = failure.simulated,
            reason = %failure.reason.summary(),
            "allocation failed"
        );

        if !failure.simulated {
            if let Err(err) = self.audit.append(AuditEntry::Failed(failure.clone())) {
                warn!(
                    lead_id = %failure.lead_id,
                    error = %err,
                    "failed to audit allocation failure"
                );
            }
        }

        DispatchError::Failure(failure)
    }

    fn emit(&self, event: AllocationEvent) -> Result<AllocationEvent, DispatchError> {
        if let Err(source) = self.audit.append(AuditEntry::Allocated(event.clone())) {
            return Err(DispatchError::Audit {
                event: Box::new(event),
                source,
            });
        }

        info!(
            event_id = %event.id,
            lead_id = %event.lead_id,
            contractor_id = %event.allocated_to,
            strategy = %event.strategy(),
            score = event.allocation_score.final_score,
            "lead allocated"
        );

        if let Err(err) = self
            .publisher
            .notify_contractor(AllocationNotice::for_event(&event))
        {
            warn!(event_id = %event.id, error = %err, "contractor notification failed");
        }
        if let Err(err) = self.publisher.record_statistics(&event) {
            warn!(event_id = %event.id, error = %err, "statistics update failed");
        }

        Ok(event)
    }
}

/// Error raised by the dispatch service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Failure(#[from] AllocationFailure),
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("allocation {} committed but could not be audited: {source}", event.id)]
    Audit {
        event: Box<AllocationEvent>,
        #[source]
        source: AuditError,
    },
    #[error(transparent)]
    AuditLog(#[from] AuditError),
    #[error("trial count {requested} is outside 1..={max}")]
    InvalidTrials { requested: u32, max: u32 },
}
