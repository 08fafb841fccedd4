//! Lead allocation: eligibility filtering, weighted scoring, strategy selection and the
//! per-contractor commit that turns a decision into an assignment.
//!
//! Filtering and scoring are pure functions over a point-in-time contractor snapshot.
//! The only shared mutation is [`store::ContractorStore::commit_assignment`], which is
//! serialised per contractor and re-checks the capacity cap under its lock.

pub mod audit;
pub mod config;
pub mod deadline;
pub mod domain;
pub mod eligibility;
pub mod engine;
pub mod event;
pub mod geo;
pub mod report;
pub mod router;
pub mod scoring;
pub mod service;
pub mod simulation;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use audit::{
    export_csv, AllocationNotice, AllocationPublisher, AuditEntry, AuditError, AuditLog,
    AuditOutcome, AuditQuery, ExportError, InMemoryAuditLog, ManualOverride, OverrideAction,
    PublishError, TracingPublisher,
};
pub use config::{
    AllocationConfig, AllocationConfigError, AllocationWeights, EvaluationPeriod,
    SaturationProtection, ValidatedConfig,
};
pub use deadline::{DecisionStage, DEFAULT_DECISION_BUDGET};
pub use domain::{
    AvailabilityStatus, Capacity, Contractor, ContractorId, Coordinates, EventId, Lead,
    LeadId, LeadStatistics, LeadUrgency, PerformanceScore, ServiceArea,
};
pub use eligibility::{IneligibilityReason, Rejection};
pub use engine::{AllocationEngine, DecisionContext, MAX_ALTERNATES, SYSTEM_ACTOR};
pub use event::{
    AllocationDecision, AllocationEvent, AllocationEventType, AllocationFailure, AuditInfo,
    ConsideredContractor, FailureReason,
};
pub use geo::haversine_miles;
pub use report::{
    AlertKind, AlertSeverity, ContractorLoad, HealthAlert, LoadBalancingReport, LoadStatus,
};
pub use router::allocation_router;
pub use scoring::AllocationScore;
pub use service::{AllocationRequest, DispatchError, LeadDispatchService};
pub use simulation::{WinProbabilities, WinProbability, MAX_SIMULATION_TRIALS};
pub use store::{
    AssignmentCommit, CommitError, ConcurrencyConflict, ContractorStore, InMemoryContractorStore,
    StoreError,
};
pub use strategy::AllocationStrategy;
