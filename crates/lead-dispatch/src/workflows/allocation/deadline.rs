use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default wall-clock budget for a single allocation decision.
pub const DEFAULT_DECISION_BUDGET: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    Eligibility,
    Scoring,
    Selection,
}

impl DecisionStage {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionStage::Eligibility => "eligibility",
            DecisionStage::Scoring => "scoring",
            DecisionStage::Selection => "selection",
        }
    }
}

/// Raised when a decision overruns its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub stage: DecisionStage,
    pub budget: Duration,
}

/// Cooperative time budget checked between units of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self, stage: DecisionStage) -> Result<(), BudgetExceeded> {
        if self.started.elapsed() >= self.budget {
            return Err(BudgetExceeded {
                stage,
                budget: self.budget,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_expires_immediately() {
        let deadline = Deadline::start(Duration::ZERO);
        let err = deadline
            .check(DecisionStage::Scoring)
            .expect_err("zero budget is always exhausted");
        assert_eq!(err.stage, DecisionStage::Scoring);
    }

    #[test]
    fn generous_budget_passes() {
        let deadline = Deadline::start(Duration::from_secs(60));
        assert!(deadline.check(DecisionStage::Eligibility).is_ok());
    }
}
