use std::ops::Deref;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tolerance applied when checking that the three weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Window over which lead share percentages are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl EvaluationPeriod {
    pub fn length(&self) -> Duration {
        match self {
            EvaluationPeriod::Daily => Duration::days(1),
            EvaluationPeriod::Weekly => Duration::days(7),
            EvaluationPeriod::Monthly => Duration::days(30),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EvaluationPeriod::Daily => "daily",
            EvaluationPeriod::Weekly => "weekly",
            EvaluationPeriod::Monthly => "monthly",
        }
    }
}

impl FromStr for EvaluationPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown evaluation period '{other}'")),
        }
    }
}

/// Capacity-utilisation cap that keeps contractors from being overloaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationProtection {
    pub enabled: bool,
    pub max_capacity_utilization: f64,
    pub cooldown_minutes: u32,
}

/// Operator dials trading fairness against performance and proximity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationWeights {
    pub fairness: f64,
    pub performance: f64,
    pub proximity: f64,
}

impl AllocationWeights {
    pub fn sum(&self) -> f64 {
        self.fairness + self.performance + self.proximity
    }
}

/// Versioned allocation policy injected by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub enabled: bool,
    pub max_lead_share_percentage: f64,
    pub evaluation_period: EvaluationPeriod,
    pub rebalance_threshold: f64,
    pub saturation_protection: SaturationProtection,
    pub weights: AllocationWeights,
}

fn default_version() -> u32 {
    1
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            enabled: true,
            max_lead_share_percentage: 40.0,
            evaluation_period: EvaluationPeriod::Monthly,
            rebalance_threshold: 10.0,
            saturation_protection: SaturationProtection {
                enabled: true,
                max_capacity_utilization: 80.0,
                cooldown_minutes: 30,
            },
            weights: AllocationWeights {
                fairness: 0.4,
                performance: 0.4,
                proximity: 0.2,
            },
        }
    }
}

impl AllocationConfig {
    /// Reject inconsistent policies before any allocation can run against them.
    pub fn validate(self) -> Result<ValidatedConfig, AllocationConfigError> {
        let weights = [
            ("fairness", self.weights.fairness),
            ("performance", self.weights.performance),
            ("proximity", self.weights.proximity),
        ];
        for (name, value) in weights {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AllocationConfigError::WeightOutOfRange { name, value });
            }
        }

        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AllocationConfigError::WeightsDoNotSumToOne { sum });
        }

        let share = self.max_lead_share_percentage;
        if !share.is_finite() || share <= 0.0 || share > 100.0 {
            return Err(AllocationConfigError::LeadShareOutOfRange(share));
        }

        let utilization = self.saturation_protection.max_capacity_utilization;
        if !utilization.is_finite() || utilization <= 0.0 || utilization > 100.0 {
            return Err(AllocationConfigError::UtilizationOutOfRange(utilization));
        }

        let threshold = self.rebalance_threshold;
        if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
            return Err(AllocationConfigError::RebalanceThresholdOutOfRange(threshold));
        }

        Ok(ValidatedConfig(self))
    }
}

/// An [`AllocationConfig`] that passed validation. Only this type can drive the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AllocationConfig", into = "AllocationConfig")]
pub struct ValidatedConfig(AllocationConfig);

impl ValidatedConfig {
    pub fn into_inner(self) -> AllocationConfig {
        self.0
    }

    /// Capacity cap to enforce, or `None` when saturation protection is off.
    pub fn utilization_cap(&self) -> Option<f64> {
        self.0
            .saturation_protection
            .enabled
            .then_some(self.0.saturation_protection.max_capacity_utilization)
    }

    /// Human-readable rendering of the constraints active for a decision.
    pub fn constraint_notes(&self) -> Vec<String> {
        let config = &self.0;
        let mut notes = vec![format!(
            "Max lead share: {}%",
            config.max_lead_share_percentage
        )];
        match self.utilization_cap() {
            Some(cap) => {
                notes.push(format!("Max capacity utilization: {cap}%"));
                notes.push(format!(
                    "Saturation cooldown: {} min",
                    config.saturation_protection.cooldown_minutes
                ));
            }
            None => notes.push("Saturation protection disabled".to_string()),
        }
        notes.push(format!(
            "Evaluation period: {}",
            config.evaluation_period.label()
        ));
        notes.push(format!(
            "Weights: fairness {:.2}, performance {:.2}, proximity {:.2}",
            config.weights.fairness, config.weights.performance, config.weights.proximity
        ));
        notes
    }
}

impl Deref for ValidatedConfig {
    type Target = AllocationConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<AllocationConfig> for ValidatedConfig {
    type Error = AllocationConfigError;

    fn try_from(value: AllocationConfig) -> Result<Self, Self::Error> {
        value.validate()
    }
}

impl From<ValidatedConfig> for AllocationConfig {
    fn from(value: ValidatedConfig) -> Self {
        value.0
    }
}

/// Configuration rejected at load time. Fatal and never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationConfigError {
    #[error("allocation weights must sum to 1.0 (found {sum:.6})")]
    WeightsDoNotSumToOne { sum: f64 },
    #[error("{name} weight must be within [0, 1] (found {value})")]
    WeightOutOfRange { name: &'static str, value: f64 },
    #[error("max lead share percentage must be within (0, 100] (found {0})")]
    LeadShareOutOfRange(f64),
    #[error("max capacity utilization must be within (0, 100] (found {0})")]
    UtilizationOutOfRange(f64),
    #[error("rebalance threshold must be within [0, 100] (found {0})")]
    RebalanceThresholdOutOfRange(f64),
}
