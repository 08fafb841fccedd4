use serde::{Deserialize, Serialize};

use super::config::AllocationConfig;
use super::domain::{Contractor, ContractorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Underutilized,
    Optimal,
    NearCapacity,
    AtCapacity,
}

impl LoadStatus {
    pub fn from_utilization(utilization_percentage: f64) -> Self {
        if utilization_percentage < 50.0 {
            LoadStatus::Underutilized
        } else if utilization_percentage < 80.0 {
            LoadStatus::Optimal
        } else if utilization_percentage < 100.0 {
            LoadStatus::NearCapacity
        } else {
            LoadStatus::AtCapacity
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadStatus::Underutilized => "underutilized",
            LoadStatus::Optimal => "optimal",
            LoadStatus::NearCapacity => "near capacity",
            LoadStatus::AtCapacity => "at capacity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorLoad {
    pub contractor_id: ContractorId,
    pub company_name: String,
    pub current_load: u32,
    pub max_capacity: u32,
    pub utilization_percentage: f64,
    pub leads_this_period: u32,
    pub share_percentage: f64,
    pub target_share_percentage: f64,
    pub deviation: f64,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Capacity,
    Fairness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contractor_id: Option<ContractorId>,
}

/// Distribution health across the contractor pool for the current period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancingReport {
    pub contractors: Vec<ContractorLoad>,
    pub fairness_score: u32,
    pub redistribution_needed: bool,
    pub alerts: Vec<HealthAlert>,
}

impl LoadBalancingReport {
    pub fn from_contractors(contractors: &[Contractor], config: &AllocationConfig) -> Self {
        if contractors.is_empty() {
            return Self {
                contractors: Vec::new(),
                fairness_score: 100,
                redistribution_needed: false,
                alerts: Vec::new(),
            };
        }

        let target = 100.0 / contractors.len() as f64;
        let loads: Vec<ContractorLoad> = contractors
            .iter()
            .map(|contractor| {
                let utilization = contractor.capacity.utilization_percentage();
                let share = contractor.lead_statistics.lead_share_percentage;
                ContractorLoad {
                    contractor_id: contractor.id.clone(),
                    company_name: contractor.company_name.clone(),
                    current_load: contractor.capacity.current_active_jobs,
                    max_capacity: contractor.capacity.max_active_jobs,
                    utilization_percentage: utilization,
                    leads_this_period: contractor.lead_statistics.leads_this_period,
                    share_percentage: share,
                    target_share_percentage: target,
                    deviation: share - target,
                    status: LoadStatus::from_utilization(utilization),
                }
            })
            .collect();

        let redistribution_needed = loads
            .iter()
            .any(|load| load.deviation.abs() > config.rebalance_threshold);

        let mut alerts: Vec<HealthAlert> = loads
            .iter()
            .filter_map(|load| {
                let severity = match load.status {
                    LoadStatus::NearCapacity => AlertSeverity::Medium,
                    LoadStatus::AtCapacity => AlertSeverity::High,
                    _ => return None,
                };
                Some(HealthAlert {
                    severity,
                    kind: AlertKind::Capacity,
                    message: format!("{} is {}", load.company_name, load.status.label()),
                    contractor_id: Some(load.contractor_id.clone()),
                })
            })
            .collect();

        if redistribution_needed {
            alerts.push(HealthAlert {
                severity: AlertSeverity::Low,
                kind: AlertKind::Fairness,
                message: "Load distribution variance exceeds threshold".to_string(),
                contractor_id: None,
            });
        }

        let shares: Vec<f64> = loads.iter().map(|load| load.share_percentage).collect();

        Self {
            fairness_score: fairness_score(&shares),
            contractors: loads,
            redistribution_needed,
            alerts,
        }
    }
}

/// `max(0, round(100 - 2 * population stddev))` of the share percentages.
pub fn fairness_score(shares: &[f64]) -> u32 {
    if shares.is_empty() {
        return 100;
    }
    let count = shares.len() as f64;
    let mean = shares.iter().sum::<f64>() / count;
    let variance = shares
        .iter()
        .map(|share| (share - mean).powi(2))
        .sum::<f64>()
        / count;
    (100.0 - variance.sqrt() * 2.0).round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::allocation::domain::{
        AvailabilityStatus, Capacity, Coordinates, LeadStatistics, PerformanceScore, ServiceArea,
    };

    fn contractor(id: &str, active: u32, max: u32, share: f64) -> Contractor {
        Contractor {
            id: ContractorId(id.to_string()),
            company_name: format!("{id} Restoration"),
            availability: AvailabilityStatus::Available,
            service_area: ServiceArea {
                center: Coordinates::new(0.0, 0.0),
                max_radius: 10.0,
            },
            capacity: Capacity {
                max_active_jobs: max,
                current_active_jobs: active,
            },
            performance: PerformanceScore {
                overall: 75.0,
                bonus_multiplier: 1.0,
            },
            lead_statistics: LeadStatistics {
                lead_share_percentage: share,
                ..LeadStatistics::default()
            },
        }
    }

    #[test]
    fn even_shares_score_perfect_fairness() {
        assert_eq!(fairness_score(&[25.0, 25.0, 25.0, 25.0]), 100);
        assert_eq!(fairness_score(&[]), 100);
    }

    #[test]
    fn skewed_shares_lower_fairness_and_floor_at_zero() {
        // stddev of [0, 100] is 50
        assert_eq!(fairness_score(&[0.0, 100.0]), 0);
        // stddev of [20, 30] is 5
        assert_eq!(fairness_score(&[20.0, 30.0]), 90);
    }

    #[test]
    fn status_bands_follow_utilization() {
        assert_eq!(LoadStatus::from_utilization(25.0), LoadStatus::Underutilized);
        assert_eq!(LoadStatus::from_utilization(50.0), LoadStatus::Optimal);
        assert_eq!(LoadStatus::from_utilization(92.0), LoadStatus::NearCapacity);
        assert_eq!(LoadStatus::from_utilization(100.0), LoadStatus::AtCapacity);
    }

    #[test]
    fn report_flags_capacity_and_redistribution() {
        let contractors = vec![
            contractor("c-1", 5, 10, 60.0),
            contractor("c-2", 9, 10, 30.0),
            contractor("c-3", 10, 10, 10.0),
        ];
        let config = AllocationConfig::default();
        let report = LoadBalancingReport::from_contractors(&contractors, &config);

        assert!(report.redistribution_needed);
        assert_eq!(report.contractors[1].status, LoadStatus::NearCapacity);
        assert!((report.contractors[0].deviation - (60.0 - 100.0 / 3.0)).abs() < 1e-9);

        let capacity_alerts: Vec<_> = report
            .alerts
            .iter()
            .filter(|alert| alert.kind == AlertKind::Capacity)
            .map(|alert| (alert.contractor_id.clone(), alert.severity))
            .collect();
        assert_eq!(
            capacity_alerts,
            vec![
                (Some(ContractorId("c-2".to_string())), AlertSeverity::Medium),
                (Some(ContractorId("c-3".to_string())), AlertSeverity::High),
            ]
        );
        assert!(report
            .alerts
            .iter()
            .any(|alert| alert.kind == AlertKind::Fairness));
    }

    #[test]
    fn balanced_pool_needs_no_redistribution() {
        let contractors = vec![contractor("c-1", 2, 10, 52.0), contractor("c-2", 3, 10, 48.0)];
        let config = AllocationConfig::default();
        let report = LoadBalancingReport::from_contractors(&contractors, &config);

        assert!(!report.redistribution_needed);
        assert!(report.alerts.is_empty());
        assert_eq!(report.fairness_score, 96);
    }
}
