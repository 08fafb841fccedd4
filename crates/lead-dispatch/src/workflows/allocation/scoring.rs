use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::config::{AllocationConfig, AllocationWeights};
use super::deadline::{BudgetExceeded, Deadline, DecisionStage};
use super::domain::ContractorId;
use super::eligibility::EligibleContractor;

pub const BASE_SCORE: f64 = 100.0;
pub const MAX_PERFORMANCE_BONUS: f64 = 15.0;
pub const MAX_PROXIMITY_BONUS: f64 = 10.0;
pub const OVER_SHARE_CAP_PENALTY: f64 = -20.0;
pub const UNDER_HALF_CAP_BOOST: f64 = 10.0;

/// Transparent breakdown of one contractor's desirability for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationScore {
    pub contractor_id: ContractorId,
    pub base_score: f64,
    pub performance_bonus: f64,
    pub proximity_bonus: f64,
    pub load_balancing_adjustment: f64,
    pub final_score: f64,
    pub rank: usize,
}

/// Eligible contractor paired with its score; rank is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContractor<'a> {
    pub eligible: EligibleContractor<'a>,
    pub score: AllocationScore,
}

impl ScoredContractor<'_> {
    pub fn id(&self) -> &ContractorId {
        &self.eligible.contractor.id
    }
}

/// Uplift for multipliers above 1.0, capped at 15 points and never negative.
pub fn performance_bonus(bonus_multiplier: f64) -> f64 {
    let bonus = (bonus_multiplier - 1.0) * 100.0;
    if !bonus.is_finite() {
        return 0.0;
    }
    bonus.clamp(0.0, MAX_PERFORMANCE_BONUS)
}

/// Linear falloff from 10 points at the service-area center to zero at the radius.
pub fn proximity_bonus(distance_miles: f64, max_radius: f64) -> f64 {
    if max_radius <= 0.0 {
        return if distance_miles <= 0.0 {
            MAX_PROXIMITY_BONUS
        } else {
            0.0
        };
    }
    (MAX_PROXIMITY_BONUS * (1.0 - distance_miles / max_radius)).max(0.0)
}

/// Penalise contractors over the lead-share cap, boost those at or below half of it.
pub fn load_balancing_adjustment(
    lead_share_percentage: f64,
    max_lead_share_percentage: f64,
) -> f64 {
    if lead_share_percentage > max_lead_share_percentage {
        OVER_SHARE_CAP_PENALTY
    } else if lead_share_percentage <= max_lead_share_percentage / 2.0 {
        UNDER_HALF_CAP_BOOST
    } else {
        0.0
    }
}

pub fn final_score(
    base_score: f64,
    performance_bonus: f64,
    proximity_bonus: f64,
    load_balancing_adjustment: f64,
    weights: &AllocationWeights,
) -> f64 {
    base_score * weights.fairness
        + (base_score + performance_bonus) * weights.performance
        + (base_score + proximity_bonus) * weights.proximity
        + load_balancing_adjustment
}

/// Score a single eligible contractor. The returned rank is zero until ranked.
pub fn score_contractor(
    eligible: &EligibleContractor<'_>,
    config: &AllocationConfig,
) -> AllocationScore {
    let contractor = eligible.contractor;
    let performance = performance_bonus(contractor.performance.bonus_multiplier);
    let proximity = proximity_bonus(eligible.distance_miles, contractor.service_area.max_radius);
    let adjustment = load_balancing_adjustment(
        contractor.lead_statistics.lead_share_percentage,
        config.max_lead_share_percentage,
    );

    AllocationScore {
        contractor_id: contractor.id.clone(),
        base_score: BASE_SCORE,
        performance_bonus: performance,
        proximity_bonus: proximity,
        load_balancing_adjustment: adjustment,
        final_score: final_score(
            BASE_SCORE,
            performance,
            proximity,
            adjustment,
            &config.weights,
        ),
        rank: 0,
    }
}

/// Descending by final score, ties resolved by the lowest contractor id.
pub(crate) fn rank_order(a: &ScoredContractor<'_>, b: &ScoredContractor<'_>) -> Ordering {
    b.score
        .final_score
        .total_cmp(&a.score.final_score)
        .then_with(|| a.id().cmp(b.id()))
}

/// Score every eligible contractor and return them ranked.
pub fn rank_contractors<'a>(
    eligible: Vec<EligibleContractor<'a>>,
    config: &AllocationConfig,
    deadline: &Deadline,
) -> Result<Vec<ScoredContractor<'a>>, BudgetExceeded> {
    let mut scored = Vec::with_capacity(eligible.len());
    for candidate in eligible {
        deadline.check(DecisionStage::Scoring)?;
        let score = score_contractor(&candidate, config);
        scored.push(ScoredContractor {
            eligible: candidate,
            score,
        });
    }

    scored.sort_by(rank_order);
    for (index, entry) in scored.iter_mut().enumerate() {
        entry.score.rank = index + 1;
    }

    Ok(scored)
}
