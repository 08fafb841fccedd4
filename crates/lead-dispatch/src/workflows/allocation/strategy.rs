use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::scoring::ScoredContractor;

/// Interchangeable algorithms turning a ranked, eligible set into one winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    RoundRobin,
    PerformanceBased,
    ProximityBased,
    WeightedRandom,
}

impl AllocationStrategy {
    pub fn ordered() -> [AllocationStrategy; 4] {
        [
            AllocationStrategy::RoundRobin,
            AllocationStrategy::PerformanceBased,
            AllocationStrategy::ProximityBased,
            AllocationStrategy::WeightedRandom,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            AllocationStrategy::RoundRobin => "round_robin",
            AllocationStrategy::PerformanceBased => "performance_based",
            AllocationStrategy::ProximityBased => "proximity_based",
            AllocationStrategy::WeightedRandom => "weighted_random",
        }
    }

    pub fn rationale(&self) -> &'static str {
        match self {
            AllocationStrategy::RoundRobin => "Round-robin allocation ensures equal distribution",
            AllocationStrategy::PerformanceBased => "Allocated to highest performing contractor",
            AllocationStrategy::ProximityBased => "Allocated to closest contractor",
            AllocationStrategy::WeightedRandom => "Weighted random selection based on score",
        }
    }

    /// Pick a winner from `ranked`, which must already be in rank order.
    ///
    /// Only [`AllocationStrategy::WeightedRandom`] draws from `rng`; every
    /// strategy returns `None` on an empty set.
    pub fn select<'s, 'a, R: Rng>(
        &self,
        ranked: &'s [ScoredContractor<'a>],
        rng: &mut R,
    ) -> Option<&'s ScoredContractor<'a>> {
        match self {
            AllocationStrategy::RoundRobin => round_robin(ranked),
            AllocationStrategy::PerformanceBased => ranked.first(),
            AllocationStrategy::ProximityBased => proximity_based(ranked),
            AllocationStrategy::WeightedRandom => weighted_random(ranked, rng),
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AllocationStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        AllocationStrategy::ordered()
            .into_iter()
            .find(|strategy| strategy.key() == normalized)
            .ok_or_else(|| format!("unknown allocation strategy '{value}'"))
    }
}

fn last_received(candidate: &ScoredContractor<'_>) -> DateTime<Utc> {
    candidate
        .eligible
        .contractor
        .lead_statistics
        .last_lead_received_at
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Longest-idle contractor first; never-assigned contractors count as idle since the epoch.
fn round_robin<'s, 'a>(ranked: &'s [ScoredContractor<'a>]) -> Option<&'s ScoredContractor<'a>> {
    ranked.iter().min_by(|a, b| {
        last_received(a)
            .cmp(&last_received(b))
            .then_with(|| a.id().cmp(b.id()))
    })
}

fn proximity_based<'s, 'a>(
    ranked: &'s [ScoredContractor<'a>],
) -> Option<&'s ScoredContractor<'a>> {
    ranked.iter().min_by(|a, b| {
        a.eligible
            .distance_miles
            .total_cmp(&b.eligible.distance_miles)
            .then_with(|| a.id().cmp(b.id()))
    })
}

fn selection_weight(candidate: &ScoredContractor<'_>) -> f64 {
    let score = candidate.score.final_score;
    if score.is_finite() && score > 0.0 {
        score
    } else {
        0.0
    }
}

/// Roulette-wheel draw over final scores in rank order.
fn weighted_random<'s, 'a, R: Rng>(
    ranked: &'s [ScoredContractor<'a>],
    rng: &mut R,
) -> Option<&'s ScoredContractor<'a>> {
    let total_weight: f64 = ranked.iter().map(selection_weight).sum();
    if !total_weight.is_finite() || total_weight <= 0.0 {
        return ranked.first();
    }

    let target = rng.gen_range(0.0..total_weight);
    let mut running = 0.0;
    for candidate in ranked {
        running += selection_weight(candidate);
        if running > target {
            return Some(candidate);
        }
    }

    // Accumulated rounding can leave `running` a hair under `target`.
    ranked
        .iter()
        .rev()
        .find(|candidate| selection_weight(candidate) > 0.0)
}
