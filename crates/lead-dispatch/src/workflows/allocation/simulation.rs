use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::domain::{ContractorId, LeadId};
use super::engine::{AllocationEngine, DecisionContext};
use super::event::AllocationFailure;
use super::strategy::AllocationStrategy;

/// Upper bound on trials per estimate; each trial is a full simulated decision.
pub const MAX_SIMULATION_TRIALS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinProbability {
    pub contractor_id: ContractorId,
    pub company_name: String,
    pub wins: u32,
    /// Share of trials won, as a percentage.
    pub probability: f64,
    pub final_score: f64,
}

/// How often each eligible contractor wins a lead across repeated seeded decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinProbabilities {
    pub lead_id: LeadId,
    pub strategy: AllocationStrategy,
    pub trials: u32,
    pub seed: u64,
    /// Ordered by probability, highest first; contractors that never won are kept.
    pub contractors: Vec<WinProbability>,
}

/// Run `trials` simulated decisions over the context's snapshot.
///
/// `ctx.seed` keys a ChaCha stream that supplies each trial's seed, so the same
/// seed reproduces the same distribution. The first failed trial aborts the
/// estimate.
pub fn estimate_win_probabilities(
    engine: &AllocationEngine,
    ctx: &DecisionContext<'_>,
    trials: u32,
) -> Result<WinProbabilities, AllocationFailure> {
    let mut seeds = ChaCha20Rng::seed_from_u64(ctx.seed);
    let mut tally: BTreeMap<ContractorId, WinProbability> = BTreeMap::new();

    for _ in 0..trials {
        let event = engine.decide(&DecisionContext {
            seed: seeds.next_u64(),
            simulated: true,
            ..*ctx
        })?;

        if tally.is_empty() {
            for considered in &event.eligible_contractors {
                tally.insert(
                    considered.contractor_id.clone(),
                    WinProbability {
                        contractor_id: considered.contractor_id.clone(),
                        company_name: considered.company_name.clone(),
                        wins: 0,
                        probability: 0.0,
                        final_score: considered.score.final_score,
                    },
                );
            }
        }
        if let Some(winner) = tally.get_mut(&event.allocated_to) {
            winner.wins += 1;
        }
    }

    let mut rows: Vec<WinProbability> = tally
        .into_values()
        .map(|mut row| {
            row.probability = f64::from(row.wins) / f64::from(trials) * 100.0;
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| a.contractor_id.cmp(&b.contractor_id))
    });

    Ok(WinProbabilities {
        lead_id: ctx.lead.id.clone(),
        strategy: ctx.strategy,
        trials,
        seed: ctx.seed,
        contractors: rows,
    })
}
