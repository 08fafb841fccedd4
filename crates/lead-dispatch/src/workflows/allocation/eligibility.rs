use serde::{Deserialize, Serialize};

use super::config::AllocationConfig;
use super::deadline::{BudgetExceeded, Deadline, DecisionStage};
use super::domain::{AvailabilityStatus, Contractor, ContractorId, Lead};
use super::geo::haversine_miles;

/// Contractor that passed the hard constraints for a single lead.
///
/// Borrowed from the point-in-time snapshot and never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleContractor<'a> {
    pub contractor: &'a Contractor,
    pub distance_miles: f64,
    pub utilization_percentage: f64,
    pub reason: String,
}

/// Why a contractor was excluded before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IneligibilityReason {
    Unavailable {
        status: AvailabilityStatus,
    },
    Saturated {
        utilization_percentage: f64,
        max_capacity_utilization: f64,
    },
    OutsideServiceArea {
        distance_miles: f64,
        max_radius: f64,
    },
}

impl IneligibilityReason {
    pub fn summary(&self) -> String {
        match self {
            IneligibilityReason::Unavailable { status } => {
                format!("contractor is {}", status.label())
            }
            IneligibilityReason::Saturated {
                utilization_percentage,
                max_capacity_utilization,
            } => format!(
                "{:.0}% capacity utilized (cap {}%)",
                utilization_percentage, max_capacity_utilization
            ),
            IneligibilityReason::OutsideServiceArea {
                distance_miles,
                max_radius,
            } => format!(
                "{:.1} mi from lead exceeds {:.1} mi service radius",
                distance_miles, max_radius
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub contractor_id: ContractorId,
    pub reason: IneligibilityReason,
}

/// Filter output: the passing subset plus the audit trail of exclusions.
#[derive(Debug, Clone, Default)]
pub struct EligibilityReport<'a> {
    pub eligible: Vec<EligibleContractor<'a>>,
    pub rejected: Vec<Rejection>,
}

/// Apply availability, saturation, and service-area constraints to one contractor.
pub fn check_eligibility<'a>(
    lead: &Lead,
    contractor: &'a Contractor,
    config: &AllocationConfig,
) -> Result<EligibleContractor<'a>, IneligibilityReason> {
    if !contractor.availability.is_available() {
        return Err(IneligibilityReason::Unavailable {
            status: contractor.availability,
        });
    }

    let utilization = contractor.capacity.utilization_percentage();
    let protection = &config.saturation_protection;
    if protection.enabled && utilization >= protection.max_capacity_utilization {
        return Err(IneligibilityReason::Saturated {
            utilization_percentage: utilization,
            max_capacity_utilization: protection.max_capacity_utilization,
        });
    }

    let distance = haversine_miles(contractor.service_area.center, lead.location);
    // False for a NaN distance or radius.
    let within_radius = distance <= contractor.service_area.max_radius;
    if !within_radius {
        return Err(IneligibilityReason::OutsideServiceArea {
            distance_miles: distance,
            max_radius: contractor.service_area.max_radius,
        });
    }

    Ok(EligibleContractor {
        contractor,
        distance_miles: distance,
        utilization_percentage: utilization,
        reason: format!(
            "Within service area ({:.1} of {:.1} mi), {}% capacity utilized",
            distance,
            contractor.service_area.max_radius,
            utilization.round()
        ),
    })
}

/// Split the pool into eligible and rejected contractors, preserving pool order.
///
/// An empty eligible set is a valid result; deciding that it is a failure is
/// left to the caller.
pub fn filter_eligible<'a>(
    lead: &Lead,
    contractors: &'a [Contractor],
    config: &AllocationConfig,
    deadline: &Deadline,
) -> Result<EligibilityReport<'a>, BudgetExceeded> {
    let mut report = EligibilityReport::default();

    for contractor in contractors {
        deadline.check(DecisionStage::Eligibility)?;
        match check_eligibility(lead, contractor, config) {
            Ok(eligible) => report.eligible.push(eligible),
            Err(reason) => report.rejected.push(Rejection {
                contractor_id: contractor.id.clone(),
                reason,
            }),
        }
    }

    tracing::debug!(
        lead_id = %lead.id,
        eligible = report.eligible.len(),
        rejected = report.rejected.len(),
        "eligibility filter applied"
    );

    Ok(report)
}
