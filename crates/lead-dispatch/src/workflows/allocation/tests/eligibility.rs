use std::time::Duration;

use super::common::*;
use crate::workflows::allocation::config::AllocationConfig;
use crate::workflows::allocation::deadline::{Deadline, DecisionStage};
use crate::workflows::allocation::domain::{AvailabilityStatus, Capacity, Coordinates};
use crate::workflows::allocation::eligibility::{
    check_eligibility, filter_eligible, IneligibilityReason,
};

fn generous() -> Deadline {
    Deadline::start(Duration::from_secs(60))
}

#[test]
fn available_contractor_inside_radius_and_under_cap_is_eligible() {
    let contractor = contractor("C-001", 5.0);
    let eligible = check_eligibility(&lead(), &contractor, &config()).expect("eligible");

    assert!((eligible.distance_miles - 5.0).abs() < 1e-6);
    assert!((eligible.utilization_percentage - 20.0).abs() < 1e-9);
    assert_eq!(
        eligible.reason,
        "Within service area (5.0 of 20.0 mi), 20% capacity utilized"
    );
}

#[test]
fn unavailable_statuses_are_rejected() {
    for status in [
        AvailabilityStatus::Busy,
        AvailabilityStatus::Unavailable,
        AvailabilityStatus::OnLeave,
    ] {
        let mut candidate = contractor("C-001", 1.0);
        candidate.availability = status;
        match check_eligibility(&lead(), &candidate, &config()) {
            Err(IneligibilityReason::Unavailable { status: reported }) => {
                assert_eq!(reported, status)
            }
            other => panic!("expected unavailable rejection, got {other:?}"),
        }
    }
}

#[test]
fn utilization_at_cap_is_rejected_when_protection_enabled() {
    let mut candidate = contractor("C-001", 1.0);
    candidate.capacity = Capacity {
        max_active_jobs: 10,
        current_active_jobs: 8,
    };

    match check_eligibility(&lead(), &candidate, &config()) {
        Err(IneligibilityReason::Saturated {
            utilization_percentage,
            max_capacity_utilization,
        }) => {
            assert_eq!(utilization_percentage, 80.0);
            assert_eq!(max_capacity_utilization, 80.0);
        }
        other => panic!("expected saturation rejection, got {other:?}"),
    }

    candidate.capacity.current_active_jobs = 7;
    assert!(check_eligibility(&lead(), &candidate, &config()).is_ok());
}

#[test]
fn saturation_is_ignored_when_protection_disabled() {
    let mut settings = AllocationConfig::default();
    settings.saturation_protection.enabled = false;
    let settings = settings.validate().expect("valid config");

    let mut candidate = contractor("C-001", 1.0);
    candidate.capacity.current_active_jobs = candidate.capacity.max_active_jobs;

    assert!(check_eligibility(&lead(), &candidate, &settings).is_ok());
}

#[test]
fn zero_capacity_contractor_counts_as_saturated() {
    let mut candidate = contractor("C-001", 1.0);
    candidate.capacity = Capacity {
        max_active_jobs: 0,
        current_active_jobs: 0,
    };

    assert!(matches!(
        check_eligibility(&lead(), &candidate, &config()),
        Err(IneligibilityReason::Saturated { .. })
    ));
}

#[test]
fn boundary_radius_is_inclusive_and_beyond_is_rejected() {
    let mut on_boundary = contractor("C-001", 0.0);
    on_boundary.service_area.center = north_of(SYDNEY, 10.0);
    on_boundary.service_area.max_radius = 10.0 + 1e-9;
    assert!(check_eligibility(&lead(), &on_boundary, &config()).is_ok());

    let outside = contractor("C-002", 25.0);
    match check_eligibility(&lead(), &outside, &config()) {
        Err(IneligibilityReason::OutsideServiceArea {
            distance_miles,
            max_radius,
        }) => {
            assert!((distance_miles - 25.0).abs() < 1e-6);
            assert_eq!(max_radius, 20.0);
        }
        other => panic!("expected service-area rejection, got {other:?}"),
    }
}

#[test]
fn non_finite_lead_coordinates_are_outside_every_service_area() {
    let nowhere = lead_at("lead-nan", Coordinates::new(f64::NAN, 0.0));
    let nearby = contractor("C-001", 1.0);

    match check_eligibility(&nowhere, &nearby, &config()) {
        Err(IneligibilityReason::OutsideServiceArea {
            distance_miles,
            max_radius,
        }) => {
            assert!(distance_miles.is_nan());
            assert_eq!(max_radius, 20.0);
        }
        other => panic!("expected service-area rejection, got {other:?}"),
    }

    let candidates = [nearby];
    let report = filter_eligible(&nowhere, &candidates, &config(), &generous()).expect("budget");
    assert!(report.eligible.is_empty());
    assert_eq!(report.rejected.len(), 1);
}

#[test]
fn nan_radius_never_admits_a_lead() {
    let mut candidate = contractor("C-001", 0.0);
    candidate.service_area.max_radius = f64::NAN;
    assert!(matches!(
        check_eligibility(&lead(), &candidate, &config()),
        Err(IneligibilityReason::OutsideServiceArea { .. })
    ));
}

#[test]
fn every_eligible_member_satisfies_all_constraints() {
    let mut pool = Vec::new();
    for (index, distance) in [0.5, 4.0, 12.0, 19.5, 21.0, 40.0].into_iter().enumerate() {
        let mut candidate = contractor(&format!("C-{index:03}"), distance);
        candidate.capacity.current_active_jobs = (index as u32 * 2) % 11;
        if index == 2 {
            candidate.availability = AvailabilityStatus::OnLeave;
        }
        pool.push(candidate);
    }
    let settings = config();

    let report = filter_eligible(&lead(), &pool, &settings, &generous()).expect("within budget");

    assert_eq!(report.eligible.len() + report.rejected.len(), pool.len());
    for member in &report.eligible {
        assert!(member.contractor.availability.is_available());
        assert!(member.utilization_percentage < 80.0);
        assert!(member.distance_miles <= member.contractor.service_area.max_radius);
    }
}

#[test]
fn empty_result_is_not_an_error() {
    let far_lead = lead_at("lead-far", Coordinates::new(51.5, -0.12));
    let pool = vec![contractor("C-001", 1.0), contractor("C-002", 3.0)];

    let report = filter_eligible(&far_lead, &pool, &config(), &generous()).expect("within budget");

    assert!(report.eligible.is_empty());
    assert_eq!(report.rejected.len(), 2);
}

#[test]
fn exhausted_budget_stops_filtering() {
    let pool = vec![contractor("C-001", 1.0)];
    let deadline = Deadline::start(Duration::ZERO);

    let exceeded = filter_eligible(&lead(), &pool, &config(), &deadline)
        .expect_err("zero budget cannot filter");
    assert_eq!(exceeded.stage, DecisionStage::Eligibility);
}
