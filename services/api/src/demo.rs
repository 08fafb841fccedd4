use crate::infra::{
    build_service, parse_urgency, resolve_contractors, resolve_policy, sample_contractors,
    InMemoryNoticeOutbox, DEMO_CENTER,
};
use chrono::Utc;
use clap::Args;
use lead_dispatch::config::AppConfig;
use lead_dispatch::error::AppError;
use lead_dispatch::workflows::allocation::{
    export_csv, AllocationRequest, AllocationStrategy, AuditQuery, Coordinates, DispatchError,
    Lead, LeadId, LeadUrgency, TracingPublisher,
};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    /// Lead latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lat: f64,
    /// Lead longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lng: f64,
    /// Lead identifier (defaults to a timestamped id)
    #[arg(long)]
    pub(crate) lead_id: Option<String>,
    /// Service category recorded on the lead
    #[arg(long, default_value = "water_damage")]
    pub(crate) category: String,
    /// emergency | urgent | standard | scheduled
    #[arg(long, default_value = "standard", value_parser = parse_urgency)]
    pub(crate) urgency: LeadUrgency,
    /// Selection strategy; falls back to ALLOCATION_DEFAULT_STRATEGY
    #[arg(long)]
    pub(crate) strategy: Option<AllocationStrategy>,
    /// Seed for reproducible weighted-random selection
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Run the decision without committing or notifying
    #[arg(long)]
    pub(crate) simulate: bool,
    /// Allocation policy JSON file
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Contractor roster JSON file; defaults to the built-in sample roster
    #[arg(long)]
    pub(crate) contractors: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// JSON array of leads to allocate before exporting
    #[arg(long)]
    pub(crate) leads: PathBuf,
    /// Contractor roster JSON file; defaults to the built-in sample roster
    #[arg(long)]
    pub(crate) contractors: Option<PathBuf>,
    /// Allocation policy JSON file
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Strategy applied to every lead in the batch
    #[arg(long)]
    pub(crate) strategy: Option<AllocationStrategy>,
    /// Destination CSV file (defaults to stdout)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of synthetic leads to allocate
    #[arg(long, default_value_t = 12)]
    pub(crate) leads: usize,
    /// Seed shared by every simulation and allocation in the run
    #[arg(long, default_value_t = 7)]
    pub(crate) seed: u64,
    /// Print the audit trail as CSV after the run
    #[arg(long)]
    pub(crate) csv: bool,
}

pub(crate) fn run_allocate(args: AllocateArgs) -> Result<(), AppError> {
    let AllocateArgs {
        lat,
        lng,
        lead_id,
        category,
        urgency,
        strategy,
        seed,
        simulate,
        config: policy_path,
        contractors,
    } = args;

    let config = AppConfig::load()?;
    let policy = resolve_policy(&config.dispatch, policy_path.as_deref())?;
    let roster = resolve_contractors(contractors.as_deref())?;
    let service = build_service(&config.dispatch, policy, roster, Arc::new(TracingPublisher))?;

    let now = Utc::now();
    let lead = Lead {
        id: LeadId(lead_id.unwrap_or_else(|| format!("lead-{}", now.timestamp()))),
        location: Coordinates::new(lat, lng),
        urgency,
        category,
        created_at: now,
    };

    let mut request = AllocationRequest::new(lead);
    request.strategy = strategy;
    request.seed = seed;
    request.simulate = simulate;

    match service.allocate(request) {
        Ok(event) => {
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        Err(DispatchError::Failure(failure)) => {
            println!("{}", serde_json::to_string_pretty(&failure)?);
            Err(AppError::Dispatch(DispatchError::Failure(failure)))
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn run_audit_export(args: ExportArgs) -> Result<(), AppError> {
    let ExportArgs {
        leads,
        contractors,
        config: policy_path,
        strategy,
        output,
    } = args;

    let config = AppConfig::load()?;
    let policy = resolve_policy(&config.dispatch, policy_path.as_deref())?;
    let roster = resolve_contractors(contractors.as_deref())?;
    let service = build_service(&config.dispatch, policy, roster, Arc::new(TracingPublisher))?;

    let batch: Vec<Lead> = serde_json::from_reader(BufReader::new(File::open(&leads)?))?;
    for lead in batch {
        let mut request = AllocationRequest::new(lead);
        request.strategy = strategy;
        match service.allocate(request) {
            // Failures are already on the audit trail.
            Ok(_) | Err(DispatchError::Failure(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let entries = service.audit_trail(&AuditQuery::default())?;
    match output {
        Some(path) => export_csv(&entries, File::create(path)?)?,
        None => export_csv(&entries, io::stdout().lock())?,
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { leads, seed, csv } = args;

    let config = AppConfig::load()?;
    let outbox = Arc::new(InMemoryNoticeOutbox::default());
    let service = build_service(
        &config.dispatch,
        config.dispatch.allocation.clone(),
        sample_contractors(),
        outbox.clone(),
    )?;

    println!("Lead dispatch demo");
    println!("Policy:");
    for note in service.config().constraint_notes() {
        println!("  - {note}");
    }

    println!("\nStrategy comparison for one lead (simulated, seed {seed})");
    let sample_lead = demo_lead(0, DEMO_CENTER);
    for strategy in AllocationStrategy::ordered() {
        match service.simulate(sample_lead.clone(), strategy, seed) {
            Ok(event) => println!(
                "  - {:<18} -> {} (score {:.2}, {} eligible, {} rejected)",
                strategy.key(),
                event.allocated_to,
                event.allocation_score.final_score,
                event.eligible_contractors.len(),
                event.rejected_contractors.len()
            ),
            Err(err) => println!("  - {:<18} -> {}", strategy.key(), err),
        }
    }

    println!("\nWeighted-random win probabilities over 1000 trials");
    match service.win_probabilities(&sample_lead, AllocationStrategy::WeightedRandom, 1_000, seed) {
        Ok(estimate) => {
            for row in &estimate.contractors {
                println!(
                    "  - {} {:<26} {:>5.1}% (score {:.2})",
                    row.contractor_id, row.company_name, row.probability, row.final_score
                );
            }
        }
        Err(err) => println!("  - {err}"),
    }

    println!("\nAllocating {leads} leads");
    let strategies = AllocationStrategy::ordered();
    for n in 0..leads {
        let location = scatter(n);
        let strategy = strategies[n % strategies.len()];
        let request = AllocationRequest::new(demo_lead(n + 1, location))
            .with_strategy(strategy)
            .with_seed(seed.wrapping_add(n as u64));
        match service.allocate(request) {
            Ok(event) => println!("  - {}", event.summary()),
            Err(DispatchError::Failure(failure)) => println!("  - {}", failure.summary()),
            Err(err) => return Err(err.into()),
        }
    }

    let report = service.load_report(Utc::now())?;
    println!(
        "\nLoad balance: fairness {} / 100 | redistribution {}",
        report.fairness_score,
        if report.redistribution_needed {
            "recommended"
        } else {
            "not needed"
        }
    );
    for load in &report.contractors {
        println!(
            "  - {} {:<26} {:>2}/{:<2} jobs ({:>5.1}%, {}) | share {:>5.1}% (target {:.1}%)",
            load.contractor_id,
            load.company_name,
            load.current_load,
            load.max_capacity,
            load.utilization_percentage,
            load.status.label(),
            load.share_percentage,
            load.target_share_percentage
        );
    }
    if report.alerts.is_empty() {
        println!("  No health alerts");
    } else {
        println!("  Health alerts:");
        for alert in &report.alerts {
            println!("    - [{:?}] {}", alert.severity, alert.message);
        }
    }

    println!(
        "\nContractor notices queued: {} | statistics updates: {}",
        outbox.notices().len(),
        outbox.statistics_updates()
    );

    if csv {
        let entries = service.audit_trail(&AuditQuery::default())?;
        println!();
        let mut stdout = io::stdout().lock();
        export_csv(&entries, &mut stdout)?;
        stdout.flush()?;
    }

    Ok(())
}

fn demo_lead(n: usize, location: Coordinates) -> Lead {
    let categories = ["water_damage", "fire_damage", "mold", "storm_damage"];
    let urgencies = [
        LeadUrgency::Emergency,
        LeadUrgency::Urgent,
        LeadUrgency::Standard,
        LeadUrgency::Scheduled,
    ];
    Lead {
        id: LeadId(format!("demo-{n:03}")),
        location,
        urgency: urgencies[n % urgencies.len()],
        category: categories[n % categories.len()].to_string(),
        created_at: Utc::now(),
    }
}

/// Deterministic spread of points within roughly ten miles of the demo center.
fn scatter(n: usize) -> Coordinates {
    let angle = n as f64 * 2.399_963;
    let reach = 0.03 + 0.12 * ((n % 5) as f64 / 4.0);
    Coordinates::new(
        DEMO_CENTER.lat + reach * angle.sin(),
        DEMO_CENTER.lng + reach * angle.cos(),
    )
}
