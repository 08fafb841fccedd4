use crate::demo::{run_allocate, run_audit_export, run_demo, AllocateArgs, DemoArgs, ExportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lead_dispatch::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Dispatch",
    about = "Allocate inbound service leads to contractors and inspect the decisions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Allocate (or simulate) a single lead and print the decision as JSON
    Allocate(AllocateArgs),
    /// Work with the allocation audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Walk through strategies, a batch of allocations and the load report
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Allocate a batch of leads and export the resulting audit trail as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Allocation policy JSON file; replaces the ALLOCATION_* environment values
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Contractor roster JSON file; defaults to the built-in sample roster
    #[arg(long)]
    pub(crate) contractors: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Allocate(args) => run_allocate(args),
        Command::Audit {
            command: AuditCommand::Export(args),
        } => run_audit_export(args),
        Command::Demo(args) => run_demo(args),
    }
}
