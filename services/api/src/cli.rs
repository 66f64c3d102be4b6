use crate::demo::{run_demo, DemoArgs};
use crate::infra::build_directory;
use crate::server;
use clap::{Args, Parser, Subcommand};
use profile_directory::config::AppConfig;
use profile_directory::error::AppError;
use profile_directory::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "Profile Directory",
    about = "Run and operate the profile directory service from the command line",
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
    /// Repair an under-populated listings store and print the report as JSON
    Reconcile(ReconcileArgs),
    /// Walk a submission through intake, moderation, and promotion against in-memory stores
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ReconcileArgs {
    /// Minimum listing count before a repair runs (defaults to the seed size)
    #[arg(long)]
    pub(crate) threshold: Option<usize>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Reconcile(args) => run_reconcile(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

async fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if args.threshold.is_some() {
        config.storage.expected_listings = args.threshold;
    }
    telemetry::init(&config.telemetry)?;

    let directory = build_directory(&config)?;
    let outcome = directory.service.reconcile().await;
    if let Some(primary) = directory.primary {
        primary.close().await;
    }

    let report = outcome?;
    serde_json::to_writer_pretty(std::io::stdout().lock(), &report).map_err(std::io::Error::from)?;
    println!();
    Ok(())
}
