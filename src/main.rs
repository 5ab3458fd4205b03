use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use plan_extract::config::Config;
use plan_extract::export::{self, ExportOptions, OutputMode};
use plan_extract::{ExtractError, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ExtractError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    match cli.command {
        Command::Export(args) => execute_export(&config, args),
        Command::Scenarios => execute_scenarios(&config),
    }
}

fn execute_export(config: &Config, args: ExportArgs) -> Result<()> {
    let options = ExportOptions {
        mode: args.mode.into(),
        scenario: args.scenario,
        output: args.output,
    };
    let summary = export::run_export(config, &options)?;

    if let Some(path) = &summary.file {
        println!("Exported {} sheets to {}", summary.sheet_count, path.display());
    }
    if let Some(report) = &summary.cloud {
        println!(
            "Updated {} tabs in the cloud spreadsheet ({} failed)",
            report.written.len(),
            report.failed.len()
        );
    }
    if !summary.any_written() {
        return Err(ExtractError::NothingPublished(
            summary.failed_targets.join(", "),
        ));
    }
    Ok(())
}

fn execute_scenarios(config: &Config) -> Result<()> {
    let scenarios = export::scenario_listing(config)?;
    println!("Scenarios:");
    for scenario in scenarios {
        println!("- {} (ID: {})", scenario.name, scenario.id);
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Pull portfolio and task data and publish it to a spreadsheet."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export projects, allocations, financials, and milestones.
    Export(ExportArgs),
    /// List the scenarios of the portfolio API.
    Scenarios,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Where to publish the export.
    #[arg(long, value_enum, default_value_t = ModeArg::File)]
    mode: ModeArg,

    /// Scenario alias (from MP_SCENARIO_<ALIAS>) or literal scenario id.
    #[arg(long)]
    scenario: Option<String>,

    /// Workbook path. Defaults to a timestamped file under `data/`.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Cloud,
    File,
    Both,
}

impl std::fmt::Display for ModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeArg::Cloud => write!(f, "cloud"),
            ModeArg::File => write!(f, "file"),
            ModeArg::Both => write!(f, "both"),
        }
    }
}

impl From<ModeArg> for OutputMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cloud => OutputMode::Cloud,
            ModeArg::File => OutputMode::File,
            ModeArg::Both => OutputMode::Both,
        }
    }
}
