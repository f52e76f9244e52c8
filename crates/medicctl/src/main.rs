//! Medic Control - CLI for fleetmedic
//!
//! Runs one engine operation against an Ansible inventory and prints its
//! report as JSON on stdout.

mod commands;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use medic_common::auto_heal::Impact;
use medic_common::baseline::BaselineCategory;
use medic_common::config::MedicConfig;
use medic_common::diagnose::DiagnosticCheck;
use medic_common::error::{ErrorReport, MedicError};
use medic_common::security::AuditCategory;
use medic_common::service::ServiceAction;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medicctl")]
#[command(about = "Fleetmedic - fleet diagnosis, audit and auto-heal over Ansible", long_about = None)]
#[command(version)]
struct Cli {
    /// Project to run against (overrides env and saved default)
    #[arg(long, global = true)]
    project: Option<String>,

    /// Inventory path or host list, overrides config and project
    #[arg(short, long, global = true)]
    inventory: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run health diagnostics and score the result
    Diagnose {
        host: String,

        /// Checks to run (system, network, security, performance)
        #[arg(long, value_delimiter = ',')]
        checks: Vec<DiagnosticCheck>,

        /// Skip health scoring
        #[arg(long)]
        no_recommendations: bool,
    },

    /// Security audit
    Audit {
        host: String,

        /// Categories to audit (packages, permissions, network, config)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<AuditCategory>,

        /// Skip the scored assessment
        #[arg(long)]
        no_report: bool,
    },

    /// Fetch and analyse log files
    Logs {
        host: String,

        #[arg(required = true)]
        paths: Vec<String>,

        /// Lines to tail per log (default from config)
        #[arg(short = 'n', long)]
        lines: Option<usize>,

        /// Keep only lines matching this regex
        #[arg(long)]
        filter: Option<String>,

        /// Skip pattern analysis
        #[arg(long)]
        no_analyze: bool,
    },

    /// Search logs for patterns and correlate hits in time
    Hunt {
        host: String,

        /// Pattern to search for (repeatable)
        #[arg(short, long = "pattern", required = true)]
        patterns: Vec<String>,

        /// Log to search (repeatable, default: common system logs)
        #[arg(short, long = "log")]
        logs: Vec<String>,

        /// Journal look-back such as 6h or 2d
        #[arg(long)]
        since: Option<String>,

        /// Correlation window in seconds (default from config)
        #[arg(long)]
        window: Option<u64>,
    },

    /// Plan and optionally apply remediation for symptoms
    Heal {
        host: String,

        /// Symptom tags (high_cpu, high_memory, disk_full, service_failed)
        #[arg(required = true)]
        symptoms: Vec<String>,

        /// Highest impact allowed
        #[arg(long, default_value = "low")]
        max_impact: Impact,

        /// Run the actions instead of a dry run
        #[arg(long)]
        execute: bool,
    },

    /// Sample health over time and report trends
    Monitor {
        host: String,

        /// Total duration in seconds (default from config)
        #[arg(long)]
        duration: Option<u64>,

        /// Seconds between samples (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run performance micro-benchmarks
    Bench {
        host: String,

        #[arg(long, default_value_t = medic_common::performance::DEFAULT_BENCHMARK_SECS)]
        duration: u64,

        /// Return a baseline id with the results
        #[arg(long)]
        store_baseline: bool,
    },

    /// Capture or compare state snapshots
    Baseline {
        #[command(subcommand)]
        action: BaselineCommand,
    },

    /// Connectivity matrix between host groups
    Matrix {
        #[arg(required = true)]
        sources: Vec<String>,

        /// Target host (repeatable, default: the sources)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Port to test (repeatable, default: 22, 80, 443)
        #[arg(short, long = "port")]
        ports: Vec<u16>,
    },

    /// Manage a service
    Service {
        host: String,
        name: String,

        /// status, start, stop, restart or reload
        #[arg(default_value = "status")]
        action: ServiceAction,

        /// Include recent journal lines
        #[arg(long)]
        logs: bool,
    },

    /// Gather host facts
    Facts {
        host: String,

        #[arg(long)]
        subset: Option<String>,

        #[arg(long)]
        filter: Option<String>,
    },

    /// Score a JSON metrics object locally (file or - for stdin)
    Score {
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Analyse a local log file (or - for stdin)
    Analyze {
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Manage saved projects
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },
}

#[derive(Subcommand)]
enum BaselineCommand {
    /// Capture a named snapshot
    Capture {
        host: String,
        name: String,

        /// Categories (configs, processes, network, performance)
        #[arg(long, value_delimiter = ',')]
        include: Vec<BaselineCategory>,
    },

    /// Compare current state with a snapshot id
    Compare {
        host: String,
        baseline_id: String,

        /// Name for the current snapshot
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Add or replace a project
    Register {
        name: String,
        root: PathBuf,

        #[arg(long)]
        inventory: Option<String>,

        #[arg(long = "roles-path")]
        roles_paths: Vec<String>,

        #[arg(long = "collections-path")]
        collections_paths: Vec<String>,

        /// Make it the default project
        #[arg(long)]
        default: bool,
    },

    /// List saved projects and the active one
    List,
}

/// RUST_LOG wins, then -v flags, then the configured level
fn init_tracing(verbose: u8, config_level: &str) {
    let fallback = match verbose {
        0 => config_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match MedicConfig::load() {
        Ok(config) => config,
        Err(e) => return input_failure(&e),
    };
    init_tracing(cli.verbose, &config.log.level);

    match commands::run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => match e.downcast_ref::<MedicError>() {
            Some(medic) => input_failure(medic),
            None => {
                output::error(&format!("{:#}", e));
                ExitCode::from(1)
            }
        },
    }
}

fn input_failure(err: &MedicError) -> ExitCode {
    output::error(&err.to_string());
    output::print_json(&ErrorReport::from(err));
    ExitCode::from(2)
}
