//! Command handlers for medicctl.

use anyhow::{Context, Result};
use medic_common::auto_heal::AutoHealer;
use medic_common::baseline::BaselineManager;
use medic_common::config::{MedicConfig, ProjectDefinition};
use medic_common::diagnose::DiagnosticOrchestrator;
use medic_common::error::MedicError;
use medic_common::executor::AnsibleExecutor;
use medic_common::facts::FactsCollector;
use medic_common::health::{HealthScorer, MetricsBag};
use medic_common::log_hunter::LogHunter;
use medic_common::log_patterns::LogPatternAnalyzer;
use medic_common::monitor::HealthMonitor;
use medic_common::network_matrix::NetworkMatrix;
use medic_common::performance::PerformanceBenchmark;
use medic_common::security::SecurityAuditor;
use medic_common::service::ServiceManager;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::output;
use crate::{BaselineCommand, Cli, Commands, ProjectCommand};

/// Dispatch one command; `Ok(false)` means the report came back not ok
pub async fn run(cli: Cli, mut config: MedicConfig) -> Result<bool> {
    let Cli {
        project,
        inventory,
        command,
        ..
    } = cli;

    // Local commands never touch the executor or the project
    match command {
        Commands::Score { input } => return score(&input),
        Commands::Analyze { input } => return analyze(&input),
        Commands::Project { action } => return manage_projects(&mut config, action, project.as_deref()),
        _ => {}
    }

    let executor = build_executor(&config, project.as_deref(), inventory)?;
    let engine = &config.engine;

    let ok = match command {
        Commands::Diagnose {
            host,
            checks,
            no_recommendations,
        } => {
            let report = DiagnosticOrchestrator::new(&executor)
                .diagnose(&host, &checks, !no_recommendations)
                .await?;
            output::report("diagnose", &host, &report)
        }
        Commands::Audit {
            host,
            categories,
            no_report,
        } => {
            let report = SecurityAuditor::new(&executor)
                .audit(&host, &categories, !no_report)
                .await?;
            output::report("audit", &host, &report)
        }
        Commands::Logs {
            host,
            paths,
            lines,
            filter,
            no_analyze,
        } => {
            let report = LogHunter::new(&executor)
                .fetch_logs(
                    &host,
                    &paths,
                    lines.unwrap_or(engine.log_tail_lines),
                    filter.as_deref(),
                    !no_analyze,
                )
                .await?;
            output::report("logs", &host, &report)
        }
        Commands::Hunt {
            host,
            patterns,
            logs,
            since,
            window,
        } => {
            let report = LogHunter::new(&executor)
                .with_max_correlations(engine.max_correlations)
                .hunt(
                    &host,
                    &patterns,
                    &logs,
                    since.as_deref(),
                    window.unwrap_or(engine.correlation_window_secs),
                )
                .await?;
            output::report("hunt", &host, &report)
        }
        Commands::Heal {
            host,
            symptoms,
            max_impact,
            execute,
        } => {
            let report = AutoHealer::new(&executor)
                .heal(&host, &symptoms, max_impact, !execute)
                .await?;
            output::report("heal", &host, &report)
        }
        Commands::Monitor {
            host,
            duration,
            interval,
        } => {
            let report = HealthMonitor::new(&executor)
                .monitor(
                    &host,
                    duration.unwrap_or(config.monitor.duration_secs),
                    interval.unwrap_or(config.monitor.interval_secs),
                )
                .await?;
            output::report("monitor", &host, &report)
        }
        Commands::Bench {
            host,
            duration,
            store_baseline,
        } => {
            let report = PerformanceBenchmark::new(&executor)
                .run(&host, duration, store_baseline)
                .await?;
            output::report("bench", &host, &report)
        }
        Commands::Baseline { action } => match action {
            BaselineCommand::Capture {
                host,
                name,
                include,
            } => {
                let report = BaselineManager::new(&executor)
                    .capture(&host, &name, &include)
                    .await?;
                output::report("baseline capture", &host, &report)
            }
            BaselineCommand::Compare {
                host,
                baseline_id,
                name,
            } => {
                let report = BaselineManager::new(&executor)
                    .compare(&host, &baseline_id, name.as_deref())
                    .await?;
                output::report("baseline compare", &host, &report)
            }
        },
        Commands::Matrix {
            sources,
            targets,
            ports,
        } => {
            let report = NetworkMatrix::new(&executor)
                .probe(&sources, &targets, &ports)
                .await?;
            output::report("matrix", &sources.join(","), &report)
        }
        Commands::Service {
            host,
            name,
            action,
            logs,
        } => {
            let report = ServiceManager::new(&executor)
                .manage(&host, &name, action, logs)
                .await?;
            output::report("service", &host, &report)
        }
        Commands::Facts {
            host,
            subset,
            filter,
        } => {
            let report = FactsCollector::new(&executor)
                .gather(&host, subset.as_deref(), filter.as_deref())
                .await?;
            output::report("facts", &host, &report)
        }
        Commands::Score { .. } | Commands::Analyze { .. } | Commands::Project { .. } => true,
    };
    Ok(ok)
}

fn build_executor(
    config: &MedicConfig,
    project: Option<&str>,
    inventory: Option<String>,
) -> Result<AnsibleExecutor> {
    let mut executor = AnsibleExecutor::from_settings(&config.executor);
    if let Some(inventory) = inventory {
        executor = executor.with_inventory(inventory);
    }
    if let Some(resolved) = config.resolve_project(project)? {
        debug!(
            "[CONFIG] project {} ({:?}) at {}",
            resolved.name,
            resolved.source,
            resolved.definition.root.display()
        );
        executor = executor.with_project(&resolved.definition);
    }
    Ok(executor)
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))
}

fn score(input: &Path) -> Result<bool> {
    let text = read_input(input)?;
    let metrics: MetricsBag = serde_json::from_str(&text).map_err(MedicError::from)?;
    let assessment = HealthScorer::new().score(&metrics);
    output::print_json(&assessment);
    Ok(true)
}

fn analyze(input: &Path) -> Result<bool> {
    let text = read_input(input)?;
    output::print_json(&LogPatternAnalyzer::new().analyze(&text));
    Ok(true)
}

#[derive(Serialize)]
struct ProjectListing<'a> {
    default: Option<&'a str>,
    active: Option<String>,
    projects: &'a std::collections::BTreeMap<String, ProjectDefinition>,
}

fn manage_projects(
    config: &mut MedicConfig,
    action: ProjectCommand,
    explicit: Option<&str>,
) -> Result<bool> {
    match action {
        ProjectCommand::Register {
            name,
            root,
            inventory,
            roles_paths,
            collections_paths,
            default,
        } => {
            let definition = ProjectDefinition {
                inventory,
                roles_paths,
                collections_paths,
                ..ProjectDefinition::new(root)
            };
            config.register_project(&name, definition, default)?;
            let path = config.save().context("Failed to save config")?;
            output::report("project register", &name, &serde_json::json!({
                "ok": true,
                "project": name,
                "default": config.defaults.project,
                "config_path": path,
            }));
        }
        ProjectCommand::List => {
            let active = config.resolve_project(explicit)?.map(|p| p.name);
            output::print_json(&ProjectListing {
                default: config.defaults.project.as_deref(),
                active,
                projects: &config.projects,
            });
        }
    }
    Ok(true)
}
