//! Connectivity matrix between host groups

use crate::error::{require_host_pattern, MedicError, Result};
use crate::executor::{run_probe, run_shell, ExecOptions, Probe, RemoteExecutor};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

pub const DEFAULT_PORTS: [u16; 3] = [22, 80, 443];

fn ping_command(target: &str) -> String {
    format!(
        "ping -c 3 {} > /dev/null 2>&1 && echo 'success' || echo 'failed'",
        shell_words::quote(target)
    )
}

fn port_command(target: &str, port: u16) -> String {
    format!(
        "nc -z -w5 {} {} && echo 'open' || echo 'closed'",
        shell_words::quote(target),
        port
    )
}

fn traceroute_command(target: &str) -> String {
    format!(
        "traceroute -m 10 {} 2>/dev/null | tail -1",
        shell_words::quote(target)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConnectivity {
    /// `success` / `failed`, empty when the probe produced nothing
    pub ping: String,
    /// `open` / `closed` per port
    pub ports: BTreeMap<u16, String>,
    /// Last hop line
    pub traceroute: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceConnectivity {
    pub reachable: bool,
    pub targets: BTreeMap<String, TargetConnectivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixSummary {
    pub source_patterns: usize,
    pub target_hosts: usize,
    pub ports_tested: Vec<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkMatrixReport {
    pub ok: bool,
    pub network_matrix: BTreeMap<String, SourceConnectivity>,
    pub summary: MatrixSummary,
}

pub struct NetworkMatrix<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> NetworkMatrix<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Test every source against every target; targets default to the sources
    pub async fn probe(
        &self,
        sources: &[String],
        targets: &[String],
        ports: &[u16],
    ) -> Result<NetworkMatrixReport> {
        if sources.is_empty() {
            return Err(MedicError::InvalidArgument(
                "at least one source host pattern is required".to_string(),
            ));
        }
        for source in sources {
            require_host_pattern(source)?;
        }
        let targets = if targets.is_empty() { sources } else { targets };
        let ports = if ports.is_empty() { &DEFAULT_PORTS[..] } else { ports };
        info!(
            "[MATRIX] {} sources x {} targets, ports {:?}",
            sources.len(),
            targets.len(),
            ports
        );

        let mut network_matrix = BTreeMap::new();
        for source in sources {
            let reachable = run_probe(self.executor, source, &Probe::Ping, &ExecOptions::default())
                .await
                .ok;

            let mut per_target = BTreeMap::new();
            for target in targets {
                let ping = self.last_line(source, &ping_command(target)).await;
                let mut port_states = BTreeMap::new();
                for &port in ports {
                    port_states.insert(port, self.last_line(source, &port_command(target, port)).await);
                }
                let traceroute = self.last_line(source, &traceroute_command(target)).await;
                per_target.insert(
                    target.clone(),
                    TargetConnectivity {
                        ping,
                        ports: port_states,
                        traceroute,
                    },
                );
            }
            network_matrix.insert(
                source.clone(),
                SourceConnectivity {
                    reachable,
                    targets: per_target,
                },
            );
        }

        Ok(NetworkMatrixReport {
            ok: true,
            network_matrix,
            summary: MatrixSummary {
                source_patterns: sources.len(),
                target_hosts: targets.len(),
                ports_tested: ports.to_vec(),
            },
        })
    }

    async fn last_line(&self, host_pattern: &str, command: &str) -> String {
        run_shell(self.executor, host_pattern, command)
            .await
            .payload_lines()
            .last()
            .map(|line| line.to_string())
            .unwrap_or_default()
    }
}
