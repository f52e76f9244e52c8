//! Host fact collection
//!
//! Ad-hoc fact gathering prints one `host | SUCCESS => {json}` block per host,
//! with the JSON either on one line or spread over the following lines.

use crate::error::{require_host_pattern, Result};
use crate::executor::{run_probe, CommandResult, ExecOptions, Probe, RemoteExecutor};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Header of one host block: `(host, status, rest after =>)`
fn block_header(line: &str) -> Option<(&str, &str, &str)> {
    let (left, rest) = line.split_once("=>")?;
    let mut parts = left.split('|');
    let host = parts.next()?.trim();
    let status = parts.next()?.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some((host, status, rest.trim()))
}

/// Per-host facts from fact-gathering stdout; failed hosts are skipped
pub fn parse_setup_stdout(stdout: &str) -> BTreeMap<String, Value> {
    let mut blocks: Vec<(String, bool, String)> = Vec::new();
    for line in stdout.lines() {
        if let Some((host, status, rest)) = block_header(line) {
            blocks.push((host.to_string(), status == "SUCCESS", rest.to_string()));
        } else if let Some((_, _, body)) = blocks.last_mut() {
            body.push('\n');
            body.push_str(line);
        }
    }

    let mut facts = BTreeMap::new();
    for (host, success, body) in blocks {
        if !success {
            continue;
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(mut data) => {
                let value = match data.get_mut("ansible_facts") {
                    Some(inner) => inner.take(),
                    None => data,
                };
                facts.insert(host, value);
            }
            Err(e) => debug!("[FACTS] unparseable block for {}: {}", host, e),
        }
    }
    facts
}

#[derive(Debug, Clone, Serialize)]
pub struct FactsReport {
    pub ok: bool,
    pub result: CommandResult,
    pub facts: BTreeMap<String, Value>,
}

pub struct FactsCollector<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> FactsCollector<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    pub async fn gather(
        &self,
        host_pattern: &str,
        subset: Option<&str>,
        filter: Option<&str>,
    ) -> Result<FactsReport> {
        require_host_pattern(host_pattern)?;
        let probe = Probe::FactsGather {
            subset: subset.map(str::to_string),
            filter: filter.map(str::to_string),
        };
        let result = run_probe(self.executor, host_pattern, &probe, &ExecOptions::default()).await;
        let facts = parse_setup_stdout(&result.stdout);
        info!("[FACTS] collected facts for {} hosts", facts.len());

        Ok(FactsReport {
            ok: result.ok,
            result,
            facts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutorBuilder, FakeResponse};

    #[test]
    fn test_parse_single_line_blocks() {
        let stdout = concat!(
            "web01 | SUCCESS => {\"ansible_facts\": {\"ansible_hostname\": \"web01\"}, \"changed\": false}\n",
            "web02 | UNREACHABLE! => {\"msg\": \"timeout\", \"unreachable\": true}\n",
            "db01 | SUCCESS => {\"ansible_hostname\": \"db01\"}\n",
        );
        let facts = parse_setup_stdout(stdout);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts["web01"]["ansible_hostname"], "web01");
        assert_eq!(facts["db01"]["ansible_hostname"], "db01");
        assert!(!facts.contains_key("web02"));
    }

    #[test]
    fn test_parse_multi_line_block() {
        let stdout = "web01 | SUCCESS => {\n    \"ansible_facts\": {\n        \"ansible_memtotal_mb\": 3940\n    },\n    \"changed\": false\n}\n";
        let facts = parse_setup_stdout(stdout);
        assert_eq!(facts["web01"]["ansible_memtotal_mb"], 3940);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_setup_stdout("").is_empty());
        assert!(parse_setup_stdout("web01 | SUCCESS => {not json").is_empty());
    }

    #[tokio::test]
    async fn test_gather_passes_subset() {
        let fake = FakeExecutorBuilder::new()
            .respond(
                "facts: network",
                FakeResponse::ok("web01 | SUCCESS => {\"ansible_facts\": {\"ansible_default_ipv4\": {}}}\n"),
            )
            .build();
        let report = FactsCollector::new(&fake)
            .gather("web01", Some("network"), None)
            .await
            .unwrap();
        assert!(report.ok);
        assert!(report.facts["web01"].get("ansible_default_ipv4").is_some());
    }
}
