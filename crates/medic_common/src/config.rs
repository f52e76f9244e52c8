//! Fleetmedic configuration
//!
//! TOML file resolved as `$MEDIC_CONFIG`, then `./medic.toml` when present,
//! then `<config_dir>/fleetmedic/config.toml`. A missing file means defaults.
//!
//! Projects bundle an inventory, role/collection search paths and extra
//! environment for the executor. Resolution order for the active project:
//! explicit name, then `MEDIC_PROJECT_ROOT` from the environment, then the
//! saved default.

use crate::error::{MedicError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MEDIC_CONFIG";
const LOCAL_CONFIG_FILE: &str = "medic.toml";
const CONFIG_SUBDIR: &str = "fleetmedic";
const CONFIG_FILE: &str = "config.toml";

/// Environment project override
pub const PROJECT_ROOT_VAR: &str = "MEDIC_PROJECT_ROOT";
pub const PROJECT_NAME_VAR: &str = "MEDIC_PROJECT_NAME";
pub const PROJECT_INVENTORY_VAR: &str = "MEDIC_PROJECT_INVENTORY";
pub const PROJECT_ROLES_VAR: &str = "MEDIC_PROJECT_ROLES_PATH";
pub const PROJECT_COLLECTIONS_VAR: &str = "MEDIC_PROJECT_COLLECTIONS_PATHS";
/// Prefix for extra variables passed through to every probe
pub const PROJECT_ENV_PREFIX: &str = "MEDIC_ENV_";

/// How the executor reaches hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_ansible_bin")]
    pub ansible_bin: String,

    /// Inventory passed with `-i`; a project inventory applies when unset
    #[serde(default)]
    pub inventory: Option<String>,

    /// Forced connection plugin (`-c`)
    #[serde(default)]
    pub connection: Option<String>,

    /// Per-probe wall clock limit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ansible_bin() -> String {
    "ansible".to_string()
}

fn default_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            ansible_bin: default_ansible_bin(),
            inventory: None,
            connection: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Engine tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Max seconds between two log matches for them to correlate
    #[serde(default = "default_correlation_window")]
    pub correlation_window_secs: u64,

    #[serde(default = "default_max_correlations")]
    pub max_correlations: usize,

    /// Lines fetched per log by `fetch_logs` when the caller gives none
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

fn default_correlation_window() -> u64 {
    300
}

fn default_max_correlations() -> usize {
    10
}

fn default_log_tail_lines() -> usize {
    100
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            correlation_window_secs: default_correlation_window(),
            max_correlations: default_max_correlations(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_duration")]
    pub duration_secs: u64,

    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_monitor_duration() -> u64 {
    300 // 5 minutes
}

fn default_monitor_interval() -> u64 {
    30
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            duration_secs: default_monitor_duration(),
            interval_secs: default_monitor_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    /// Project used when none is named
    #[serde(default)]
    pub project: Option<String>,
}

/// A named automation project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    #[serde(default)]
    pub root: PathBuf,

    #[serde(default)]
    pub inventory: Option<String>,

    #[serde(default)]
    pub roles_paths: Vec<String>,

    #[serde(default)]
    pub collections_paths: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProjectDefinition {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Environment handed to the executor for this project
    pub fn ansible_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if !self.roles_paths.is_empty() {
            env.insert("ANSIBLE_ROLES_PATH".to_string(), self.roles_paths.join(":"));
        }
        if !self.collections_paths.is_empty() {
            env.insert(
                "ANSIBLE_COLLECTIONS_PATHS".to_string(),
                self.collections_paths.join(":"),
            );
        }
        env.extend(self.env.clone());
        env
    }

    /// Project described by `MEDIC_PROJECT_*` variables, if a root is set
    pub fn from_vars<I>(vars: I) -> Option<(String, Self)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        let root = vars.get(PROJECT_ROOT_VAR).filter(|r| !r.is_empty())?;
        let name = vars
            .get(PROJECT_NAME_VAR)
            .cloned()
            .unwrap_or_else(|| "env".to_string());

        let env = vars
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(PROJECT_ENV_PREFIX)
                    .filter(|stripped| !stripped.is_empty())
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect();

        let definition = Self {
            root: PathBuf::from(root),
            inventory: vars.get(PROJECT_INVENTORY_VAR).cloned(),
            roles_paths: split_paths(vars.get(PROJECT_ROLES_VAR)),
            collections_paths: split_paths(vars.get(PROJECT_COLLECTIONS_VAR)),
            env,
        };
        Some((name, definition))
    }
}

fn split_paths(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(':')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Where the active project came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSource {
    Explicit,
    Environment,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProject {
    pub name: String,
    pub source: ProjectSource,
    pub definition: ProjectDefinition,
}

/// Complete fleetmedic configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicConfig {
    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub projects: BTreeMap<String, ProjectDefinition>,
}

impl MedicConfig {
    /// Load from the resolved config path
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save to the resolved config path, returning where it went
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MedicError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Add or replace a project, optionally making it the default
    pub fn register_project(
        &mut self,
        name: &str,
        definition: ProjectDefinition,
        make_default: bool,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MedicError::InvalidArgument(
                "project name must not be empty".to_string(),
            ));
        }
        if definition.root.as_os_str().is_empty() {
            return Err(MedicError::InvalidArgument(format!(
                "project '{}' needs a root directory",
                name
            )));
        }
        self.projects.insert(name.to_string(), definition);
        if make_default || self.defaults.project.is_none() {
            self.defaults.project = Some(name.to_string());
        }
        Ok(())
    }

    /// Resolve the active project against the process environment
    pub fn resolve_project(&self, explicit: Option<&str>) -> Result<Option<ResolvedProject>> {
        self.resolve_project_with(explicit, std::env::vars())
    }

    /// Resolve the active project against the given variables
    pub fn resolve_project_with<I>(
        &self,
        explicit: Option<&str>,
        vars: I,
    ) -> Result<Option<ResolvedProject>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(name) = explicit.filter(|n| !n.trim().is_empty()) {
            let definition = self
                .projects
                .get(name)
                .cloned()
                .ok_or_else(|| MedicError::UnknownProject(name.to_string()))?;
            return Ok(Some(ResolvedProject {
                name: name.to_string(),
                source: ProjectSource::Explicit,
                definition,
            }));
        }

        if let Some((name, definition)) = ProjectDefinition::from_vars(vars) {
            return Ok(Some(ResolvedProject {
                name,
                source: ProjectSource::Environment,
                definition,
            }));
        }

        match self.defaults.project.as_deref() {
            Some(name) => {
                let definition = self
                    .projects
                    .get(name)
                    .cloned()
                    .ok_or_else(|| MedicError::UnknownProject(name.to_string()))?;
                Ok(Some(ResolvedProject {
                    name: name.to_string(),
                    source: ProjectSource::Default,
                    definition,
                }))
            }
            None => Ok(None),
        }
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    config_dir().join(CONFIG_FILE)
}

/// Per-user config directory
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_SUBDIR)
}
