use anyhow::{Context, Result};
use fixturekit::{Backend, MissPolicy, OutputMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::GenerateArgs;

const DEFAULT_NODE_COUNT: usize = 400;
const DEFAULT_NODES_PATH: &str = "../example/cluster/nodes/nodes.yaml";
const DEFAULT_PODS_PATH: &str = "../example/applications/simulation/pods.yaml";
const DEFAULT_HOLLOW_NODE_TEMPLATE: &str = "hollow-node.yml";
const DEFAULT_NEW_NODE_TEMPLATE: &str = "new-node.yaml";
const DEFAULT_EXTENSION: &str = "yaml";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("kubegen"))
}

/// Expand `~` and environment variables in a path
fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// Config File
// ============================================================================

/// Settings read from `config.toml`. Every key is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub output_folder: Option<PathBuf>,
    pub node_count: Option<usize>,
    pub increment: Option<usize>,
    pub backend: Option<Backend>,
    pub policy: Option<MissPolicy>,
    pub mode: Option<OutputMode>,
    pub nodes_path: Option<PathBuf>,
    pub pods_path: Option<PathBuf>,
    pub hollow_node_template: Option<PathBuf>,
    pub new_node_template: Option<PathBuf>,
    pub extension: Option<String>,
}

impl FileConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Load the explicit config if given, else the default one if it exists
    pub fn discover(explicit: Option<&Path>) -> Result<Option<(PathBuf, Self)>> {
        if let Some(path) = explicit {
            let path = expand(path);
            return Ok(Some((path.clone(), Self::load(&path)?)));
        }

        let default = config_dir()?.join("config.toml");
        if default.exists() {
            log::debug!("Using config {}", default.display());
            return Ok(Some((default.clone(), Self::load(&default)?)));
        }
        Ok(None)
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

/// Fully resolved settings for one generate run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateConfig {
    pub output_folder: PathBuf,
    pub node_count: usize,
    pub increment: usize,
    pub backend: Backend,
    pub policy: MissPolicy,
    pub mode: OutputMode,
    pub nodes_path: PathBuf,
    pub pods_path: PathBuf,
    pub hollow_node_template: PathBuf,
    pub new_node_template: PathBuf,
    pub extension: String,
}

impl GenerateConfig {
    /// Merge CLI flags over the config file over built-in defaults
    pub fn resolve(args: &GenerateArgs, file: FileConfig) -> Result<Self> {
        let output_folder = args
            .output_folder
            .clone()
            .or(file.output_folder)
            .context("No output folder provided (use -o or set output_folder in the config)")?;
        let backend = args.backend.map(Backend::from).or(file.backend).unwrap_or_default();
        let path = |cli: &Option<PathBuf>, file: Option<PathBuf>, default: &str| {
            expand(&cli.clone().or(file).unwrap_or_else(|| PathBuf::from(default)))
        };

        Ok(Self {
            output_folder: expand(&output_folder),
            node_count: args.node_count.or(file.node_count).unwrap_or(DEFAULT_NODE_COUNT),
            increment: args.increment.or(file.increment).unwrap_or(0),
            backend,
            policy: args.policy.map(MissPolicy::from).or(file.policy).unwrap_or_default(),
            mode: args
                .mode
                .map(OutputMode::from)
                .or(file.mode)
                .unwrap_or_else(|| backend.default_mode()),
            nodes_path: path(&args.nodes_path, file.nodes_path, DEFAULT_NODES_PATH),
            pods_path: path(&args.pods_path, file.pods_path, DEFAULT_PODS_PATH),
            hollow_node_template: path(
                &args.hollow_node_template,
                file.hollow_node_template,
                DEFAULT_HOLLOW_NODE_TEMPLATE,
            ),
            new_node_template: path(
                &args.new_node_template,
                file.new_node_template,
                DEFAULT_NEW_NODE_TEMPLATE,
            ),
            extension: file
                .extension
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
        })
    }
}
