use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use fixturekit::{Backend, MissPolicy, OutputMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubegen")]
#[command(version)]
#[command(about = "Generate staged node and pod fixtures for cluster simulators", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate node and pod files, one pair per stage
    Generate(GenerateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Generate
// ============================================================================

#[derive(Parser, Default)]
pub struct GenerateArgs {
    /// Output folder where generated files are saved
    #[arg(short, long)]
    pub output_folder: Option<PathBuf>,

    /// Quantity of nodes to generate
    #[arg(short = 'c', long)]
    pub node_count: Option<usize>,

    /// Generate one snapshot every N nodes (0 = a single snapshot)
    #[arg(short, long)]
    pub increment: Option<usize>,

    /// Target backend the fixtures are shaped for
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// What to do when a pod fits no node of its stage
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Emit every record so far (cumulative) or only each stage's additions (delta)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// YAML stream with the source nodes
    #[arg(short, long)]
    pub nodes_path: Option<PathBuf>,

    /// YAML stream with the source pods
    #[arg(short, long)]
    pub pods_path: Option<PathBuf>,

    /// Hollow node template used for kubemark
    #[arg(short = 't', long)]
    pub hollow_node_template: Option<PathBuf>,

    /// New-node template referenced by simulator manifests
    #[arg(long)]
    pub new_node_template: Option<PathBuf>,

    /// Config file (defaults to ~/.config/kubegen/config.toml when present)
    #[arg(long, env = "KUBEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Load inputs and show the stage plan without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Plain,
    Kubemark,
    Kwok,
    Simulator,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Plain => Backend::Plain,
            BackendArg::Kubemark => Backend::Kubemark,
            BackendArg::Kwok => Backend::Kwok,
            BackendArg::Simulator => Backend::Simulator,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Leave the pod out and keep placing the rest
    Skip,
    /// Stop placing pods for the stage at the first miss
    Stop,
}

impl From<PolicyArg> for MissPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Skip => MissPolicy::Skip,
            PolicyArg::Stop => MissPolicy::Stop,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Cumulative,
    Delta,
}

impl From<ModeArg> for OutputMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Cumulative => OutputMode::Cumulative,
            ModeArg::Delta => OutputMode::Delta,
        }
    }
}
