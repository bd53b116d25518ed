//! Command line and configuration file handling.
//!
//! Values are resolved from built-in defaults, then the YAML file passed with
//! `--config`, then any flag given explicitly on the command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::pod::DEFAULT_IMAGE;
use crate::lifecycle::pvc::DEFAULT_STORAGE_REQUEST;

#[derive(Parser, Debug)]
#[command(
    name = "kmon",
    version,
    about = "Automate common Kubernetes storage chores",
    long_about = "kmon runs one-shot Kubernetes workflows, for example:\n\
                  * deploy a pod with a given PVC mounted and inspect its content\n\
                  * restore a PVC from a volume snapshot and run a pod on it\n\
                  * snapshot an existing PVC"
)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "KMON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Namespace to run in
    #[arg(short, long, env = "KMON_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Seconds to wait before exiting, so log viewers can catch up
    #[arg(long, global = true)]
    pub exit_delay_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Operations on pods
    #[command(after_help = "Example: kmon pod --mode run-from-pvc --pvc-name test-pvc")]
    Pod(PodArgs),

    /// Operations on PVCs and volume snapshots
    #[command(after_help = "Example: kmon pvc --mode snapshot-from-pvc --source-pvc-name test-pvc")]
    Pvc(PvcArgs),
}

#[derive(Args, Debug, Default)]
pub struct PodArgs {
    /// One of: run-from-pvc, run-from-snapshot, exec, delete, smoke-test
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub volume_name: Option<String>,
    #[arg(long)]
    pub mount_path: Option<String>,
    /// Claim mounted by the pod. `run-from-snapshot` creates it from the
    /// snapshot under this name.
    #[arg(long)]
    pub pvc_name: Option<String>,
    /// Snapshot restored by `run-from-snapshot`
    #[arg(long)]
    pub snapshot_name: Option<String>,
    #[arg(long)]
    pub image: Option<String>,
    /// Command run by the `exec` mode, given after `--`
    #[arg(last = true, num_args = 1.., value_name = "COMMAND")]
    pub exec_command: Option<Vec<String>>,
    #[arg(long)]
    pub wait_timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct PvcArgs {
    /// One of: snapshot-from-pvc, pvc-from-snapshot, get, delete
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub snapshot_name: Option<String>,
    #[arg(long)]
    pub snapshot_class_name: Option<String>,
    #[arg(long)]
    pub source_pvc_name: Option<String>,
    #[arg(long)]
    pub storage_class_name: Option<String>,
    #[arg(long)]
    pub size: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(
        "invalid pod mode: `{0}` (expected one of: {modes})",
        modes = PodMode::NAMES.join(", ")
    )]
    UnknownPodMode(String),

    #[error(
        "invalid pvc mode: `{0}` (expected one of: {modes})",
        modes = PvcMode::NAMES.join(", ")
    )]
    UnknownPvcMode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub context: Option<String>,
    pub namespace: String,
    pub exit_delay_secs: u64,
    pub pod: PodConfig,
    pub pvc: PvcConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    pub mode: String,
    pub name: String,
    pub volume_name: String,
    pub mount_path: String,
    pub pvc_name: String,
    pub snapshot_name: String,
    pub image: String,
    pub exec_command: Vec<String>,
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PvcConfig {
    pub mode: String,
    pub name: String,
    pub snapshot_name: String,
    pub snapshot_class_name: String,
    pub source_pvc_name: String,
    pub storage_class_name: String,
    pub size: String,
}

impl Cli {
    /// Exit delay for when the configuration itself could not be loaded.
    pub fn fallback_exit_delay(&self) -> Duration {
        let secs = self
            .exit_delay_secs
            .unwrap_or_else(|| Config::default().exit_delay_secs);
        Duration::from_secs(secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: None,
            namespace: "default".to_string(),
            exit_delay_secs: 3,
            pod: PodConfig::default(),
            pvc: PvcConfig::default(),
        }
    }
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            mode: String::new(),
            name: "kmon-pod".to_string(),
            volume_name: "kmon-volume".to_string(),
            mount_path: "/kmon-mnt".to_string(),
            pvc_name: "kmon-pvc".to_string(),
            snapshot_name: "kmon-snapshot".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            exec_command: vec!["/bin/sh".to_string()],
            wait_timeout_secs: 60,
        }
    }
}

impl Default for PvcConfig {
    fn default() -> Self {
        Self {
            mode: String::new(),
            name: "kmon-pvc".to_string(),
            snapshot_name: "kmon-snap".to_string(),
            snapshot_class_name: String::new(),
            source_pvc_name: String::new(),
            storage_class_name: String::new(),
            size: DEFAULT_STORAGE_REQUEST.to_string(),
        }
    }
}

fn set<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// Treat empty strings as unset.
pub fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

impl Config {
    /// Resolve the configuration for this invocation.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_cli(cli);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if cli.context.is_some() {
            self.context = cli.context.clone();
        }
        set(&mut self.namespace, &cli.namespace);
        set(&mut self.exit_delay_secs, &cli.exit_delay_secs);

        match &cli.command {
            Command::Pod(args) => {
                let pod = &mut self.pod;
                set(&mut pod.mode, &args.mode);
                set(&mut pod.name, &args.name);
                set(&mut pod.volume_name, &args.volume_name);
                set(&mut pod.mount_path, &args.mount_path);
                set(&mut pod.pvc_name, &args.pvc_name);
                set(&mut pod.snapshot_name, &args.snapshot_name);
                set(&mut pod.image, &args.image);
                set(&mut pod.exec_command, &args.exec_command);
                set(&mut pod.wait_timeout_secs, &args.wait_timeout_secs);
            }
            Command::Pvc(args) => {
                let pvc = &mut self.pvc;
                set(&mut pvc.mode, &args.mode);
                set(&mut pvc.name, &args.name);
                set(&mut pvc.snapshot_name, &args.snapshot_name);
                set(&mut pvc.snapshot_class_name, &args.snapshot_class_name);
                set(&mut pvc.source_pvc_name, &args.source_pvc_name);
                set(&mut pvc.storage_class_name, &args.storage_class_name);
                set(&mut pvc.size, &args.size);
            }
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref().and_then(non_empty)
    }

    pub fn exit_delay(&self) -> Duration {
        Duration::from_secs(self.exit_delay_secs)
    }
}

impl PodConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodMode {
    RunFromPvc,
    RunFromSnapshot,
    Exec,
    Delete,
    SmokeTest,
}

impl PodMode {
    pub const NAMES: [&'static str; 5] = [
        "run-from-pvc",
        "run-from-snapshot",
        "exec",
        "delete",
        "smoke-test",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PodMode::RunFromPvc => "run-from-pvc",
            PodMode::RunFromSnapshot => "run-from-snapshot",
            PodMode::Exec => "exec",
            PodMode::Delete => "delete",
            PodMode::SmokeTest => "smoke-test",
        }
    }
}

impl FromStr for PodMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run-from-pvc" => Ok(PodMode::RunFromPvc),
            "run-from-snapshot" => Ok(PodMode::RunFromSnapshot),
            "exec" => Ok(PodMode::Exec),
            "delete" => Ok(PodMode::Delete),
            "smoke-test" => Ok(PodMode::SmokeTest),
            other => Err(ConfigError::UnknownPodMode(other.to_string())),
        }
    }
}

impl fmt::Display for PodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvcMode {
    SnapshotFromPvc,
    PvcFromSnapshot,
    Get,
    Delete,
}

impl PvcMode {
    pub const NAMES: [&'static str; 4] =
        ["snapshot-from-pvc", "pvc-from-snapshot", "get", "delete"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PvcMode::SnapshotFromPvc => "snapshot-from-pvc",
            PvcMode::PvcFromSnapshot => "pvc-from-snapshot",
            PvcMode::Get => "get",
            PvcMode::Delete => "delete",
        }
    }
}

impl FromStr for PvcMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot-from-pvc" => Ok(PvcMode::SnapshotFromPvc),
            "pvc-from-snapshot" => Ok(PvcMode::PvcFromSnapshot),
            "get" => Ok(PvcMode::Get),
            "delete" => Ok(PvcMode::Delete),
            other => Err(ConfigError::UnknownPvcMode(other.to_string())),
        }
    }
}

impl fmt::Display for PvcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
