//! Shared state of a command run: global flags, installer resources and the
//! cluster client

use clap::Args;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tssc_core::constants::APP_NAME;
use tssc_core::{ChartFs, Collection, Config, Resolver, Topology};
use tssc_kube::{ClusterClient, ConfigStore, KubeClient, KubeError};

use crate::error::{CliError, Result};

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug output and backtraces
    #[arg(long, global = true)]
    pub debug: bool,

    /// Validate the changes without touching the cluster
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Path to the kube-config file
    #[arg(long, global = true, env = "KUBECONFIG", value_name = "PATH")]
    pub kube_config: Option<PathBuf>,

    /// Log verbosity
    #[arg(
        long,
        global = true,
        default_value = "warn",
        value_parser = ["error", "warn", "info", "debug"]
    )]
    pub log_level: String,

    /// Timeout for each chart deployment
    #[arg(long, global = true, default_value = "15m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Use the installer resources embedded in the binary (default)
    #[arg(long, global = true, conflicts_with = "local")]
    pub embedded: bool,

    /// Use the installer resources from a local directory
    #[arg(long, global = true, value_name = "DIR")]
    pub local: Option<PathBuf>,
}

impl GlobalArgs {
    /// Kube-config path, defaulting to `~/.kube/config`. An empty value
    /// selects the in-cluster configuration.
    pub fn kube_config_path(&self) -> Option<PathBuf> {
        match &self.kube_config {
            Some(path) => Some(path.clone()),
            None => dirs::home_dir().map(|home| home.join(".kube").join("config")),
        }
    }
}

pub struct Context {
    pub args: GlobalArgs,
}

impl Context {
    pub fn new(args: GlobalArgs) -> Self {
        Self { args }
    }

    /// Installer resources, embedded unless `--local` is given
    pub fn chart_fs(&self) -> Result<ChartFs> {
        match &self.args.local {
            Some(dir) => {
                tracing::debug!(dir = %dir.display(), "using local installer resources");
                Ok(ChartFs::from_dir(dir)?)
            }
            None => {
                tracing::debug!("using embedded installer resources");
                Ok(ChartFs::embedded()?)
            }
        }
    }

    /// Installer resources where files in the working directory take
    /// precedence, used for user supplied paths
    pub fn chart_fs_with_cwd(&self) -> Result<ChartFs> {
        let cwd = std::env::current_dir()?;
        Ok(self.chart_fs()?.with_overlay(cwd))
    }

    /// All installer charts
    pub fn collection(&self, cfs: &ChartFs) -> Result<Collection> {
        Ok(Collection::new(cfs.load_all()?)?)
    }

    /// Connect to the cluster
    pub async fn kube(&self) -> Result<Arc<dyn KubeClient>> {
        let path = self.args.kube_config_path();
        let client = ClusterClient::from_kubeconfig(path.as_deref()).await?;
        client.connected().await?;
        Ok(Arc::new(client))
    }

    /// The configuration stored in the cluster, pointing to the `config`
    /// subcommand when it can't be read
    pub async fn cluster_config(&self, kube: Arc<dyn KubeClient>) -> Result<Config> {
        ConfigStore::new(kube).read().await.map_err(|err| match err {
            KubeError::ConfigNotFound
            | KubeError::MultipleConfigFound { .. }
            | KubeError::IncompleteConfig { .. } => CliError::config_with_help(
                format!(
                    "unable to find a valid configuration in the cluster: {}",
                    err.to_string().lines().next().unwrap_or_default()
                ),
                format!("manage the installer configuration with `{APP_NAME} config --help`"),
            ),
            err => err.into(),
        })
    }

    /// Resolve the deployment plan for a configuration
    pub fn topology(&self, cfg: &Config, collection: &Collection) -> Result<Topology> {
        Ok(Resolver::new(cfg, collection).resolve()?)
    }

    pub fn dry_run_notice(&self) {
        if self.args.dry_run {
            eprintln!(
                "{} Running in dry-run mode, the cluster is not changed",
                style("!").yellow().bold()
            );
        }
    }
}

/// Fails unless `path` is an existing directory
pub fn require_dir(path: &Path, what: &str) -> Result<()> {
    let display = path.display().to_string();
    let metadata = std::fs::metadata(path).map_err(|e| CliError::usage(format!("{what} {display:?}: {e}")))?;
    if !metadata.is_dir() {
        return Err(CliError::usage(format!("{what} {display:?} must be a directory")));
    }
    Ok(())
}
