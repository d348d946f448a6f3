//! Config command - manage the installer configuration stored in the cluster

use console::style;
use std::path::Path;
use tssc_core::constants::CONFIG_FILENAME;
use tssc_core::Config;
use tssc_kube::config_store::{CONFIG_MAP_NAME, config_label};
use tssc_kube::openshift::PROJECT_GRACE_PERIOD;
use tssc_kube::{ConfigStore, KubeError, ensure_openshift_project};

use crate::context::Context;
use crate::display;
use crate::error::{CliError, Result};

/// Flags selecting the configuration action
#[derive(Debug, Clone, Copy, Default)]
pub struct Actions {
    pub create: bool,
    pub force: bool,
    pub get: bool,
    pub delete: bool,
}

impl Actions {
    fn validate(&self, path: Option<&Path>) -> Result<()> {
        if self.get && self.delete {
            return Err(CliError::usage("cannot get and delete at the same time"));
        }
        if !self.create && !self.force && !self.get && !self.delete {
            return Err(CliError::usage_with_help(
                "either create, get or delete must be set",
                "use --create, --get or --delete",
            ));
        }
        if path.is_some() && !self.create {
            return Err(CliError::usage("configuration file is only permitted for --create flag"));
        }
        Ok(())
    }
}

pub async fn run(ctx: &Context, actions: Actions, path: Option<&Path>) -> Result<()> {
    actions.validate(path)?;

    if actions.create || actions.force {
        create(ctx, actions.force, path).await?;
    } else if actions.delete {
        delete(ctx).await?;
    }

    if actions.get {
        get(ctx, actions.create).await?;
    }
    Ok(())
}

/// Load the configuration file and verify it against the installer charts
fn load(ctx: &Context, path: Option<&Path>) -> Result<Config> {
    let cfs = ctx.chart_fs_with_cwd()?;
    let cfg = match path {
        Some(path) => {
            tracing::debug!(config_path = %path.display(), "using local configuration file");
            Config::from_chartfs(&cfs, &path.to_string_lossy())?
        }
        None => {
            tracing::debug!(config_path = CONFIG_FILENAME, "using embedded configuration file");
            Config::default_from(&cfs)?
        }
    };

    tracing::debug!("verifying installer charts");
    let collection = ctx.collection(&cfs)?;
    ctx.topology(&cfg, &collection)?;
    Ok(cfg)
}

async fn create(ctx: &Context, force: bool, path: Option<&Path>) -> Result<()> {
    display::disclaimer();
    let cfg = load(ctx, path)?;

    if ctx.args.dry_run {
        println!(
            "[DRY-RUN] Creating the ConfigMap {:?}/{:?}, with the label selector {:?}",
            cfg.namespace(),
            CONFIG_MAP_NAME,
            format!("{}=true", config_label())
        );
        print!("{}", cfg.to_yaml()?);
        return Ok(());
    }

    let kube = ctx.kube().await?;
    tracing::debug!(namespace = cfg.namespace(), "making sure the OpenShift project exists");
    ensure_openshift_project(kube.as_ref(), cfg.namespace(), PROJECT_GRACE_PERIOD).await?;

    let store = ConfigStore::new(kube);
    match store.create(&cfg).await {
        Ok(()) => {
            display::success(&format!("Configuration created in namespace {:?}", cfg.namespace()));
            Ok(())
        }
        Err(KubeError::ConfigAlreadyExists { .. }) if force => {
            tracing::debug!("updating the configuration in the cluster");
            store.update(&cfg).await?;
            display::success(&format!("Configuration updated in namespace {:?}", cfg.namespace()));
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn delete(ctx: &Context) -> Result<()> {
    if ctx.args.dry_run {
        println!(
            "[DRY-RUN] Removing the ConfigMap {:?}, with the label selector {:?}",
            CONFIG_MAP_NAME,
            format!("{}=true", config_label())
        );
        return Ok(());
    }
    let kube = ctx.kube().await?;
    ConfigStore::new(kube).delete().await?;
    display::success("Configuration removed from the cluster");
    Ok(())
}

async fn get(ctx: &Context, creating: bool) -> Result<()> {
    let kube = match ctx.kube().await {
        Ok(kube) => kube,
        Err(_) if creating && ctx.args.dry_run => {
            eprintln!(
                "{} [DRY-RUN] Configuration does not exist in the cluster, yet.",
                style("⚠").yellow()
            );
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    match ConfigStore::new(kube).read().await {
        Ok(cfg) => {
            print!("{}", cfg.to_yaml()?);
            Ok(())
        }
        Err(KubeError::ConfigNotFound) if creating && ctx.args.dry_run => {
            eprintln!(
                "{} [DRY-RUN] Configuration does not exist in the cluster, yet.",
                style("⚠").yellow()
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
