//! Deploy command - install or upgrade every chart of the topology

use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tssc_core::constants::APP_NAME;
use tssc_engine::Engine;
use tssc_kube::openshift::PROJECT_GRACE_PERIOD;
use tssc_kube::{
    CancelSignal, ClusterLookup, Executor, InstallerJob, ensure_openshift_project, retry_delete_resources,
};

use crate::commands::template::read_values_template;
use crate::context::Context;
use crate::display;
use crate::error::{CliError, Result};

pub struct DeployOptions {
    /// Deploy only this chart of the topology
    pub chart: Option<String>,
    pub values_template: Option<PathBuf>,
    pub job: bool,
    pub image: Option<String>,
}

pub async fn run(ctx: &Context, opts: DeployOptions) -> Result<()> {
    ctx.dry_run_notice();
    let kube = ctx.kube().await?;
    let cfg = ctx.cluster_config(kube.clone()).await?;

    if opts.job {
        let image = opts
            .image
            .as_deref()
            .ok_or_else(|| CliError::usage("--image is required to deploy with --job"))?;
        return submit_job(ctx, kube, cfg.namespace(), image).await;
    }

    if !ctx.args.dry_run {
        tracing::debug!(namespace = cfg.namespace(), "making sure the installer project exists");
        ensure_openshift_project(kube.as_ref(), cfg.namespace(), PROJECT_GRACE_PERIOD).await?;
    }

    let cfs = ctx.chart_fs()?;
    let collection = ctx.collection(&cfs)?;
    let topology = ctx.topology(&cfg, &collection)?;
    let dependencies = match opts.chart.as_deref() {
        Some(name) => {
            let dependency = topology.get(name).ok_or_else(|| {
                CliError::usage_with_help(
                    format!("chart {name:?} is not part of the topology"),
                    format!("list the deployment plan with `{APP_NAME} topology`"),
                )
            })?;
            vec![dependency.clone()]
        }
        None => topology.into_dependencies(),
    };
    let values_template = read_values_template(ctx, opts.values_template.as_deref())?;

    let engine = Engine::new(Arc::new(ClusterLookup::new(kube.clone())));
    let executor = Executor::new(kube.clone(), engine, CancelSignal::from_os_signals())
        .with_timeout(ctx.args.timeout)
        .with_dry_run(ctx.args.dry_run);

    for dependency in &dependencies {
        display::step(&format!(
            "Deploying {} in namespace {}",
            style(dependency.name()).cyan(),
            style(dependency.namespace()).yellow()
        ));
        let execution = executor.execute(dependency, &cfg.installer, &values_template).await?;
        if ctx.args.dry_run && ctx.args.debug {
            display::header(&format!("Values ({})", dependency.name()));
            println!("{}\n", execution.values_text);
        }
        display::success(&format!(
            "{} revision {} {}",
            dependency.name(),
            execution.deployment.release.revision,
            if ctx.args.dry_run { "validated" } else { "deployed" }
        ));
    }

    if !ctx.args.dry_run {
        tracing::debug!("removing temporary RBAC resources");
        let removed = retry_delete_resources(kube.as_ref()).await?;
        tracing::info!(removed, "temporary RBAC resources removed");
    }
    display::success("Deployment complete!");
    Ok(())
}

async fn submit_job(
    ctx: &Context,
    kube: Arc<dyn tssc_kube::KubeClient>,
    namespace: &str,
    image: &str,
) -> Result<()> {
    let job = InstallerJob::new(kube);
    if ctx.args.dry_run {
        println!("[DRY-RUN] Creating the installer job in {namespace:?} with image {image:?}");
        return Ok(());
    }
    job.create(namespace, image).await?;
    display::success("Installer job created, follow the deployment with:");
    println!("\n\t{}\n", job.log_follow_cmd(namespace));
    Ok(())
}
