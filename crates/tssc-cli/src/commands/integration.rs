//! Integration command - store the credentials of external services

use clap::{Args, Subcommand};
use tssc_core::Config;
use tssc_core::config::{DEVELOPER_HUB, OPENSHIFT_PIPELINES};
use tssc_integrations::{
    Acs, Artifactory, Azure, Bitbucket, GitHubIntegration, GitLab, Integration, Jenkins, Nexus, Quay,
    SecretWriter, Tas, Trustification,
};

use crate::context::Context;
use crate::display;
use crate::error::{CliError, Result};

#[derive(Subcommand, Debug, Clone)]
pub enum Provider {
    /// Integrates an Advanced Cluster Security instance
    Acs(Acs),

    /// Integrates an Artifactory registry
    Artifactory(Artifactory),

    /// Integrates an Azure DevOps organization
    Azure(Azure),

    /// Integrates a Bitbucket account
    Bitbucket(Bitbucket),

    /// Creates a GitHub App and stores its credentials
    #[command(name = "github-app")]
    GitHub(GitHubArgs),

    /// Integrates a GitLab instance
    Gitlab(GitLab),

    /// Integrates a Jenkins instance
    Jenkins(Jenkins),

    /// Integrates a Nexus registry
    Nexus(Nexus),

    /// Integrates a Quay registry
    Quay(Quay),

    /// Integrates a Trusted Artifact Signer instance
    Tas(Tas),

    /// Integrates a Trustification instance
    Trustification(Trustification),
}

#[derive(Args, Debug, Clone)]
pub struct GitHubArgs {
    /// GitHub App name
    pub name: String,

    #[command(flatten)]
    pub integration: GitHubIntegration,
}

impl Provider {
    fn integration(&mut self) -> &mut dyn Integration {
        match self {
            Provider::Acs(p) => p,
            Provider::Artifactory(p) => p,
            Provider::Azure(p) => p,
            Provider::Bitbucket(p) => p,
            Provider::GitHub(args) => &mut args.integration,
            Provider::Gitlab(p) => p,
            Provider::Jenkins(p) => p,
            Provider::Nexus(p) => p,
            Provider::Quay(p) => p,
            Provider::Tas(p) => p,
            Provider::Trustification(p) => p,
        }
    }
}

pub async fn run(ctx: &Context, force: bool, mut provider: Provider) -> Result<()> {
    let kube = ctx.kube().await?;
    let cfg = ctx.cluster_config(kube.clone()).await?;
    let writer = SecretWriter::new(kube.clone()).with_force(force);

    if ctx.args.dry_run {
        let integration = provider.integration();
        integration.validate()?;
        println!(
            "[DRY-RUN] Creating the Secret {:?}/{:?}",
            integration.namespace(&cfg)?,
            integration.secret_name()
        );
        return Ok(());
    }

    let secret = match provider {
        Provider::GitHub(GitHubArgs {
            name,
            mut integration,
        }) => {
            require_enabled(&cfg, DEVELOPER_HUB)?;
            require_enabled(&cfg, OPENSHIFT_PIPELINES)?;
            integration.validate()?;

            let namespace = writer.prepare(&cfg, &integration).await?;
            integration.set_openshift_urls(kube.as_ref(), &cfg).await?;
            display::step(&format!("Creating the GitHub App {name:?}"));
            let app_config = integration.app.create(integration.manifest(&name)).await?;
            tracing::info!(app = %app_config.slug, "GitHub App created");
            integration.app_config = Some(app_config);
            writer.store(&namespace, &integration).await?
        }
        mut provider => writer.write(&cfg, provider.integration()).await?,
    };

    display::success(&format!(
        "Integration secret {:?} created in namespace {:?}",
        secret.metadata.name.unwrap_or_default(),
        secret.metadata.namespace.unwrap_or_default()
    ));
    Ok(())
}

fn require_enabled(cfg: &Config, product: &str) -> Result<()> {
    if !cfg.get_product(product)?.enabled {
        return Err(CliError::config_with_help(
            format!("the product {product:?} is not enabled"),
            "enable it in the cluster configuration with `tssc config --create --force`",
        ));
    }
    Ok(())
}
