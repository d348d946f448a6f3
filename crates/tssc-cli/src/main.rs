//! TSSC - installer for the Trusted Software Supply Chain on OpenShift

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

mod commands;
mod context;
mod display;
mod error;
mod logging;

use commands::integration::Provider;
use context::{Context, GlobalArgs};

#[derive(Parser)]
#[command(name = "tssc")]
#[command(version)]
#[command(about = "Installer for the Trusted Software Supply Chain on OpenShift", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the installer configuration stored in the cluster
    Config {
        /// Configuration file, the embedded `config.yaml` when omitted
        path: Option<PathBuf>,

        /// Create a new cluster configuration
        #[arg(short, long)]
        create: bool,

        /// Update an existing cluster configuration
        #[arg(short, long)]
        force: bool,

        /// Show the current cluster configuration
        #[arg(short, long)]
        get: bool,

        /// Delete the current cluster configuration
        #[arg(short, long)]
        delete: bool,
    },

    /// Deploy the charts of the topology
    Deploy {
        /// Deploy a single chart of the topology
        chart: Option<String>,

        /// Values template file
        #[arg(long, value_name = "PATH")]
        values_template: Option<PathBuf>,

        /// Run the deployment as a job in the cluster
        #[arg(long, requires = "image")]
        job: bool,

        /// Installer container image for the deployment job
        #[arg(long)]
        image: Option<String>,
    },

    /// Configure an external service provider
    Integration {
        /// Replace an existing integration secret
        #[arg(long, global = true)]
        force: bool,

        #[command(subcommand)]
        provider: Provider,
    },

    /// Inspect the installer resources embedded in the binary
    Installer {
        /// List the embedded resources
        #[arg(short, long)]
        list: bool,

        /// Extract the embedded resources into a directory
        #[arg(short, long, value_name = "DIR")]
        extract: Option<PathBuf>,
    },

    /// Render the values template and a chart
    Template {
        /// Chart directory
        chart: Option<PathBuf>,

        /// Values template file
        #[arg(long, value_name = "PATH")]
        values_template: Option<PathBuf>,

        /// Namespace used for rendering
        #[arg(long, default_value = "default")]
        namespace: String,

        /// Show the rendered values
        #[arg(
            long,
            default_value_t = true,
            action = clap::ArgAction::Set,
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = "true"
        )]
        show_values: bool,

        /// Show the rendered chart manifests
        #[arg(
            long,
            default_value_t = true,
            action = clap::ArgAction::Set,
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = "true"
        )]
        show_manifests: bool,
    },

    /// Show the installer topology
    Topology,
}

fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.global.debug {
        // SAFETY: We're the only thread at this point (start of main)
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    logging::init(&cli.global.log_level);

    // Template lookups block on cluster calls, which needs worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let ctx = Context::new(cli.global);
    runtime.block_on(run(&ctx, cli.command)).map_err(Into::into)
}

async fn run(ctx: &Context, command: Commands) -> error::Result<()> {
    match command {
        Commands::Config {
            path,
            create,
            force,
            get,
            delete,
        } => {
            let actions = commands::config::Actions {
                create,
                force,
                get,
                delete,
            };
            commands::config::run(ctx, actions, path.as_deref()).await
        }

        Commands::Deploy {
            chart,
            values_template,
            job,
            image,
        } => {
            let opts = commands::deploy::DeployOptions {
                chart,
                values_template,
                job,
                image,
            };
            commands::deploy::run(ctx, opts).await
        }

        Commands::Integration { force, provider } => commands::integration::run(ctx, force, provider).await,

        Commands::Installer { list, extract } => commands::installer::run(ctx, list, extract.as_deref()),

        Commands::Template {
            chart,
            values_template,
            namespace,
            show_values,
            show_manifests,
        } => {
            let opts = commands::template::TemplateOptions {
                chart,
                values_template,
                namespace,
                show_values,
                show_manifests,
            };
            commands::template::run(ctx, opts).await
        }

        Commands::Topology => commands::topology::run(ctx).await,
    }
}
