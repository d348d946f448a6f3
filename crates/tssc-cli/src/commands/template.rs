//! Template command - render the values template and a chart locally

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tssc_core::ChartFs;
use tssc_core::constants::VALUES_FILENAME;
use tssc_engine::{ChartContext, ChartRenderer, Engine, ReleaseInfo};
use tssc_kube::{ClusterLookup, prepare_variables};

use crate::context::{Context, require_dir};
use crate::display;
use crate::error::{CliError, Result};

pub struct TemplateOptions {
    pub chart: Option<PathBuf>,
    pub values_template: Option<PathBuf>,
    pub namespace: String,
    pub show_values: bool,
    pub show_manifests: bool,
}

impl TemplateOptions {
    fn validate(&self) -> Result<Option<&Path>> {
        if !self.show_manifests {
            return Ok(None);
        }
        let chart = self.chart.as_deref().ok_or_else(|| {
            CliError::usage_with_help("missing chart path", "pass the chart directory or --show-manifests=false")
        })?;
        require_dir(chart, "chart path")?;
        Ok(Some(chart))
    }
}

/// Read the values template, a user supplied path first, then the installer
/// resources
pub fn read_values_template(ctx: &Context, path: Option<&Path>) -> Result<String> {
    let cfs = ctx.chart_fs_with_cwd()?;
    let name = path
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| VALUES_FILENAME.to_string());
    tracing::debug!(values_template = %name, "loading values template file");
    let payload = cfs.read(&name)?;
    String::from_utf8(payload).map_err(|e| CliError::usage(format!("values template {name:?} is not valid UTF-8: {e}")))
}

/// Load a chart from a directory on disk
fn load_chart(path: &Path) -> Result<tssc_core::Chart> {
    let path = std::fs::canonicalize(path)?;
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(CliError::usage(format!("invalid chart path {:?}", path.display().to_string())));
    };
    Ok(ChartFs::from_dir(parent)?.load_chart(&name.to_string_lossy())?)
}

pub async fn run(ctx: &Context, opts: TemplateOptions) -> Result<()> {
    let chart_path = opts.validate()?;

    let kube = ctx.kube().await?;
    let cfg = ctx.cluster_config(kube.clone()).await?;

    tracing::debug!("preparing values template context");
    let variables = prepare_variables(kube.as_ref(), &cfg.installer).await?;
    let template = read_values_template(ctx, opts.values_template.as_deref())?;

    tracing::debug!("rendering values from template");
    let engine = Engine::new(Arc::new(ClusterLookup::new(kube.clone())));
    let (text, values) = engine.render_values(&template, &variables)?;

    if opts.show_values && ctx.args.debug {
        display::header("Values (Raw)");
        println!("{text}\n");
    }
    if opts.show_values {
        display::header("Values");
        println!("{}", serde_yaml::to_string(&values)?);
    }

    let Some(chart_path) = chart_path else {
        return Ok(());
    };
    let chart = load_chart(chart_path)?;
    tracing::debug!(chart = chart.name(), namespace = %opts.namespace, "rendering chart manifests");
    let context = ChartContext::new(&chart, &values, ReleaseInfo::for_install(chart.name(), &opts.namespace));
    let rendered = ChartRenderer::new(engine).render(&chart, &context)?;

    display::header(&format!("Chart {} ({})", chart.name(), opts.namespace));
    print!("{}", rendered.manifest());
    if let Some(notes) = rendered.notes {
        display::header("Notes");
        println!("{}", notes.trim_end());
    }
    Ok(())
}
