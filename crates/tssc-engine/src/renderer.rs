//! Chart template rendering

use serde::Serialize;
use std::collections::BTreeMap;
use tssc_core::Chart;
use tssc_core::chart::TEMPLATES_DIR;

use crate::engine::Engine;
use crate::error::{EngineError, Result, TemplateError};

/// Notes template, rendered apart from the manifests
const NOTES_FILE: &str = "NOTES.txt";

/// Release information for chart templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
    pub service: String,
}

impl ReleaseInfo {
    pub fn for_install(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "tssc".to_string(),
        }
    }

    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
            service: "tssc".to_string(),
        }
    }
}

/// Chart information for templates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
}

impl From<&Chart> for ChartInfo {
    fn from(chart: &Chart) -> Self {
        Self {
            name: chart.name().to_string(),
            version: chart.version().to_string(),
            app_version: chart.metadata().app_version.clone(),
        }
    }
}

/// Context available to chart templates
#[derive(Debug, Clone, Serialize)]
pub struct ChartContext {
    /// Chart defaults merged with the rendered installer values
    pub values: serde_json::Value,

    pub release: ReleaseInfo,

    pub chart: ChartInfo,
}

impl ChartContext {
    pub fn new(chart: &Chart, values: &serde_json::Value, release: ReleaseInfo) -> Self {
        Self {
            values: merge_values(chart.values(), values),
            release,
            chart: ChartInfo::from(chart),
        }
    }
}

/// Output of a chart render
#[derive(Debug, Clone, Default)]
pub struct RenderedChart {
    /// Manifests keyed by template path, relative to `templates/`
    pub manifests: BTreeMap<String, String>,

    pub notes: Option<String>,
}

impl RenderedChart {
    /// All manifests joined as a multi-document YAML stream
    pub fn manifest(&self) -> String {
        let mut out = String::new();
        for (name, content) in &self.manifests {
            out.push_str(&format!("---\n# Source: {name}\n"));
            out.push_str(content.trim_start_matches("---\n").trim_end());
            out.push('\n');
        }
        out
    }
}

/// Renders every template of a chart
#[derive(Debug, Clone, Default)]
pub struct ChartRenderer {
    engine: Engine,
}

impl ChartRenderer {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn render(&self, chart: &Chart, context: &ChartContext) -> Result<RenderedChart> {
        let prefix = format!("{TEMPLATES_DIR}/");
        let mut env = self.engine.create_environment();
        let mut sources = BTreeMap::new();

        // Load everything first so partials can be included by any template
        for file in chart.templates() {
            let name = file.name.trim_start_matches(&prefix).to_string();
            let content = file.as_str().into_owned();
            env.add_template_owned(name.clone(), content.clone())
                .map_err(|e| {
                    EngineError::Template(TemplateError::from_minijinja(e, &file.name, &content))
                })?;
            sources.insert(name, content);
        }

        let ctx = minijinja::context! {
            values => &context.values,
            release => &context.release,
            chart => &context.chart,
        };

        let mut rendered = RenderedChart::default();
        for (name, content) in &sources {
            let file_name = name.rsplit('/').next().unwrap_or(name);
            if file_name.starts_with('_') {
                continue;
            }

            let tmpl = env.get_template(name).map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, name, content))
            })?;
            let output = tmpl.render(&ctx).map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, name, content))
            })?;

            if file_name == NOTES_FILE {
                rendered.notes = Some(output);
                continue;
            }

            let trimmed = output.trim();
            if trimmed.is_empty() || trimmed == "---" {
                tracing::debug!(chart = chart.name(), template = %name, "skipping empty manifest");
                continue;
            }
            rendered.manifests.insert(name.clone(), output);
        }

        Ok(rendered)
    }
}

/// Deep merge `overrides` on top of `defaults`. Mappings merge key by key,
/// anything else is replaced.
pub fn merge_values(defaults: &serde_json::Value, overrides: &serde_json::Value) -> serde_json::Value {
    let mut merged = defaults.clone();
    deep_merge_json(&mut merged, overrides);
    merged
}

fn deep_merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_json(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
