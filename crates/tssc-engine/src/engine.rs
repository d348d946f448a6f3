//! Template engine based on MiniJinja

use minijinja::{Environment, UndefinedBehavior};
use std::sync::Arc;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;
use crate::lookup::{Lookup, NoopLookup};
use crate::variables::Variables;

/// Name used for the values template in error reports
pub const VALUES_TEMPLATE_NAME: &str = "values.yaml.tpl";

/// The template engine, shared by the values template and chart templates
#[derive(Clone)]
pub struct Engine {
    lookup: Arc<dyn Lookup>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::offline()
    }
}

impl Engine {
    /// Engine whose `lookup` helper reads through the given reader
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self { lookup }
    }

    /// Engine without cluster access, `lookup` always renders `{}`
    pub fn offline() -> Self {
        Self::new(Arc::new(NoopLookup))
    }

    /// Create a configured MiniJinja environment
    pub(crate) fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_keep_trailing_newline(true);

        // Helpers usable both as filters and as functions
        env.add_filter("toYaml", filters::to_yaml);
        env.add_function("toYaml", filters::to_yaml);
        env.add_filter("fromYaml", filters::from_yaml);
        env.add_function("fromYaml", filters::from_yaml);
        env.add_filter("fromYamlArray", filters::from_yaml_array);
        env.add_function("fromYamlArray", filters::from_yaml_array);
        env.add_filter("toJson", filters::to_json);
        env.add_function("toJson", filters::to_json);
        env.add_filter("fromJson", filters::from_json);
        env.add_function("fromJson", filters::from_json);
        env.add_filter("fromJsonArray", filters::from_json_array);
        env.add_function("fromJsonArray", filters::from_json_array);
        env.add_filter("required", filters::required);
        env.add_function("required", functions::required);
        env.add_function("lookup", functions::lookup_fn(Arc::clone(&self.lookup)));

        // String helpers
        env.add_filter("b64enc", filters::b64enc);
        env.add_filter("b64dec", filters::b64dec);
        env.add_filter("quote", filters::quote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("trimPrefix", filters::trim_prefix);
        env.add_filter("trimSuffix", filters::trim_suffix);
        env.add_filter("sha256sum", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);

        // Dicts, lists and dates
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("now", functions::now);
        env.add_function("dateFormat", functions::date_format);

        env
    }

    /// Render a template string against an arbitrary serializable context
    pub fn render_str<S: serde::Serialize>(
        &self,
        template: &str,
        context: S,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
            })?;

        let tmpl = env.get_template(template_name).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
        })?;

        tmpl.render(minijinja::Value::from_serialize(&context))
            .map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
            })
    }

    /// Render the values template against `{ Installer, OpenShift }`
    pub fn render(&self, template: &str, variables: &Variables) -> Result<String> {
        self.render_str(template, variables.to_value(), VALUES_TEMPLATE_NAME)
    }

    /// Render the values template and parse the result as YAML
    pub fn render_values(
        &self,
        template: &str,
        variables: &Variables,
    ) -> Result<(String, serde_json::Value)> {
        let text = self.render(template, variables)?;
        let values: serde_json::Value = serde_yaml::from_str(&text)?;
        let values = if values.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            values
        };
        Ok((text, values))
    }
}
