//! Chart definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{
    DEPENDS_ON_ANNOTATION, PRODUCT_NAME_ANNOTATION, USE_PRODUCT_NAMESPACE_ANNOTATION,
};
use crate::error::{CoreError, Result};

/// Chart metadata file name, at the chart root
pub const CHART_FILE: &str = "Chart.yaml";

/// Default values file name, at the chart root
pub const VALUES_FILE: &str = "values.yaml";

/// Directory holding the chart templates
pub const TEMPLATES_DIR: &str = "templates";

/// Directory holding the chart lifecycle scripts
pub const HOOKS_DIR: &str = "hooks";

/// Chart metadata, read from `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version (v2)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Annotations, carrying the product and dependency declarations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

/// A file read into memory, the name is relative to the chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl BufferedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File content as text, invalid UTF-8 sequences replaced
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// A chart loaded in memory. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Chart {
    metadata: ChartMetadata,
    values: serde_json::Value,
    files: Vec<BufferedFile>,
}

impl Chart {
    /// Build a chart from its files, names relative to the chart root.
    ///
    /// `path` is only used to report errors.
    pub fn load_files(path: &str, mut files: Vec<BufferedFile>) -> Result<Self> {
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let chart_file = files
            .iter()
            .find(|f| f.name == CHART_FILE)
            .ok_or_else(|| CoreError::InvalidChart {
                path: path.to_string(),
                message: format!("{CHART_FILE} not found"),
            })?;
        let metadata: ChartMetadata =
            serde_yaml::from_slice(&chart_file.data).map_err(|e| CoreError::InvalidChart {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        if metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                path: path.to_string(),
                message: "chart name is empty".to_string(),
            });
        }

        let values = match files.iter().find(|f| f.name == VALUES_FILE) {
            Some(f) => {
                let parsed: serde_json::Value =
                    serde_yaml::from_slice(&f.data).map_err(|e| CoreError::InvalidChart {
                        path: path.to_string(),
                        message: format!("{VALUES_FILE}: {e}"),
                    })?;
                if parsed.is_null() {
                    serde_json::Value::Object(Default::default())
                } else {
                    parsed
                }
            }
            None => serde_json::Value::Object(Default::default()),
        };

        Ok(Self {
            metadata,
            values,
            files,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn metadata(&self) -> &ChartMetadata {
        &self.metadata
    }

    /// Default values, from `values.yaml`
    pub fn values(&self) -> &serde_json::Value {
        &self.values
    }

    pub fn files(&self) -> &[BufferedFile] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&BufferedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Template files, sorted by name. Partials (`_*`) are included, callers
    /// decide whether to render them.
    pub fn templates(&self) -> impl Iterator<Item = &BufferedFile> {
        let prefix = format!("{TEMPLATES_DIR}/");
        self.files
            .iter()
            .filter(move |f| f.name.starts_with(&prefix))
    }

    /// Lifecycle script shipped under `hooks/`, if any
    pub fn hook_script(&self, name: &str) -> Option<&BufferedFile> {
        self.file(&format!("{HOOKS_DIR}/{name}"))
    }

    /// Product this chart is responsible for
    pub fn product_name(&self) -> Option<&str> {
        self.annotation(PRODUCT_NAME_ANNOTATION)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Product whose namespace this chart should be deployed into
    pub fn use_product_namespace(&self) -> Option<&str> {
        self.annotation(USE_PRODUCT_NAMESPACE_ANNOTATION)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Chart names required before this chart: comma separated, trimmed,
    /// empty entries dropped.
    pub fn depends_on(&self) -> Vec<String> {
        self.annotation(DEPENDS_ON_ANNOTATION)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Custom serde for semver::Version
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Build an in-memory chart, used by tests across the workspace.
#[doc(hidden)]
pub fn test_chart(name: &str, annotations: &[(&str, &str)]) -> Chart {
    let mut yaml = format!("apiVersion: v2\nname: {name}\nversion: 0.1.0\n");
    if !annotations.is_empty() {
        yaml.push_str("annotations:\n");
        for (key, value) in annotations {
            yaml.push_str(&format!("  {key}: {value:?}\n"));
        }
    }
    Chart {
        metadata: serde_yaml::from_str(&yaml).unwrap_or_else(|_| ChartMetadata {
            api_version: default_api_version(),
            name: name.to_string(),
            version: Version::new(0, 1, 0),
            description: None,
            app_version: None,
            annotations: BTreeMap::new(),
        }),
        values: serde_json::Value::Object(Default::default()),
        files: vec![BufferedFile::new(CHART_FILE, yaml.into_bytes())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_yaml(body: &str) -> BufferedFile {
        BufferedFile::new(CHART_FILE, body.as_bytes().to_vec())
    }

    #[test]
    fn test_load_files() {
        let files = vec![
            BufferedFile::new("templates/configmap.yaml", b"kind: ConfigMap".to_vec()),
            chart_yaml(
                r#"
apiVersion: v2
name: tssc-dh
version: 0.1.0
annotations:
  tssc.redhat-appstudio.github.com/product-name: "Developer Hub"
  tssc.redhat-appstudio.github.com/depends-on: "tssc-openshift, , tssc-subscriptions "
"#,
            ),
            BufferedFile::new("values.yaml", b"replicas: 2\n".to_vec()),
            BufferedFile::new("hooks/pre-deploy.sh", b"#!/bin/sh\n".to_vec()),
        ];
        let chart = Chart::load_files("charts/tssc-dh", files).unwrap();

        assert_eq!(chart.name(), "tssc-dh");
        assert_eq!(chart.version().to_string(), "0.1.0");
        assert_eq!(chart.product_name(), Some("Developer Hub"));
        assert_eq!(chart.use_product_namespace(), None);
        assert_eq!(
            chart.depends_on(),
            vec!["tssc-openshift".to_string(), "tssc-subscriptions".to_string()]
        );
        assert_eq!(chart.values()["replicas"], 2);
        assert_eq!(chart.templates().count(), 1);
        assert!(chart.hook_script("pre-deploy.sh").is_some());
        assert!(chart.hook_script("post-deploy.sh").is_none());
        // Files are kept sorted
        assert_eq!(chart.files()[0].name, CHART_FILE);
    }

    #[test]
    fn test_missing_chart_file() {
        let files = vec![BufferedFile::new("values.yaml", b"{}".to_vec())];
        let err = Chart::load_files("charts/broken", files).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_invalid_version() {
        let files = vec![chart_yaml("name: broken\nversion: not-semver\n")];
        let err = Chart::load_files("charts/broken", files).unwrap_err();
        assert!(err.to_string().contains("charts/broken"));
    }

    #[test]
    fn test_empty_values_file() {
        let files = vec![
            chart_yaml("name: empty\nversion: 1.0.0\n"),
            BufferedFile::new("values.yaml", b"# nothing here\n".to_vec()),
        ];
        let chart = Chart::load_files("charts/empty", files).unwrap();
        assert!(chart.values().as_object().unwrap().is_empty());
        assert!(chart.depends_on().is_empty());
        assert_eq!(chart.metadata().api_version, "v2");
    }

    #[test]
    fn test_test_chart_helper() {
        let chart = test_chart("a", &[(PRODUCT_NAME_ANNOTATION, "P")]);
        assert_eq!(chart.name(), "a");
        assert_eq!(chart.product_name(), Some("P"));
    }
}
