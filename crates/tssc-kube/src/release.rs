//! Release records and their storage encoding

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tssc_core::Chart;
use tssc_core::constants::APP_NAME;

use crate::error::{KubeError, Result};

/// Release of a chart, one per revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRelease {
    pub name: String,

    pub namespace: String,

    /// Revision number, starting at 1
    pub revision: u32,

    pub state: ReleaseState,

    pub chart: ReleaseChart,

    /// Values the chart was rendered with
    pub values: serde_json::Value,

    /// Rendered manifest, chart tests excluded
    pub manifest: String,

    /// Chart test documents, applied on verification
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tests: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Chart metadata recorded with a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseChart {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: Option<String>,
}

impl From<&Chart> for ReleaseChart {
    fn from(chart: &Chart) -> Self {
        Self {
            name: chart.name().to_string(),
            version: chart.version().to_string(),
            app_version: chart.metadata().app_version.clone(),
        }
    }
}

impl StoredRelease {
    /// First revision of a release
    pub fn for_install(
        name: &str,
        namespace: &str,
        chart: &Chart,
        values: serde_json::Value,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            state: ReleaseState::PendingInstall,
            chart: ReleaseChart::from(chart),
            values,
            manifest,
            tests: String::new(),
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }

    /// Next revision of an existing release
    pub fn for_upgrade(
        previous: &StoredRelease,
        chart: &Chart,
        values: serde_json::Value,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: previous.name.clone(),
            namespace: previous.namespace.clone(),
            revision: previous.revision + 1,
            state: ReleaseState::PendingUpgrade {
                previous_revision: previous.revision,
            },
            chart: ReleaseChart::from(chart),
            values,
            manifest,
            tests: String::new(),
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }

    /// Name of the secret holding this revision
    pub fn storage_key(&self) -> String {
        storage_key(&self.name, self.revision)
    }

    pub fn mark_deployed(&mut self) {
        self.state = ReleaseState::Deployed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.state = ReleaseState::Failed {
            reason,
            failed_at: Utc::now(),
        };
        self.updated_at = Utc::now();
    }
}

/// `sh.tssc.release.v1.<name>.v<revision>`
pub fn storage_key(name: &str, revision: u32) -> String {
    format!("sh.{APP_NAME}.release.v1.{name}.v{revision}")
}

/// Release state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ReleaseState {
    PendingInstall,

    PendingUpgrade {
        #[serde(rename = "previousRevision")]
        previous_revision: u32,
    },

    Deployed,

    Failed {
        reason: String,
        #[serde(rename = "failedAt")]
        failed_at: DateTime<Utc>,
    },
}

impl ReleaseState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingInstall | Self::PendingUpgrade { .. })
    }

    pub fn status_name(&self) -> &'static str {
        match self {
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade { .. } => "pending-upgrade",
            Self::Deployed => "deployed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { reason, .. } => write!(f, "failed: {reason}"),
            other => write!(f, "{}", other.status_name()),
        }
    }
}

/// Serialize, gzip and base64 encode a release
pub fn encode_for_storage(release: &StoredRelease) -> Result<String> {
    let json = serde_json::to_vec(release)?;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverse of [`encode_for_storage`]
pub fn decode_from_storage(data: &str) -> Result<StoredRelease> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {e}")))?;
    let mut json = Vec::new();
    flate2::read::GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| KubeError::Compression(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Labels of the secret holding a release
pub fn storage_labels(release: &StoredRelease) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("owner".to_string(), APP_NAME.to_string()),
        ("name".to_string(), release.name.clone()),
        ("version".to_string(), release.revision.to_string()),
        ("status".to_string(), release.state.status_name().to_string()),
    ])
}
