//! Chart lifecycle scripts
//!
//! A chart may ship `hooks/pre-deploy.sh` and `hooks/post-deploy.sh`. They run
//! around the release with the rendered values exposed as environment
//! variables: nested keys are upper-cased and joined with `__`, so
//! `{developerHub: {namespace: tssc-dh}}` becomes `DEVELOPERHUB__NAMESPACE`.

use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tssc_core::Chart;

use crate::error::{KubeError, Result};

pub const PRE_DEPLOY: &str = "pre-deploy.sh";
pub const POST_DEPLOY: &str = "post-deploy.sh";

/// Captured output of a hook script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Flatten values into environment variables
pub fn flatten_values(values: &Value) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    if let Value::Object(map) = values {
        for (key, value) in map {
            flatten_into(&mut env, &key.to_uppercase(), value);
        }
    }
    env
}

fn flatten_into(env: &mut BTreeMap<String, String>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (child, value) in map {
                flatten_into(env, &format!("{key}__{}", child.to_uppercase()), value);
            }
        }
        other => {
            env.insert(key.to_string(), scalar_to_string(other));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(scalar_to_string).collect();
            format!("[{}]", items.join(" "))
        }
        Value::Object(_) => value.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    }
}

/// Run the chart's hook script `name`, `None` when the chart has none.
///
/// The script inherits the environment of the installer plus the flattened
/// values. A non-zero exit is a [`KubeError::HookFailed`].
pub async fn run_hook(chart: &Chart, name: &str, values: &Value) -> Result<Option<HookOutput>> {
    let Some(script) = chart.hook_script(name) else {
        tracing::debug!(chart = chart.name(), hook = name, "no hook script");
        return Ok(None);
    };

    let dir = tempfile::tempdir()?;
    let path = dir.path().join(name);
    tokio::fs::write(&path, &script.data).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    tracing::info!(chart = chart.name(), hook = name, "running hook script");
    let output = tokio::process::Command::new(&path)
        .envs(flatten_values(values))
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| hook_failed(chart, name, e.to_string()))?;

    let output = HookOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
    .check(chart, name, output.status)?;
    Ok(Some(output))
}

impl HookOutput {
    fn check(self, chart: &Chart, name: &str, status: std::process::ExitStatus) -> Result<Self> {
        if status.success() {
            return Ok(self);
        }
        let mut message = status.to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            message = format!("{message}: {stderr}");
        }
        Err(hook_failed(chart, name, message))
    }
}

fn hook_failed(chart: &Chart, name: &str, message: String) -> KubeError {
    KubeError::HookFailed {
        chart: chart.name().to_string(),
        hook: name.to_string(),
        message,
    }
}
