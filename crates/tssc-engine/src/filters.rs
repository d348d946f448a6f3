//! Template filters
//!
//! Helm flavored helpers. Filters receive the piped value first, e.g.
//! `{{ Installer.Settings | toYaml | nindent(2) }}`.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

use crate::error::REQUIRED_PREFIX;

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

fn to_json_value(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(invalid)
}

/// Convert a value to YAML
///
/// Usage: {{ Installer.Settings | toYaml }}
pub fn to_yaml(value: Value) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    let yaml = serde_yaml::to_string(&to_json_value(&value)?).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Parse a YAML mapping
///
/// Usage: {{ (payload | fromYaml).key }}
pub fn from_yaml(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_yaml::from_str(&value).map_err(invalid)?;
    match parsed {
        serde_json::Value::Null => Ok(Value::from_serialize(serde_json::json!({}))),
        serde_json::Value::Object(_) => Ok(Value::from_serialize(&parsed)),
        other => Err(invalid(format!("fromYaml expects a mapping, got {other}"))),
    }
}

/// Parse a YAML sequence
///
/// Usage: {% for item in payload | fromYamlArray %}
pub fn from_yaml_array(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_yaml::from_str(&value).map_err(invalid)?;
    match parsed {
        serde_json::Value::Null => Ok(Value::from(Vec::<Value>::new())),
        serde_json::Value::Array(_) => Ok(Value::from_serialize(&parsed)),
        other => Err(invalid(format!("fromYamlArray expects a sequence, got {other}"))),
    }
}

/// Convert a value to compact JSON
///
/// Usage: {{ Installer.Products | toJson }}
pub fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json_value(&value)?).map_err(invalid)
}

/// Parse a JSON object
pub fn from_json(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(&value).map_err(invalid)?;
    if !parsed.is_object() {
        return Err(invalid("fromJson expects an object"));
    }
    Ok(Value::from_serialize(&parsed))
}

/// Parse a JSON array
pub fn from_json_array(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(&value).map_err(invalid)?;
    if !parsed.is_array() {
        return Err(invalid("fromJsonArray expects an array"));
    }
    Ok(Value::from_serialize(&parsed))
}

/// Fail when the value is undefined, null or an empty string
///
/// Usage: {{ OpenShift.Ingress.Domain | required("ingress domain") }}
pub fn required(value: Value, name: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        let name = name.unwrap_or_else(|| "value".to_string());
        return Err(invalid(format!("{REQUIRED_PREFIX}: {name}")));
    }
    Ok(value)
}

#[must_use]
pub fn b64enc(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64dec(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {e}")))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {e}")))
}

/// Quote a value with double quotes
#[must_use]
pub fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Indent every non-empty line
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Newline followed by the indented value
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

pub fn trim_prefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trim_suffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}
