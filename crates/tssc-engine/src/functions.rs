//! Template functions (global functions available in templates)

use minijinja::{Error, ErrorKind, Value};
use std::sync::Arc;

use crate::error::LOOKUP_PREFIX;
use crate::lookup::Lookup;

/// Helper names registered on top of the MiniJinja builtins
pub const HELPERS: &[&str] = &[
    "toYaml",
    "fromYaml",
    "fromYamlArray",
    "toJson",
    "fromJson",
    "fromJsonArray",
    "required",
    "lookup",
    "b64enc",
    "b64dec",
    "quote",
    "indent",
    "nindent",
    "trimPrefix",
    "trimSuffix",
    "sha256sum",
    "trunc",
    "dict",
    "list",
    "get",
    "coalesce",
    "ternary",
    "now",
    "dateFormat",
];

/// Fail when the value is undefined, null or an empty string
///
/// Usage: {{ required("ingress domain", OpenShift.Ingress.Domain) }}
pub fn required(name: String, value: Value) -> Result<Value, Error> {
    crate::filters::required(value, Some(name))
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = indexmap::IndexMap::new();
    for chunk in args.chunks(2) {
        let key = chunk[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        map.insert(key.to_string(), chunk[1].clone());
    }
    Ok(Value::from_iter(map))
}

/// Usage: {{ list("a", "b", "c") }}
pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Get a key with a default when undefined
///
/// Usage: {{ get(Installer.Settings, "crc", false) }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// First value that is neither undefined, null nor an empty string
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|arg| {
            !arg.is_undefined() && !arg.is_none() && arg.as_str().is_none_or(|s| !s.is_empty())
        })
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("yes", "no", condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

/// Current UTC timestamp, RFC 3339
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Format an RFC 3339 timestamp with a strftime pattern
///
/// Usage: {{ dateFormat("%Y-%m-%d", now()) }}
pub fn date_format(format: String, timestamp: String) -> Result<String, Error> {
    let parsed = chrono::DateTime::parse_from_rfc3339(&timestamp).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid timestamp {timestamp:?}: {e}"),
        )
    })?;
    Ok(parsed.format(&format).to_string())
}

/// Build the `lookup(apiVersion, kind, namespace, name)` function.
///
/// Not found resources render as an empty mapping. Any other failure is a
/// template error.
pub fn lookup_fn(
    lookup: Arc<dyn Lookup>,
) -> impl Fn(String, String, String, Option<String>) -> Result<Value, Error> + Send + Sync + 'static
{
    move |api_version, kind, namespace, name| {
        let name = name.unwrap_or_default();
        match lookup.lookup(&api_version, &kind, &namespace, &name) {
            Ok(Some(found)) => Ok(Value::from_serialize(&found)),
            Ok(None) => Ok(Value::from_serialize(serde_json::json!({}))),
            Err(e) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("{LOOKUP_PREFIX}: {api_version}/{kind} {namespace}/{name}: {e}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::REQUIRED_PREFIX;
    use crate::lookup::{LookupError, StaticLookup};

    #[test]
    fn test_dict_and_list() {
        let value = dict(vec![Value::from("a"), Value::from(1)]).unwrap();
        assert_eq!(value.get_attr("a").unwrap(), Value::from(1));
        assert!(dict(vec![Value::from("a")]).is_err());
        assert_eq!(list(vec![Value::from(1), Value::from(2)]).len(), Some(2));
    }

    #[test]
    fn test_get_and_coalesce() {
        let obj = Value::from_serialize(serde_json::json!({"crc": true}));
        assert_eq!(get(obj.clone(), "crc".into(), None), Value::from(true));
        assert_eq!(get(obj, "missing".into(), Some(Value::from(0))), Value::from(0));
        assert_eq!(
            coalesce(vec![Value::UNDEFINED, Value::from(""), Value::from("x")]),
            Value::from("x")
        );
        assert!(coalesce(vec![]).is_undefined());
    }

    #[test]
    fn test_required_function() {
        let err = required("domain".into(), Value::UNDEFINED).unwrap_err();
        assert!(err.detail().unwrap().starts_with(REQUIRED_PREFIX));
        assert_eq!(
            required("domain".into(), Value::from("apps.example.com")).unwrap(),
            Value::from("apps.example.com")
        );
    }

    #[test]
    fn test_date_format() {
        assert_eq!(
            date_format("%Y".into(), "2024-05-01T10:00:00Z".into()).unwrap(),
            "2024"
        );
        assert!(date_format("%Y".into(), "yesterday".into()).is_err());
        assert!(now().ends_with('Z'));
    }

    struct FailingLookup;

    impl Lookup for FailingLookup {
        fn lookup(
            &self,
            _api_version: &str,
            _kind: &str,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<Option<serde_json::Value>, LookupError> {
            Err(LookupError::new("connection refused"))
        }
    }

    #[test]
    fn test_lookup_fn() {
        let lookup = lookup_fn(Arc::new(StaticLookup::new()));
        let value = lookup("v1".into(), "ConfigMap".into(), "ns".into(), Some("missing".into()))
            .unwrap();
        assert_eq!(value.len(), Some(0));

        let failing = lookup_fn(Arc::new(FailingLookup));
        let err = failing("v1".into(), "Secret".into(), "ns".into(), None).unwrap_err();
        assert!(err.detail().unwrap().starts_with(LOOKUP_PREFIX));
    }
}
