//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Prefix of errors raised by the `required` helper
pub(crate) const REQUIRED_PREFIX: &str = "required value missing";

/// Prefix of errors raised by the `lookup` helper
pub(crate) const LOOKUP_PREFIX: &str = "lookup failed";

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error("Rendered values are not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid OpenShift version {version:?}: version does not include a minor part")]
    InvalidVersion { version: String },
}

impl EngineError {
    /// Kind of the underlying template error, if any
    pub fn template_kind(&self) -> Option<TemplateErrorKind> {
        match self {
            Self::Template(e) => Some(e.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    RequiredMissing,
    LookupFailed,
    RenderFailed,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::RequiredMissing => "required_missing",
            Self::LookupFailed => "lookup_failed",
            Self::RenderFailed => "render",
        }
    }
}

/// Template error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(tssc::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Build from a MiniJinja error, mapping the line number onto the source
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let kind = categorize(&err);
        let message = match err.detail() {
            Some(detail) => detail.to_string(),
            None => err.to_string(),
        };
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion: suggestion(kind),
        }
    }

    /// A simple error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::RenderFailed,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            suggestion: None,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    let detail = err.detail().unwrap_or_default();
    if detail.starts_with(REQUIRED_PREFIX) {
        return TemplateErrorKind::RequiredMissing;
    }
    if detail.starts_with(LOOKUP_PREFIX) {
        return TemplateErrorKind::LookupFailed;
    }
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::RenderFailed,
    }
}

fn suggestion(kind: TemplateErrorKind) -> Option<String> {
    match kind {
        TemplateErrorKind::UndefinedVariable => Some(
            "The values template sees `Installer` and `OpenShift`; chart templates see \
             `values`, `release` and `chart`"
                .to_string(),
        ),
        TemplateErrorKind::RequiredMissing => {
            Some("Set the missing value in the cluster configuration and retry".to_string())
        }
        TemplateErrorKind::LookupFailed => {
            Some("Check the cluster connection and the installer permissions".to_string())
        }
        TemplateErrorKind::UnknownFilter | TemplateErrorKind::UnknownFunction => Some(format!(
            "Available helpers: {}",
            crate::functions::HELPERS.join(", ")
        )),
        _ => None,
    }
}

/// Source span covering the given line
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_span() {
        let source = "a: 1\nbb: 2\nccc: 3";
        let span = calculate_span(source, 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 5);
        assert!(calculate_span(source, 9).is_none());
    }

    #[test]
    fn test_categorize_required() {
        let err = minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            format!("{REQUIRED_PREFIX}: domain"),
        );
        let template_error = TemplateError::from_minijinja(err, "values.yaml.tpl", "x");
        assert_eq!(template_error.kind(), TemplateErrorKind::RequiredMissing);
        assert!(template_error.suggestion.is_some());
    }

    #[test]
    fn test_simple() {
        let err = TemplateError::simple("boom");
        assert_eq!(err.kind(), TemplateErrorKind::RenderFailed);
        assert_eq!(err.to_string(), "boom");
    }
}
