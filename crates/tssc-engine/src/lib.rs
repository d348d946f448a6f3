//! TSSC Engine - templating for the installer
//!
//! This crate provides:
//! - `Engine`: renders the values template against the installer `Variables`
//! - `ChartRenderer`: renders chart templates into Kubernetes manifests
//! - `Lookup`: the seam for live cluster reads from templates
//! - Helm flavored helpers (toYaml, fromYaml, required, lookup, ...)

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod lookup;
pub mod renderer;
pub mod variables;

pub use engine::Engine;
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use lookup::{Lookup, LookupError, NoopLookup, StaticLookup};
pub use renderer::{
    ChartContext, ChartInfo, ChartRenderer, ReleaseInfo, RenderedChart, merge_values,
};
pub use variables::{OpenShiftInfo, Variables, minor_version};
