//! Log subscriber setup

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the global subscriber writing to stderr. `RUST_LOG`, when set,
/// takes precedence over `--log-level`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));

    // A second initialization (tests) is not an error worth reporting
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// Filter directive for the installer crates, other crates stay at `warn`
fn directive(level: &str) -> String {
    ["tssc", "tssc_core", "tssc_engine", "tssc_kube", "tssc_integrations"]
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={level}"))
}
