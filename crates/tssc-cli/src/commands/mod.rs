//! CLI command implementations

pub mod config;
pub mod deploy;
pub mod installer;
pub mod integration;
pub mod template;
pub mod topology;
