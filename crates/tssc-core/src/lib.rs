//! TSSC Core - Core types for the Trusted Software Supply Chain installer
//!
//! This crate provides the foundational types used throughout the installer:
//! - `Chart`: a packaged application loaded in memory
//! - `ChartFs`: the installer resources, embedded in the binary or on disk
//! - `Config`: the cluster configuration (installer namespace, settings, products)
//! - `Resolver`: turns a `Config` and a `Collection` of charts into a `Topology`

pub mod chart;
pub mod chartfs;
pub mod config;
pub mod constants;
pub mod error;
pub mod resolver;

pub use chart::{BufferedFile, Chart, ChartMetadata};
pub use chartfs::{ChartFs, EntryKind, InstallerEntry};
pub use config::{Config, Product, Spec};
pub use error::{CoreError, Result};
pub use resolver::{Collection, Dependency, Resolver, Topology};
