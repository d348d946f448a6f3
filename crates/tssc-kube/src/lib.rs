//! TSSC Kube - cluster side of the TSSC installer
//!
//! This crate provides:
//! - **Cluster access**: the `KubeClient` interface, backed by `kube` or by an in-memory fake
//! - **Configuration storage**: the cluster configuration as a labeled `ConfigMap`
//! - **Releases**: chart rendering, ordered server-side apply and release records in Secrets
//! - **Executor**: the per-chart pipeline of hooks, release, verification and monitoring
//! - **Installer job**: the single in-cluster deployment job
//! - **OpenShift**: cluster facts for the values template and project bootstrap

pub mod cancel;
pub mod cleanup;
pub mod client;
pub mod cluster;
pub mod config_store;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod fake;
pub mod hooks;
pub mod job;
pub mod lookup;
pub mod monitor;
pub mod openshift;
pub mod release;
pub mod resources;
pub mod storage;
pub mod typed;

pub use cancel::{CancelHandle, CancelSignal};
pub use cleanup::{delete_resources, retry_delete_resources};
pub use client::{FIELD_MANAGER, KubeClient, ObjectRef};
pub use cluster::ClusterClient;
pub use config_store::ConfigStore;
pub use deployer::{DeployOptions, Deployer, Deployment};
pub use error::{KubeError, Result};
pub use executor::{Execution, Executor, ExecutorState, prepare_variables};
pub use fake::{FakeKubeClient, OperationCounts};
pub use job::{InstallerJob, JobState};
pub use lookup::ClusterLookup;
pub use monitor::{Monitor, ReadinessCheck};
pub use openshift::{cluster_info, ensure_openshift_project};
pub use release::{ReleaseState, StoredRelease};
pub use resources::{Resource, ResourceCategory};
pub use storage::ReleaseStore;
