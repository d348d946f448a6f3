//! In-cluster deployment job
//!
//! Instead of deploying from the workstation, the installer may submit a
//! batch job running its own container image with cluster-admin rights. Only
//! one such job may exist in the cluster, found by label in all namespaces.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tssc_core::constants::{APP_NAME, REPO_URI};

use crate::client::KubeClient;
use crate::error::{KubeError, Result};
use crate::typed;

/// Arguments of the job container
pub const JOB_ARGS: &[&str] = &["deploy", "--log-level=debug", "--debug", "--dry-run"];

/// Value of the `type` label identifying the installer job
pub fn job_label() -> String {
    format!("installer-job.{REPO_URI}")
}

/// State of the installer job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotFound,
    Deploying,
    Failed,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Deploying => "deploying",
            Self::Failed => "failed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Manages the installer job
#[derive(Clone)]
pub struct InstallerJob {
    kube: Arc<dyn KubeClient>,
    app_name: String,
    retries: i32,
}

impl InstallerJob {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            app_name: APP_NAME.to_string(),
            retries: 0,
        }
    }

    fn type_labels() -> BTreeMap<String, String> {
        BTreeMap::from([("type".to_string(), job_label())])
    }

    /// The single installer job, `None` when absent
    async fn find(&self) -> Result<Option<Job>> {
        let selector = format!("type={}", job_label());
        let mut jobs: Vec<Job> = typed::list(self.kube.as_ref(), None, Some(&selector)).await?;
        match jobs.len() {
            0 => Ok(None),
            1 => Ok(jobs.pop()),
            _ => Err(KubeError::MultipleJobs {
                jobs: jobs
                    .iter()
                    .map(|job| {
                        format!(
                            "{}/{}",
                            job.metadata.namespace.as_deref().unwrap_or_default(),
                            job.metadata.name.as_deref().unwrap_or_default()
                        )
                    })
                    .collect(),
            }),
        }
    }

    pub async fn state(&self) -> Result<JobState> {
        let Some(job) = self.find().await? else {
            return Ok(JobState::NotFound);
        };
        let status = job.status.unwrap_or_default();
        if status.active.unwrap_or(0) > 0 {
            Ok(JobState::Deploying)
        } else if status.failed.unwrap_or(0) > 0 {
            Ok(JobState::Failed)
        } else if status.succeeded.unwrap_or(0) > 0 {
            Ok(JobState::Done)
        } else {
            Err(KubeError::UnknownJobState {
                name: job.metadata.name.unwrap_or_default(),
            })
        }
    }

    /// Command following the job logs
    pub fn log_follow_cmd(&self, namespace: &str) -> String {
        format!(
            "oc --namespace={namespace} logs --follow --selector=\"type={}\"",
            job_label()
        )
    }

    fn service_account(&self, namespace: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some(self.app_name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn cluster_role_binding(&self, namespace: &str) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(self.app_name.clone()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: "cluster-admin".to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.app_name.clone(),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }]),
        }
    }

    fn job(&self, namespace: &str, image: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(format!("{}-deploy-job", self.app_name)),
                namespace: Some(namespace.to_string()),
                labels: Some(Self::type_labels()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(self.retries),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(Self::type_labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.app_name.clone()),
                        restart_policy: Some("Never".to_string()),
                        containers: vec![Container {
                            name: format!("{}-deploy", self.app_name),
                            image: Some(image.to_string()),
                            // In-cluster credentials, from the service account
                            env: Some(vec![EnvVar {
                                name: "KUBECONFIG".to_string(),
                                value: Some(String::new()),
                                ..Default::default()
                            }]),
                            args: Some(JOB_ARGS.iter().map(|a| a.to_string()).collect()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Submit the installer job, refusing when one already exists
    pub async fn create(&self, namespace: &str, image: &str) -> Result<()> {
        let state = self.state().await?;
        if state != JobState::NotFound {
            return Err(KubeError::JobAlreadyExists {
                hint: self.log_follow_cmd(namespace),
            });
        }

        tracing::debug!(namespace, "applying the installer service account");
        typed::apply(self.kube.as_ref(), &self.service_account(namespace)).await?;
        tracing::debug!(namespace, "applying the installer cluster role binding");
        typed::apply(self.kube.as_ref(), &self.cluster_role_binding(namespace)).await?;

        tracing::info!(namespace, image, "creating the installer job");
        typed::create(self.kube.as_ref(), &self.job(namespace, image)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ObjectRef;
    use crate::fake::FakeKubeClient;
    use serde_json::json;

    fn setup() -> (FakeKubeClient, InstallerJob) {
        let fake = FakeKubeClient::new();
        (fake.clone(), InstallerJob::new(Arc::new(fake)))
    }

    #[tokio::test]
    async fn test_create() {
        let (fake, job) = setup();
        assert_eq!(job.state().await.unwrap(), JobState::NotFound);

        job.create("tssc", "quay.io/tssc/installer:latest").await.unwrap();

        let sa = ObjectRef::new("v1", "ServiceAccount", Some("tssc"), "tssc");
        assert!(fake.object(&sa).is_some());
        let crb = ObjectRef::new("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", None, "tssc");
        let crb = fake.object(&crb).unwrap();
        assert_eq!(crb["roleRef"]["name"], "cluster-admin");
        assert_eq!(crb["subjects"][0]["namespace"], "tssc");

        let created = ObjectRef::new("batch/v1", "Job", Some("tssc"), "tssc-deploy-job");
        let created = fake.object(&created).unwrap();
        assert_eq!(
            created["spec"],
            json!({
                "backoffLimit": 0,
                "template": {
                    "metadata": {"labels": {"type": "installer-job.tssc.redhat-appstudio.github.com"}},
                    "spec": {
                        "containers": [{
                            "name": "tssc-deploy",
                            "image": "quay.io/tssc/installer:latest",
                            "env": [{"name": "KUBECONFIG", "value": ""}],
                            "args": ["deploy", "--log-level=debug", "--debug", "--dry-run"]
                        }],
                        "restartPolicy": "Never",
                        "serviceAccountName": "tssc"
                    }
                }
            })
        );

        // The job has no status yet
        assert!(matches!(
            job.state().await,
            Err(KubeError::UnknownJobState { .. })
        ));
        let err = job.create("tssc", "quay.io/tssc/installer:latest").await.unwrap_err();
        assert!(matches!(err, KubeError::UnknownJobState { .. }));
    }

    fn labeled_job(namespace: &str, status: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": "tssc-deploy-job",
                "namespace": namespace,
                "labels": {"type": job_label()}
            },
            "status": status
        })
    }

    #[tokio::test]
    async fn test_states() {
        for (status, expected) in [
            (json!({"active": 1}), JobState::Deploying),
            (json!({"failed": 1}), JobState::Failed),
            (json!({"succeeded": 1}), JobState::Done),
        ] {
            let fake = FakeKubeClient::with_objects([labeled_job("tssc", status)]);
            let job = InstallerJob::new(Arc::new(fake));
            assert_eq!(job.state().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_single_job_per_cluster() {
        let fake = FakeKubeClient::with_objects([labeled_job("tssc", json!({"active": 1}))]);
        let job = InstallerJob::new(Arc::new(fake.clone()));

        let err = job.create("tssc", "image").await.unwrap_err();
        assert!(matches!(err, KubeError::JobAlreadyExists { ref hint } if hint.contains("--follow")));

        fake.insert(labeled_job("other", json!({"active": 1})));
        let err = job.state().await.unwrap_err();
        assert!(matches!(
            err,
            KubeError::MultipleJobs { ref jobs } if jobs == &["other/tssc-deploy-job", "tssc/tssc-deploy-job"]
        ));
    }

    #[test]
    fn test_log_follow_cmd() {
        let (_, job) = setup();
        assert_eq!(
            job.log_follow_cmd("tssc"),
            "oc --namespace=tssc logs --follow --selector=\"type=installer-job.tssc.redhat-appstudio.github.com\""
        );
    }
}
