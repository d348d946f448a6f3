//! Readiness monitoring of released resources
//!
//! While a release is applied, interesting objects are collected into a queue
//! of readiness checks. Draining the queue polls the head check until it
//! passes, then moves to the next one, all bounded by a single timeout.

use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::{KubeClient, ObjectRef};
use crate::error::{KubeError, Result};

/// Pause after a failed check
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A condition the cluster must reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCheck {
    /// The namespace exists
    NamespaceExists(String),
}

impl ReadinessCheck {
    /// Check for a released object, if it needs one
    pub fn for_object(object: &Value) -> Result<Option<Self>> {
        let reference = ObjectRef::from_object(object)?;
        let check = match (reference.api_version.as_str(), reference.kind.as_str()) {
            ("project.openshift.io/v1", "ProjectRequest") => {
                Some(Self::NamespaceExists(reference.name))
            }
            _ => None,
        };
        Ok(check)
    }

    async fn check(&self, kube: &dyn KubeClient) -> Result<bool> {
        match self {
            Self::NamespaceExists(name) => {
                let namespace = ObjectRef::new("v1", "Namespace", None, name);
                Ok(kube.get(&namespace).await?.is_some())
            }
        }
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamespaceExists(name) => write!(f, "namespace '{name}'"),
        }
    }
}

/// Queue of readiness checks
pub struct Monitor {
    kube: Arc<dyn KubeClient>,
    queue: VecDeque<ReadinessCheck>,
}

impl Monitor {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            queue: VecDeque::new(),
        }
    }

    /// Inspect a released object, enqueueing a check when relevant
    pub fn collect(&mut self, object: Option<&Value>) -> Result<()> {
        let object = object.filter(|o| !o.is_null()).ok_or(KubeError::NilResource)?;
        if let Some(check) = ReadinessCheck::for_object(object)? {
            tracing::debug!(check = %check, "monitoring resource");
            self.queue.push_back(check);
        }
        Ok(())
    }

    pub fn pending(&self) -> impl Iterator<Item = &ReadinessCheck> {
        self.queue.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the queue in order. Failing checks are retried every
    /// [`POLL_INTERVAL`] until `timeout` elapses.
    pub async fn watch(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(head) = self.queue.front() else {
                return Ok(());
            };
            if Instant::now() >= deadline {
                return Err(KubeError::MonitorTimeout {
                    timeout,
                    pending: self.queue.iter().map(ToString::to_string).collect(),
                });
            }

            match head.check(self.kube.as_ref()).await {
                Ok(true) => {
                    tracing::debug!(check = %head, "resource is ready");
                    self.queue.pop_front();
                    continue;
                }
                Ok(false) => tracing::debug!(check = %head, "resource is not ready yet"),
                Err(e) => tracing::debug!(check = %head, error = %e, "readiness check failed"),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use serde_json::json;

    fn project_request(name: &str) -> Value {
        json!({
            "apiVersion": "project.openshift.io/v1",
            "kind": "ProjectRequest",
            "metadata": {"name": name}
        })
    }

    #[test]
    fn test_collect() {
        let mut monitor = Monitor::new(Arc::new(FakeKubeClient::new()));
        assert!(matches!(monitor.collect(None), Err(KubeError::NilResource)));
        assert!(matches!(
            monitor.collect(Some(&Value::Null)),
            Err(KubeError::NilResource)
        ));

        monitor
            .collect(Some(&json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "c"}})))
            .unwrap();
        assert!(monitor.is_empty());

        monitor.collect(Some(&project_request("tssc-app"))).unwrap();
        let pending: Vec<_> = monitor.pending().cloned().collect();
        assert_eq!(pending, vec![ReadinessCheck::NamespaceExists("tssc-app".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_succeeds() {
        let fake = FakeKubeClient::with_objects([json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "tssc-app"}
        })]);
        let mut monitor = Monitor::new(Arc::new(fake));
        monitor.collect(Some(&project_request("tssc-app"))).unwrap();
        monitor.watch(Duration::from_secs(10)).await.unwrap();
        assert!(monitor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_waits_for_namespace() {
        let fake = FakeKubeClient::new();
        let mut monitor = Monitor::new(Arc::new(fake.clone()));
        monitor.collect(Some(&project_request("tssc-app"))).unwrap();

        let creator = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            fake.insert(json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": "tssc-app"}
            }));
        });

        let started = Instant::now();
        monitor.watch(Duration::from_secs(60)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        creator.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_timeout() {
        let mut monitor = Monitor::new(Arc::new(FakeKubeClient::new()));
        monitor.collect(Some(&project_request("tssc-app"))).unwrap();

        let err = monitor.watch(Duration::from_secs(7)).await.unwrap_err();
        match err {
            KubeError::MonitorTimeout { pending, .. } => {
                assert_eq!(pending, vec!["namespace 'tssc-app'".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
