//! Chart releases: render, apply and record
//!
//! A release is named after its chart and lives in the namespace chosen by
//! the topology. The deployer renders the chart with the installer values,
//! applies the objects in dependency order with server-side apply and keeps
//! a record of the release as a Secret. Kinds without the `patch` verb are
//! created instead. On upgrade, objects dropped from the chart since the
//! previous revision are deleted. Chart tests are kept apart and only run by
//! [`Deployer::verify`].

use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tssc_core::Chart;
use tssc_engine::{ChartContext, ChartRenderer, ReleaseInfo};

use crate::cancel::CancelSignal;
use crate::client::KubeClient;
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;
use crate::resources::{self, Resource};
use crate::storage::ReleaseStore;

/// Pause between checks of chart test pods
pub const TEST_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Revisions kept once a release is deployed
pub const MAX_HISTORY: usize = 1;

/// Options shared by install and upgrade
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Release name
    pub name: String,

    /// Release namespace
    pub namespace: String,

    /// Bounds the whole release, and chart tests on verification
    pub timeout: Duration,

    /// Validate against the cluster without persisting anything
    pub dry_run: bool,
}

impl DeployOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: Duration::from_secs(15 * 60),
            dry_run: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Outcome of an install or upgrade
#[derive(Debug, Clone)]
pub struct Deployment {
    pub release: StoredRelease,

    /// Objects as returned by the cluster, in apply order
    pub resources: Vec<Value>,
}

/// Installs and upgrades chart releases
#[derive(Clone)]
pub struct Deployer {
    kube: Arc<dyn KubeClient>,
    store: ReleaseStore,
    renderer: ChartRenderer,
    cancel: CancelSignal,
}

impl Deployer {
    pub fn new(kube: Arc<dyn KubeClient>, renderer: ChartRenderer, cancel: CancelSignal) -> Self {
        Self {
            store: ReleaseStore::new(kube.clone()),
            kube,
            renderer,
            cancel,
        }
    }

    /// Latest revision of the release, `None` when it was never installed
    pub async fn probe(&self, namespace: &str, name: &str) -> Result<Option<StoredRelease>> {
        match self.store.latest(namespace, name).await {
            Ok(release) => Ok(Some(release)),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn install(
        &self,
        chart: &Chart,
        values: &Value,
        options: &DeployOptions,
    ) -> Result<Deployment> {
        let info = ReleaseInfo::for_install(&options.name, &options.namespace);
        let release = StoredRelease::for_install(
            &options.name,
            &options.namespace,
            chart,
            values.clone(),
            String::new(),
        );
        self.deploy(chart, values, options, info, release, None)
            .await
            .map_err(|e| wrap(e, |message| KubeError::InstallFailed {
                chart: chart.name().to_string(),
                message,
            }))
    }

    pub async fn upgrade(
        &self,
        chart: &Chart,
        values: &Value,
        previous: &StoredRelease,
        options: &DeployOptions,
    ) -> Result<Deployment> {
        let release = StoredRelease::for_upgrade(previous, chart, values.clone(), String::new());
        let info = ReleaseInfo::for_upgrade(&options.name, &options.namespace, release.revision);
        self.deploy(chart, values, options, info, release, Some(previous))
            .await
            .map_err(|e| wrap(e, |message| KubeError::UpgradeFailed {
                chart: chart.name().to_string(),
                message,
            }))
    }

    async fn deploy(
        &self,
        chart: &Chart,
        values: &Value,
        options: &DeployOptions,
        info: ReleaseInfo,
        mut release: StoredRelease,
        previous: Option<&StoredRelease>,
    ) -> Result<Deployment> {
        let context = ChartContext::new(chart, values, info);
        let rendered = self.renderer.render(chart, &context)?;
        let (mut install, tests) = resources::partition_tests(resources::parse_manifest(
            &rendered.manifest(),
        )?);
        resources::scope_resources(self.kube.as_ref(), &mut install, &options.namespace).await?;
        resources::sort_for_apply(&mut install);

        release.manifest = to_manifest(&install)?;
        release.tests = to_manifest(&tests)?;
        release.notes = rendered.notes;

        if options.dry_run {
            tracing::info!(release = %release.name, namespace = %release.namespace, "dry-run, validating resources");
            let applied = self.bounded(options.timeout, self.apply_all(&install, true)).await?;
            return Ok(Deployment {
                release,
                resources: applied,
            });
        }

        tracing::info!(
            release = %release.name,
            namespace = %release.namespace,
            revision = release.revision,
            resources = install.len(),
            "applying release"
        );
        self.store.create(&release).await?;

        match self.bounded(options.timeout, self.apply_all(&install, false)).await {
            Ok(applied) => {
                if let Some(previous) = previous {
                    self.delete_stale(previous, &install).await;
                }
                release.mark_deployed();
                self.store.update(&release).await?;
                self.store
                    .prune(&release.namespace, &release.name, MAX_HISTORY)
                    .await?;
                Ok(Deployment {
                    release,
                    resources: applied,
                })
            }
            Err(e) => {
                release.mark_failed(e.to_string());
                if let Err(store_err) = self.store.update(&release).await {
                    tracing::warn!(release = %release.name, error = %store_err, "unable to record the failed release");
                }
                Err(e)
            }
        }
    }

    async fn apply_all(&self, resources: &[Resource], dry_run: bool) -> Result<Vec<Value>> {
        let mut applied = Vec::with_capacity(resources.len());
        for resource in resources {
            let obj = self.apply_one(resource, dry_run).await.map_err(|e| {
                KubeError::InvalidManifest(format!("failed to apply {}: {e}", resource.reference))
            })?;
            applied.push(obj);
        }
        Ok(applied)
    }

    async fn apply_one(&self, resource: &Resource, dry_run: bool) -> Result<Value> {
        let reference = &resource.reference;
        if self
            .kube
            .supports_apply(&reference.api_version, &reference.kind)
            .await?
        {
            tracing::debug!(resource = %reference, dry_run, "applying");
            return self.kube.apply(&resource.object, dry_run).await;
        }

        if dry_run {
            tracing::debug!(resource = %reference, "create only kind, skipped on dry-run");
            return Ok(resource.object.clone());
        }
        tracing::debug!(resource = %reference, "creating");
        match self.kube.create(&resource.object).await {
            Err(e) if e.is_conflict() => {
                tracing::debug!(resource = %reference, "already exists");
                Ok(resource.object.clone())
            }
            other => other,
        }
    }

    /// Delete the objects of the previous revision missing from the current
    /// one, in reverse apply order. Create only kinds are left alone. Failures
    /// are logged, the new revision is already in place.
    async fn delete_stale(&self, previous: &StoredRelease, current: &[Resource]) {
        let previous_resources = match resources::parse_manifest(&previous.manifest) {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(release = %previous.name, error = %e, "unable to read the previous manifest");
                return;
            }
        };
        let kept: HashSet<_> = current.iter().map(|r| &r.reference).collect();
        let mut stale: Vec<Resource> = previous_resources
            .into_iter()
            .filter(|r| !kept.contains(&r.reference))
            .collect();
        resources::sort_for_apply(&mut stale);

        for resource in stale.iter().rev() {
            let reference = &resource.reference;
            match self
                .kube
                .supports_apply(&reference.api_version, &reference.kind)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(resource = %reference, "keeping create only object");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(resource = %reference, error = %e, "unable to delete object dropped from the chart");
                    continue;
                }
            }
            match self.kube.delete(reference).await {
                Ok(true) => tracing::info!(resource = %reference, "deleted object dropped from the chart"),
                Ok(false) => tracing::debug!(resource = %reference, "object already gone"),
                Err(e) => tracing::warn!(resource = %reference, error = %e, "unable to delete object dropped from the chart"),
            }
        }
    }

    /// Run the chart tests of a deployed release
    pub async fn verify(&self, release: &StoredRelease, timeout: Duration) -> Result<()> {
        let mut tests = resources::parse_manifest(&release.tests)?;
        if tests.is_empty() {
            tracing::debug!(release = %release.name, "release has no tests");
            return Ok(());
        }
        resources::scope_resources(self.kube.as_ref(), &mut tests, &release.namespace).await?;

        tracing::info!(release = %release.name, tests = tests.len(), "verifying release");
        self.bounded(timeout, self.run_tests(&tests))
            .await
            .map_err(|e| wrap(e, |message| KubeError::VerifyFailed {
                chart: release.chart.name.clone(),
                message,
            }))
    }

    async fn run_tests(&self, tests: &[Resource]) -> Result<()> {
        for test in tests {
            // Test objects are recreated on every run
            self.kube.delete(&test.reference).await?;
            self.kube.create(&test.object).await?;
        }

        for test in tests.iter().filter(|t| t.reference.kind == "Pod") {
            loop {
                let phase = self
                    .kube
                    .get(&test.reference)
                    .await?
                    .and_then(|pod| {
                        pod.pointer("/status/phase")
                            .and_then(Value::as_str)
                            .map(String::from)
                    });
                match phase.as_deref() {
                    Some("Succeeded") => {
                        tracing::debug!(test = %test.reference, "test succeeded");
                        break;
                    }
                    Some("Failed") => {
                        return Err(KubeError::InvalidManifest(format!(
                            "test {} failed",
                            test.reference
                        )));
                    }
                    _ => tokio::time::sleep(TEST_POLL_INTERVAL).await,
                }
            }
        }
        Ok(())
    }

    /// Bound an operation by `timeout` and the cancel signal
    async fn bounded<T>(
        &self,
        timeout: Duration,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.cancel
            .run(async {
                tokio::time::timeout(timeout, operation)
                    .await
                    .map_err(|_| {
                        KubeError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("timed out after {}", humantime::format_duration(timeout)),
                        ))
                    })?
            })
            .await
    }
}

/// Wrap a failure, cancellation passes through
fn wrap(e: KubeError, f: impl FnOnce(String) -> KubeError) -> KubeError {
    match e {
        KubeError::Cancelled => KubeError::Cancelled,
        other => f(other.to_string()),
    }
}

fn to_manifest(resources: &[Resource]) -> Result<String> {
    let mut out = String::new();
    for resource in resources {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&resource.object)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use crate::release::ReleaseState;
    use serde_json::json;
    use tssc_core::BufferedFile;

    fn chart() -> Chart {
        Chart::load_files(
            "charts/tssc-dh",
            vec![
                BufferedFile::new(
                    "Chart.yaml",
                    "apiVersion: v2\nname: tssc-dh\nversion: 0.1.0\n",
                ),
                BufferedFile::new("values.yaml", "replicas: 1\n"),
                BufferedFile::new(
                    "templates/configmap.yaml",
                    "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ release.name }}-config\ndata:\n  replicas: \"{{ values.replicas }}\"\n  revision: \"{{ release.revision }}\"\n",
                ),
                BufferedFile::new(
                    "templates/project.yaml",
                    "apiVersion: project.openshift.io/v1\nkind: ProjectRequest\nmetadata:\n  name: tssc-app\n",
                ),
                BufferedFile::new(
                    "templates/tests/test-connection.yaml",
                    "apiVersion: v1\nkind: Pod\nmetadata:\n  name: {{ release.name }}-test\n  annotations:\n    helm.sh/hook: test\nspec:\n  restartPolicy: Never\n",
                ),
            ],
        )
        .unwrap()
    }

    fn deployer(fake: &FakeKubeClient) -> Deployer {
        Deployer::new(
            Arc::new(fake.clone()),
            ChartRenderer::default(),
            CancelSignal::never(),
        )
    }

    fn config_map(fake: &FakeKubeClient) -> Option<Value> {
        fake.object(&crate::client::ObjectRef::new(
            "v1",
            "ConfigMap",
            Some("tssc"),
            "tssc-dh-config",
        ))
    }

    #[tokio::test]
    async fn test_install_then_upgrade() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let chart = chart();
        let options = DeployOptions::new("tssc-dh", "tssc");

        assert!(deployer.probe("tssc", "tssc-dh").await.unwrap().is_none());

        let deployment = deployer
            .install(&chart, &json!({"replicas": 2}), &options)
            .await
            .unwrap();
        assert_eq!(deployment.release.state, ReleaseState::Deployed);
        assert_eq!(deployment.resources.len(), 2);
        assert!(deployment.release.tests.contains("tssc-dh-test"));
        assert!(!deployment.release.manifest.contains("tssc-dh-test"));
        assert_eq!(config_map(&fake).unwrap()["data"]["replicas"], "2");

        let previous = deployer.probe("tssc", "tssc-dh").await.unwrap().unwrap();
        let deployment = deployer
            .upgrade(&chart, &json!({}), &previous, &options)
            .await
            .unwrap();
        assert_eq!(deployment.release.revision, 2);
        assert_eq!(config_map(&fake).unwrap()["data"]["revision"], "2");
        assert_eq!(config_map(&fake).unwrap()["data"]["replicas"], "1");

        // Only the latest revision is kept
        let store = ReleaseStore::new(Arc::new(fake.clone()));
        assert_eq!(store.history("tssc", "tssc-dh").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_project_request_is_created() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let options = DeployOptions::new("tssc-dh", "tssc");

        deployer.install(&chart(), &json!({}), &options).await.unwrap();
        // The release record and the project request are created, the
        // config map is applied
        let counts = fake.operation_counts();
        assert_eq!(counts.creates, 2);
        assert_eq!(counts.applies, 1);
        let ns = crate::client::ObjectRef::new("v1", "Namespace", None, "tssc-app");
        assert!(fake.object(&ns).is_some());

        // Upgrades tolerate the existing project
        let previous = deployer.probe("tssc", "tssc-dh").await.unwrap().unwrap();
        deployer
            .upgrade(&chart(), &json!({}), &previous, &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upgrade_deletes_dropped_objects() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let options = DeployOptions::new("tssc-dh", "tssc");
        let chart_with = |templates: &[(&str, &str)]| {
            let mut files = vec![BufferedFile::new(
                "Chart.yaml",
                "apiVersion: v2\nname: tssc-dh\nversion: 0.1.0\n",
            )];
            files.extend(templates.iter().map(|(path, content)| BufferedFile::new(*path, *content)));
            Chart::load_files("charts/tssc-dh", files).unwrap()
        };
        let settings = ("templates/settings.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n");
        let legacy = ("templates/legacy.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: legacy\n");
        let project = (
            "templates/project.yaml",
            "apiVersion: project.openshift.io/v1\nkind: ProjectRequest\nmetadata:\n  name: tssc-app\n",
        );

        deployer
            .install(&chart_with(&[settings, legacy, project]), &json!({}), &options)
            .await
            .unwrap();
        let legacy_ref = crate::client::ObjectRef::new("v1", "ConfigMap", Some("tssc"), "legacy");
        assert!(fake.object(&legacy_ref).is_some());

        let previous = deployer.probe("tssc", "tssc-dh").await.unwrap().unwrap();
        deployer
            .upgrade(&chart_with(&[settings]), &json!({}), &previous, &options)
            .await
            .unwrap();

        assert!(fake.object(&legacy_ref).is_none());
        let settings_ref = crate::client::ObjectRef::new("v1", "ConfigMap", Some("tssc"), "settings");
        assert!(fake.object(&settings_ref).is_some());
        // Project requests can't be deleted, the project stays
        let project_ref =
            crate::client::ObjectRef::new("project.openshift.io/v1", "ProjectRequest", None, "tssc-app");
        assert!(fake.object(&project_ref).is_some());
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let options = DeployOptions::new("tssc-dh", "tssc").with_dry_run(true);

        let deployment = deployer.install(&chart(), &json!({}), &options).await.unwrap();
        assert!(deployment.release.state.is_pending());
        assert!(fake.references().is_empty());
        // The project request can only be created, so it is not sent on dry-run
        let counts = fake.operation_counts();
        assert_eq!(counts.applies, 1);
        assert_eq!(counts.creates, 0);
    }

    #[tokio::test]
    async fn test_install_failure_is_wrapped() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let broken = Chart::load_files(
            "charts/broken",
            vec![
                BufferedFile::new("Chart.yaml", "apiVersion: v2\nname: broken\nversion: 0.1.0\n"),
                BufferedFile::new(
                    "templates/widget.yaml",
                    "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n",
                ),
            ],
        )
        .unwrap();

        let err = deployer
            .install(&broken, &json!({}), &DeployOptions::new("broken", "tssc"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InstallFailed { ref chart, .. } if chart == "broken"));
        assert!(err.to_string().starts_with("install failed: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify() {
        let fake = FakeKubeClient::new();
        let deployer = deployer(&fake);
        let deployment = deployer
            .install(&chart(), &json!({}), &DeployOptions::new("tssc-dh", "tssc"))
            .await
            .unwrap();

        // The test pod never completes
        let err = deployer
            .verify(&deployment.release, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::VerifyFailed { .. }));

        let pod = crate::client::ObjectRef::new("v1", "Pod", Some("tssc"), "tssc-dh-test");
        let completer = fake.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let mut obj = completer.object(&pod).unwrap();
            obj["status"] = json!({"phase": "Succeeded"});
            completer.insert(obj);
        });
        deployer
            .verify(&deployment.release, Duration::from_secs(30))
            .await
            .unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_install() {
        let fake = FakeKubeClient::new();
        let (handle, cancel) = CancelSignal::new();
        let deployer = Deployer::new(Arc::new(fake), ChartRenderer::default(), cancel);
        handle.cancel();

        let err = deployer
            .install(&chart(), &json!({}), &DeployOptions::new("tssc-dh", "tssc"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Cancelled));
    }
}
