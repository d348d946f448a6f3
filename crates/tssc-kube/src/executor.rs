//! Deployment of a single topology entry
//!
//! For every chart of the plan the executor renders the installer values,
//! runs the pre-deploy hook, installs or upgrades the release, collects the
//! resources worth monitoring, runs the chart tests, runs the post-deploy
//! hook and finally waits for the monitored resources. Dry-run stops after
//! the release is validated.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tssc_core::{Dependency, Spec};
use tssc_engine::{ChartRenderer, Engine, Variables};

use crate::cancel::CancelSignal;
use crate::client::KubeClient;
use crate::deployer::{DeployOptions, Deployer, Deployment};
use crate::error::Result;
use crate::hooks::{self, POST_DEPLOY, PRE_DEPLOY};
use crate::monitor::Monitor;
use crate::openshift;

/// Progress of an entry deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Pending,
    Rendering,
    PreHook,
    Installing,
    Upgrading,
    Collecting,
    Verifying,
    PostHook,
    Watching,
    Done,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Rendering => "rendering",
            Self::PreHook => "pre-hook",
            Self::Installing => "installing",
            Self::Upgrading => "upgrading",
            Self::Collecting => "collecting",
            Self::Verifying => "verifying",
            Self::PostHook => "post-hook",
            Self::Watching => "watching",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successful entry deployment
#[derive(Debug, Clone)]
pub struct Execution {
    pub deployment: Deployment,

    /// Rendered values template, as text
    pub values_text: String,

    /// States visited, in order
    pub states: Vec<ExecutorState>,
}

/// Runs the deployment pipeline of topology entries
pub struct Executor {
    kube: Arc<dyn KubeClient>,
    engine: Engine,
    deployer: Deployer,
    cancel: CancelSignal,
    timeout: Duration,
    dry_run: bool,
}

/// Installer and cluster variables for the values template
pub async fn prepare_variables(kube: &dyn KubeClient, spec: &Spec) -> Result<Variables> {
    let mut variables = Variables::new();
    variables.set_installer(spec)?;
    let info = openshift::cluster_info(kube).await?;
    variables.set_openshift(&info)?;
    Ok(variables)
}

impl Executor {
    pub fn new(kube: Arc<dyn KubeClient>, engine: Engine, cancel: CancelSignal) -> Self {
        let deployer = Deployer::new(kube.clone(), ChartRenderer::new(engine.clone()), cancel.clone());
        Self {
            kube,
            engine,
            deployer,
            cancel,
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

    /// Render the values template and parse it
    pub async fn render_values(&self, spec: &Spec, values_template: &str) -> Result<(String, Value)> {
        let variables = prepare_variables(self.kube.as_ref(), spec).await?;
        Ok(self.engine.render_values(values_template, &variables)?)
    }

    /// Deploy one entry of the plan
    pub async fn execute(
        &self,
        dependency: &Dependency,
        spec: &Spec,
        values_template: &str,
    ) -> Result<Execution> {
        let mut states = vec![ExecutorState::Pending];
        let result = self
            .run(dependency, spec, values_template, &mut states)
            .await;
        match result {
            Ok((deployment, values_text)) => {
                self.transition(dependency, &mut states, ExecutorState::Done);
                Ok(Execution {
                    deployment,
                    values_text,
                    states,
                })
            }
            Err(e) => {
                self.transition(dependency, &mut states, ExecutorState::Failed);
                tracing::error!(chart = dependency.name(), namespace = dependency.namespace(), error = %e, "deployment failed");
                Err(e)
            }
        }
    }

    fn transition(&self, dependency: &Dependency, states: &mut Vec<ExecutorState>, next: ExecutorState) {
        tracing::debug!(
            chart = dependency.name(),
            namespace = dependency.namespace(),
            state = %next,
            "state transition"
        );
        states.push(next);
    }

    async fn run(
        &self,
        dependency: &Dependency,
        spec: &Spec,
        values_template: &str,
        states: &mut Vec<ExecutorState>,
    ) -> Result<(Deployment, String)> {
        let chart = dependency.chart();
        let options = DeployOptions::new(dependency.name(), dependency.namespace())
            .with_timeout(self.timeout)
            .with_dry_run(self.dry_run);

        self.transition(dependency, states, ExecutorState::Rendering);
        let (values_text, values) = self.render_values(spec, values_template).await?;

        if !self.dry_run {
            self.transition(dependency, states, ExecutorState::PreHook);
            self.run_hook(dependency, PRE_DEPLOY, &values).await?;
        }

        let previous = self
            .cancel
            .run(self.deployer.probe(dependency.namespace(), dependency.name()))
            .await?;
        let deployment = match previous {
            None => {
                self.transition(dependency, states, ExecutorState::Installing);
                tracing::info!(chart = dependency.name(), namespace = dependency.namespace(), "installing chart");
                self.deployer.install(chart, &values, &options).await?
            }
            Some(previous) => {
                self.transition(dependency, states, ExecutorState::Upgrading);
                tracing::info!(
                    chart = dependency.name(),
                    namespace = dependency.namespace(),
                    revision = previous.revision,
                    "upgrading chart"
                );
                self.deployer.upgrade(chart, &values, &previous, &options).await?
            }
        };

        if self.dry_run {
            tracing::info!(chart = dependency.name(), "dry-run, skipping hooks, verification and monitoring");
            return Ok((deployment, values_text));
        }

        self.transition(dependency, states, ExecutorState::Collecting);
        let mut monitor = Monitor::new(self.kube.clone());
        for resource in &deployment.resources {
            monitor.collect(Some(resource))?;
        }

        self.transition(dependency, states, ExecutorState::Verifying);
        self.deployer.verify(&deployment.release, self.timeout).await?;

        self.transition(dependency, states, ExecutorState::PostHook);
        self.run_hook(dependency, POST_DEPLOY, &values).await?;

        self.transition(dependency, states, ExecutorState::Watching);
        self.cancel.run(monitor.watch(self.timeout)).await?;

        tracing::info!(chart = dependency.name(), namespace = dependency.namespace(), "chart deployed");
        Ok((deployment, values_text))
    }

    async fn run_hook(&self, dependency: &Dependency, name: &str, values: &Value) -> Result<()> {
        let output = self
            .cancel
            .run(hooks::run_hook(dependency.chart(), name, values))
            .await?;
        if let Some(output) = output {
            print!("{}", output.stdout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use crate::fake::FakeKubeClient;
    use crate::openshift::tests::openshift_objects;
    use serde_json::json;
    use tssc_core::{BufferedFile, Chart, Config};

    const VALUES_TEMPLATE: &str = r#"
namespace: {{ Installer.Namespace }}
domain: {{ OpenShift.Ingress.Domain }}
minor: "{{ OpenShift.MinorVersion }}"
"#;

    fn spec() -> Spec {
        Config::from_bytes(b"tssc:\n  namespace: tssc\n  settings: {}\n  products: []\n")
            .unwrap()
            .installer
    }

    fn dependency() -> Dependency {
        let chart = Chart::load_files(
            "charts/tssc-app-namespaces",
            vec![
                BufferedFile::new(
                    "Chart.yaml",
                    "apiVersion: v2\nname: tssc-app-namespaces\nversion: 0.1.0\n",
                ),
                BufferedFile::new(
                    "templates/namespaces.yaml",
                    "apiVersion: project.openshift.io/v1\nkind: ProjectRequest\nmetadata:\n  name: tssc-app-development\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  domain: {{ values.domain }}\n",
                ),
            ],
        )
        .unwrap();
        Dependency::new(Arc::new(chart), "tssc")
    }

    fn executor(fake: &FakeKubeClient) -> Executor {
        Executor::new(Arc::new(fake.clone()), Engine::offline(), CancelSignal::never())
            .with_timeout(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_install_then_upgrade() {
        let fake = FakeKubeClient::with_objects(openshift_objects());
        let executor = executor(&fake);

        let execution = executor
            .execute(&dependency(), &spec(), VALUES_TEMPLATE)
            .await
            .unwrap();
        assert_eq!(
            execution.states,
            vec![
                ExecutorState::Pending,
                ExecutorState::Rendering,
                ExecutorState::PreHook,
                ExecutorState::Installing,
                ExecutorState::Collecting,
                ExecutorState::Verifying,
                ExecutorState::PostHook,
                ExecutorState::Watching,
                ExecutorState::Done,
            ]
        );
        assert!(execution.values_text.contains("minor: \"4.16\""));

        let settings = crate::client::ObjectRef::new("v1", "ConfigMap", Some("tssc"), "settings");
        assert_eq!(fake.object(&settings).unwrap()["data"]["domain"], "apps.example.com");

        let execution = executor
            .execute(&dependency(), &spec(), VALUES_TEMPLATE)
            .await
            .unwrap();
        assert!(execution.states.contains(&ExecutorState::Upgrading));
        assert_eq!(execution.deployment.release.revision, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_skips_hooks_and_monitoring() {
        let fake = FakeKubeClient::with_objects(openshift_objects());
        let executor = executor(&fake).with_dry_run(true);

        let execution = executor
            .execute(&dependency(), &spec(), VALUES_TEMPLATE)
            .await
            .unwrap();
        assert_eq!(
            execution.states,
            vec![
                ExecutorState::Pending,
                ExecutorState::Rendering,
                ExecutorState::Installing,
                ExecutorState::Done,
            ]
        );
        assert_eq!(fake.references().len(), openshift_objects().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_failed_state() {
        // Without an ingress controller the values can't be rendered
        let fake = FakeKubeClient::new();
        let err = executor(&fake)
            .execute(&dependency(), &spec(), VALUES_TEMPLATE)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::IngressDomainNotFound));
    }

    #[tokio::test]
    async fn test_render_values() {
        let fake = FakeKubeClient::with_objects(openshift_objects());
        let (_, values) = executor(&fake)
            .render_values(&spec(), VALUES_TEMPLATE)
            .await
            .unwrap();
        assert_eq!(values, json!({"namespace": "tssc", "domain": "apps.example.com", "minor": "4.16"}));
    }
}
