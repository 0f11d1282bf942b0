//! Suite lifecycle: deploy, wait for convergence, tear down
//!
//! `before_all` is what every e2e spec depends on: the controllers are
//! deployed, every controller deployment is ready, and every ClusterTemplate
//! is valid. `after_all` collects diagnostics and removes the deployment
//! unless cleanup is disabled.

use std::sync::Arc;

use tracing::{info, warn};

use kcm_common::{kube_utils, ENV_NAMESPACE};
use kcm_readiness::{
    await_convergence, Clock, ClusterStateQuery, ControllerReadiness, KubeClusterState,
    TemplateQuery, TemplateValidity,
};

use crate::config::SuiteConfig;
use crate::shell::{CommandRunner, Invocation};
use crate::Result;

/// Installs kcm and the providers
pub const TARGET_APPLY: &str = "test-apply";
/// Installs the previous release's templates for upgrade runs
pub const TARGET_STABLE_TEMPLATES: &str = "stable-templates";
/// Removes everything `test-apply` installed
pub const TARGET_DESTROY: &str = "dev-destroy";

/// One e2e suite run against a management cluster
pub struct Suite {
    config: SuiteConfig,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl Suite {
    /// Suite using `runner` for external commands and `clock` for polling
    pub fn new(config: SuiteConfig, runner: Arc<dyn CommandRunner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            runner,
            clock,
        }
    }

    fn make(&self, target: &str) -> Invocation {
        Invocation::new(&self.config.make)
            .arg(target)
            .env(ENV_NAMESPACE, &self.config.namespace)
    }

    /// Deploy the controllers, plus stable templates on upgrade runs
    pub async fn deploy(&self) -> Result<()> {
        info!(namespace = %self.config.namespace, "deploying kcm");
        self.runner.run(&self.make(TARGET_APPLY)).await?;

        if self.config.upgrade {
            info!("installing stable templates for further upgrade testing");
            self.runner.run(&self.make(TARGET_STABLE_TEMPLATES)).await?;
        }
        Ok(())
    }

    /// Wait until every controller is ready, then until every template is valid
    pub async fn verify<S>(&self, state: Arc<S>) -> Result<()>
    where
        S: ClusterStateQuery + TemplateQuery + 'static,
    {
        let poll = self.config.poll_config()?;
        let targets = self.config.registry()?.targets_for(&self.config.providers);

        info!(
            targets = targets.len(),
            timeout_secs = poll.timeout.as_secs(),
            "validating that the kcm controller and CAPI provider controllers are running and ready"
        );
        let controllers = ControllerReadiness::new(targets, state.clone());
        let report = await_convergence(&controllers, self.clock.as_ref(), &poll).await?;
        info!(attempts = report.attempts, "controllers ready");

        let templates = TemplateValidity::new(state);
        let report = await_convergence(&templates, self.clock.as_ref(), &poll).await?;
        info!(attempts = report.attempts, "cluster templates valid");
        Ok(())
    }

    /// Everything that must hold before any spec runs
    pub async fn before_all(&self) -> Result<()> {
        self.deploy().await?;
        let client = kube_utils::connect(self.config.kubeconfig.as_deref()).await?;
        self.verify(Arc::new(KubeClusterState::new(
            client,
            &self.config.namespace,
        )))
        .await
    }

    /// Collect a support bundle and tear the deployment down
    pub async fn after_all(&self) -> Result<()> {
        if !self.config.cleanup() {
            info!("cleanup disabled, leaving deployment in place");
            return Ok(());
        }

        info!("collecting the support bundle from the management cluster");
        if let Err(e) = self.runner.run(&self.support_bundle()).await {
            warn!(error = %e, "support bundle collection failed, continuing with teardown");
        }

        info!("removing the controller-manager");
        self.runner.run(&self.make(TARGET_DESTROY)).await?;
        Ok(())
    }

    fn support_bundle(&self) -> Invocation {
        let mut inv = Invocation::new(&self.config.support_bundle)
            .arg("--interactive=false")
            .arg("--load-cluster-specs");
        if let Some(path) = &self.config.kubeconfig {
            inv = inv.arg("--kubeconfig").arg(path.display().to_string());
        }
        inv
    }
}
