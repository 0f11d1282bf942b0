//! Read-only view of the management cluster
//!
//! The checks only need two list calls, so they depend on these narrow traits
//! rather than on `kube::Client`. Tests substitute mocks; production uses
//! [`KubeClusterState`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DynamicObject, ListParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use kcm_common::kube_utils::api_resource;
use kcm_common::Error;

/// API version of the kcm ClusterTemplate resource
pub const CLUSTER_TEMPLATE_API_VERSION: &str = "k0rdent.mirantis.com/v1alpha1";
/// Kind of the kcm ClusterTemplate resource
pub const CLUSTER_TEMPLATE_KIND: &str = "ClusterTemplate";
const CLUSTER_TEMPLATE_PLURAL: &str = "clustertemplates";

/// A deployment as seen at query time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentSnapshot {
    /// metadata.name
    pub name: String,
    /// status.readyReplicas, 0 when unset
    pub ready_replicas: u32,
    /// metadata.deletionTimestamp
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl DeploymentSnapshot {
    /// A live deployment with `ready_replicas` ready pods
    pub fn new(name: impl Into<String>, ready_replicas: u32) -> Self {
        Self {
            name: name.into(),
            ready_replicas,
            deletion_timestamp: None,
        }
    }

    /// Mark the deployment as being deleted since `at`
    pub fn terminating_since(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }
}

impl From<&Deployment> for DeploymentSnapshot {
    fn from(deployment: &Deployment) -> Self {
        let ready = deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        Self {
            name: deployment.metadata.name.clone().unwrap_or_default(),
            ready_replicas: u32::try_from(ready).unwrap_or(0),
            deletion_timestamp: deployment.metadata.deletion_timestamp.as_ref().map(|t| t.0),
        }
    }
}

/// Lists controller deployments by label
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStateQuery: Send + Sync {
    /// Deployments matching `label_selector`.
    ///
    /// `limit` is a page-size hint; implementations may return fewer.
    async fn list_deployments(
        &self,
        label_selector: &str,
        limit: u32,
    ) -> Result<Vec<DeploymentSnapshot>, Error>;
}

/// A ClusterTemplate's reported validity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateSnapshot {
    /// metadata.name
    pub name: String,
    /// status.valid, `false` when the controller has not reported yet
    pub valid: bool,
    /// status.validationError
    pub validation_error: Option<String>,
}

impl From<&DynamicObject> for TemplateSnapshot {
    fn from(obj: &DynamicObject) -> Self {
        let status = obj.data.get("status");
        Self {
            name: obj.metadata.name.clone().unwrap_or_default(),
            valid: status
                .and_then(|s| s.get("valid"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            validation_error: status
                .and_then(|s| s.get("validationError"))
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// Lists ClusterTemplates in the system namespace
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TemplateQuery: Send + Sync {
    /// Every ClusterTemplate with its validity status
    async fn list_cluster_templates(&self) -> Result<Vec<TemplateSnapshot>, Error>;
}

/// Cluster state read through the Kubernetes API, scoped to one namespace
#[derive(Clone)]
pub struct KubeClusterState {
    client: Client,
    namespace: String,
}

impl KubeClusterState {
    /// Query `namespace` through `client`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl ClusterStateQuery for KubeClusterState {
    async fn list_deployments(
        &self,
        label_selector: &str,
        limit: u32,
    ) -> Result<Vec<DeploymentSnapshot>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = ListParams::default().labels(label_selector).limit(limit);
        let list = api.list(&params).await?;
        debug!(
            namespace = %self.namespace,
            selector = %label_selector,
            count = list.items.len(),
            "listed controller deployments"
        );
        Ok(list.items.iter().map(DeploymentSnapshot::from).collect())
    }
}

#[async_trait]
impl TemplateQuery for KubeClusterState {
    async fn list_cluster_templates(&self) -> Result<Vec<TemplateSnapshot>, Error> {
        let ar = api_resource(
            CLUSTER_TEMPLATE_API_VERSION,
            CLUSTER_TEMPLATE_KIND,
            CLUSTER_TEMPLATE_PLURAL,
        );
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &self.namespace, &ar);
        let list = api.list(&ListParams::default()).await?;
        debug!(
            namespace = %self.namespace,
            count = list.items.len(),
            "listed cluster templates"
        );
        Ok(list.items.iter().map(TemplateSnapshot::from).collect())
    }
}
