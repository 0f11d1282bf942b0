//! Controller readiness predicate
//!
//! A target is ready when the label selector finds at least the expected
//! number of deployments and every one of them is live (no deletion
//! timestamp), is a controller-manager, and has a ready pod. Every failure is
//! "not yet": the suite only gives up when the poll budget runs out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::expectation::Target;
use crate::poll::{ConvergenceCheck, Diagnostic, Tick};
use crate::query::ClusterStateQuery;

/// Why a target is not ready
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// Listing deployments failed
    #[error("failed to list {target} controller deployments: {source}")]
    Query {
        /// Target name
        target: String,
        /// Underlying API failure
        #[source]
        source: kcm_common::Error,
    },

    /// Fewer matching deployments than the target expects
    #[error("expected at least {expected} {target} controller deployments, got {found}")]
    InsufficientReplicas {
        /// Target name
        target: String,
        /// Deployments required
        expected: u32,
        /// Deployments returned
        found: usize,
    },

    /// A matching deployment is being deleted
    #[error("{target} controller deployment {deployment} is terminating (deletion timestamp {since})")]
    Terminating {
        /// Target name
        target: String,
        /// Deployment name
        deployment: String,
        /// metadata.deletionTimestamp
        since: DateTime<Utc>,
    },

    /// The selector matched a deployment that is not a controller-manager
    #[error("{target} controller deployment name {deployment} does not contain '{expected}'")]
    NameMismatch {
        /// Target name
        target: String,
        /// Deployment name
        deployment: String,
        /// Required substring
        expected: String,
    },

    /// A matching deployment has no ready replicas
    #[error("{target} controller deployment {deployment} does not yet have any ready replicas")]
    NotReady {
        /// Target name
        target: String,
        /// Deployment name
        deployment: String,
    },
}

impl Diagnostic for ReadinessError {
    fn subject(&self) -> &str {
        match self {
            Self::Query { target, .. }
            | Self::InsufficientReplicas { target, .. }
            | Self::Terminating { target, .. }
            | Self::NameMismatch { target, .. }
            | Self::NotReady { target, .. } => target,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "QueryError",
            Self::InsufficientReplicas { .. } => "InsufficientReplicas",
            Self::Terminating { .. } => "Terminating",
            Self::NameMismatch { .. } => "NameMismatch",
            Self::NotReady { .. } => "NotReady",
        }
    }
}

/// Check one target against the current cluster state
pub async fn probe<Q>(target: &Target, query: &Q) -> Result<(), ReadinessError>
where
    Q: ClusterStateQuery + ?Sized,
{
    let deployments = query
        .list_deployments(target.label_selector(), target.expected_replicas())
        .await
        .map_err(|source| ReadinessError::Query {
            target: target.name().to_string(),
            source,
        })?;

    if deployments.len() < target.expected_replicas() as usize {
        return Err(ReadinessError::InsufficientReplicas {
            target: target.name().to_string(),
            expected: target.expected_replicas(),
            found: deployments.len(),
        });
    }

    for deployment in &deployments {
        if let Some(since) = deployment.deletion_timestamp {
            return Err(ReadinessError::Terminating {
                target: target.name().to_string(),
                deployment: deployment.name.clone(),
                since,
            });
        }
        if !deployment.name.contains(target.name_contract()) {
            return Err(ReadinessError::NameMismatch {
                target: target.name().to_string(),
                deployment: deployment.name.clone(),
                expected: target.name_contract().to_string(),
            });
        }
        if deployment.ready_replicas < 1 {
            return Err(ReadinessError::NotReady {
                target: target.name().to_string(),
                deployment: deployment.name.clone(),
            });
        }
    }

    debug!(target_name = %target.name(), deployments = deployments.len(), "controller ready");
    Ok(())
}

/// Every controller target ready in a single pass
pub struct ControllerReadiness {
    targets: Vec<Target>,
    query: Arc<dyn ClusterStateQuery>,
}

impl ControllerReadiness {
    /// Check `targets`, in order, against `query`
    pub fn new(targets: Vec<Target>, query: Arc<dyn ClusterStateQuery>) -> Self {
        Self { targets, query }
    }

    /// Targets in probe order
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }
}

#[async_trait]
impl ConvergenceCheck for ControllerReadiness {
    type Reason = ReadinessError;

    fn description(&self) -> String {
        let names: Vec<_> = self.targets.iter().map(Target::name).collect();
        format!("controllers [{}]", names.join(", "))
    }

    async fn tick(&self) -> Tick<ReadinessError> {
        for target in &self.targets {
            if let Err(e) = probe(target, self.query.as_ref()).await {
                return Tick::Pending(e);
            }
        }
        Tick::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::{ExpectationRegistry, ProviderKind};
    use crate::query::{DeploymentSnapshot, MockClusterStateQuery};
    use kcm_common::Error;
    use mockall::predicate::eq;

    fn target(name: &str, replicas: u32) -> Target {
        Target::new(name, format!("app={name}"), replicas).unwrap()
    }

    fn returning(snapshots: Vec<DeploymentSnapshot>) -> MockClusterStateQuery {
        let mut mock = MockClusterStateQuery::new();
        mock.expect_list_deployments()
            .returning(move |_, _| Ok(snapshots.clone()));
        mock
    }

    #[tokio::test]
    async fn ready_deployment_passes() {
        let query = returning(vec![DeploymentSnapshot::new("capa-controller-manager", 1)]);
        probe(&target("infrastructure-aws", 1), &query).await.unwrap();
    }

    #[tokio::test]
    async fn query_uses_selector_and_replica_limit() {
        let mut query = MockClusterStateQuery::new();
        query
            .expect_list_deployments()
            .with(eq("app=infrastructure-azure"), eq(2))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    DeploymentSnapshot::new("capz-controller-manager", 1),
                    DeploymentSnapshot::new("azureserviceoperator-controller-manager", 1),
                ])
            });
        probe(&target("infrastructure-azure", 2), &query).await.unwrap();
    }

    #[tokio::test]
    async fn query_failure_is_reported_with_target() {
        let mut query = MockClusterStateQuery::new();
        query.expect_list_deployments().returning(|_, _| {
            Err(Error::internal_with_context("list", "connection refused"))
        });

        let err = probe(&target("cluster-api", 1), &query).await.unwrap_err();
        assert!(matches!(err, ReadinessError::Query { .. }));
        assert_eq!(err.subject(), "cluster-api");
        assert_eq!(err.kind(), "QueryError");
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn too_few_deployments_fails() {
        let query = returning(vec![DeploymentSnapshot::new("capz-controller-manager", 1)]);
        let err = probe(&target("infrastructure-azure", 2), &query)
            .await
            .unwrap_err();
        match err {
            ReadinessError::InsufficientReplicas {
                expected, found, ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected InsufficientReplicas, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_deployments_fails() {
        let query = returning(vec![]);
        let err = probe(&target("kcm-controller-manager", 1), &query)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientReplicas");
    }

    /// Story: a rollout restart is in flight; the old deployment still reports
    /// a ready replica but carries a deletion timestamp. It must not count.
    #[tokio::test]
    async fn story_terminating_deployment_never_counts_as_ready() {
        let query = returning(vec![
            DeploymentSnapshot::new("capv-controller-manager", 3).terminating_since(Utc::now()),
        ]);
        let err = probe(&target("infrastructure-vsphere", 1), &query)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::Terminating { ref deployment, .. } if deployment == "capv-controller-manager"));
    }

    /// Story: another chart reused the provider label on an unrelated
    /// deployment. The name contract catches it even though it is ready.
    #[tokio::test]
    async fn story_label_collision_caught_by_name_contract() {
        let query = returning(vec![DeploymentSnapshot::new("capa-webhook", 1)]);
        let err = probe(&target("infrastructure-aws", 1), &query)
            .await
            .unwrap_err();
        match err {
            ReadinessError::NameMismatch {
                deployment,
                expected,
                ..
            } => {
                assert_eq!(deployment, "capa-webhook");
                assert_eq!(expected, "controller-manager");
            }
            other => panic!("expected NameMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_deployment_must_be_ready() {
        let query = returning(vec![
            DeploymentSnapshot::new("capz-controller-manager", 1),
            DeploymentSnapshot::new("azureserviceoperator-controller-manager", 0),
        ]);
        let err = probe(&target("infrastructure-azure", 2), &query)
            .await
            .unwrap_err();
        match err {
            ReadinessError::NotReady { target, deployment } => {
                assert_eq!(target, "infrastructure-azure");
                assert_eq!(deployment, "azureserviceoperator-controller-manager");
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deletion_checked_before_name_and_readiness() {
        let query = returning(vec![
            DeploymentSnapshot::new("unrelated", 0).terminating_since(Utc::now())
        ]);
        let err = probe(&target("cluster-api", 1), &query).await.unwrap_err();
        assert_eq!(err.kind(), "Terminating");
    }

    #[tokio::test]
    async fn tick_stops_at_first_failing_target() {
        let mut query = MockClusterStateQuery::new();
        query
            .expect_list_deployments()
            .with(eq("app.kubernetes.io/name=kcm"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![DeploymentSnapshot::new("kcm-controller-manager", 1)]));
        query
            .expect_list_deployments()
            .with(eq("cluster.x-k8s.io/provider=cluster-api"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        // No expectation for aws: probing it would panic the mock.

        let targets = ExpectationRegistry::default()
            .targets_for(&[ProviderKind::ClusterApi, ProviderKind::Aws]);
        let check = ControllerReadiness::new(targets, Arc::new(query));

        match check.tick().await {
            Tick::Pending(e) => {
                assert_eq!(e.subject(), "cluster-api");
                assert_eq!(e.kind(), "InsufficientReplicas");
            }
            other => panic!("expected Pending, got {other:?}"),
        }
    }

    #[test]
    fn description_lists_targets() {
        let targets = ExpectationRegistry::default().targets_for(&[ProviderKind::Aws]);
        let check = ControllerReadiness::new(targets, Arc::new(MockClusterStateQuery::new()));
        assert_eq!(
            check.description(),
            "controllers [kcm-controller-manager, infrastructure-aws]"
        );
        assert_eq!(check.targets().len(), 2);
    }
}
