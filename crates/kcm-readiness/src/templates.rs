//! ClusterTemplate validity check
//!
//! kcm validates each ClusterTemplate once its provider controllers are up
//! and records the result in `status.valid`. The suite cannot create clusters
//! until every template in the system namespace reports valid.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::poll::{ConvergenceCheck, Diagnostic, Tick};
use crate::query::TemplateQuery;

const SUBJECT_ALL: &str = "cluster-templates";

/// Why templates are not usable yet
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Listing templates failed
    #[error("failed to list cluster templates: {source}")]
    Query {
        /// Underlying API failure
        #[source]
        source: kcm_common::Error,
    },

    /// No ClusterTemplate objects exist yet
    #[error("no cluster templates found")]
    NoTemplates,

    /// A template has not been validated, or failed validation
    #[error("cluster template {template} is not valid: {reason}")]
    Invalid {
        /// Template name
        template: String,
        /// status.validationError, or a placeholder when none is reported
        reason: String,
    },
}

impl Diagnostic for TemplateError {
    fn subject(&self) -> &str {
        match self {
            Self::Invalid { template, .. } => template,
            Self::Query { .. } | Self::NoTemplates => SUBJECT_ALL,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "QueryError",
            Self::NoTemplates => "NoTemplates",
            Self::Invalid { .. } => "Invalid",
        }
    }
}

/// Every ClusterTemplate reports `status.valid: true`
pub struct TemplateValidity {
    query: Arc<dyn TemplateQuery>,
}

impl TemplateValidity {
    /// Check templates through `query`
    pub fn new(query: Arc<dyn TemplateQuery>) -> Self {
        Self { query }
    }
}

#[async_trait]
impl ConvergenceCheck for TemplateValidity {
    type Reason = TemplateError;

    fn description(&self) -> String {
        SUBJECT_ALL.to_string()
    }

    async fn tick(&self) -> Tick<TemplateError> {
        let templates = match self.query.list_cluster_templates().await {
            Ok(t) => t,
            Err(source) => return Tick::Pending(TemplateError::Query { source }),
        };
        if templates.is_empty() {
            return Tick::Pending(TemplateError::NoTemplates);
        }
        match templates.into_iter().find(|t| !t.valid) {
            Some(t) => Tick::Pending(TemplateError::Invalid {
                template: t.name,
                reason: t
                    .validation_error
                    .unwrap_or_else(|| "validation pending".to_string()),
            }),
            None => Tick::Ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{MockTemplateQuery, TemplateSnapshot};
    use kcm_common::Error;

    fn snapshot(name: &str, valid: bool, error: Option<&str>) -> TemplateSnapshot {
        TemplateSnapshot {
            name: name.to_string(),
            valid,
            validation_error: error.map(str::to_string),
        }
    }

    fn check(templates: Vec<TemplateSnapshot>) -> TemplateValidity {
        let mut mock = MockTemplateQuery::new();
        mock.expect_list_cluster_templates()
            .returning(move || Ok(templates.clone()));
        TemplateValidity::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn all_valid_is_ready() {
        let c = check(vec![
            snapshot("aws-standalone-cp-0-1-0", true, None),
            snapshot("azure-standalone-cp-0-1-0", true, None),
        ]);
        assert!(matches!(c.tick().await, Tick::Ready));
    }

    #[tokio::test]
    async fn empty_list_is_pending() {
        match check(vec![]).tick().await {
            Tick::Pending(e) => {
                assert_eq!(e.kind(), "NoTemplates");
                assert_eq!(e.subject(), "cluster-templates");
            }
            other => panic!("expected Pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_template_reports_validation_error() {
        let c = check(vec![
            snapshot("aws-standalone-cp-0-1-0", true, None),
            snapshot("vsphere-hosted-cp-0-1-0", false, Some("chart not ready")),
        ]);
        match c.tick().await {
            Tick::Pending(e) => {
                assert_eq!(e.subject(), "vsphere-hosted-cp-0-1-0");
                assert_eq!(
                    e.to_string(),
                    "cluster template vsphere-hosted-cp-0-1-0 is not valid: chart not ready"
                );
            }
            other => panic!("expected Pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unvalidated_template_is_pending() {
        let c = check(vec![snapshot("azure-hosted-cp-0-1-0", false, None)]);
        match c.tick().await {
            Tick::Pending(TemplateError::Invalid { reason, .. }) => {
                assert_eq!(reason, "validation pending");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_error_is_retryable() {
        let mut mock = MockTemplateQuery::new();
        mock.expect_list_cluster_templates()
            .returning(|| Err(Error::internal_with_context("list", "the server could not find the requested resource")));
        let c = TemplateValidity::new(Arc::new(mock));
        assert!(matches!(
            c.tick().await,
            Tick::Pending(TemplateError::Query { .. })
        ));
    }
}
