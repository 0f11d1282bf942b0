//! Convergence verification for the kcm management cluster
//!
//! After the controllers are deployed, the e2e suite must know when every one
//! of them is actually serving, without being fooled by a rollout that is
//! half-done or a deployment that is being deleted. This crate provides:
//!
//! - [`expectation`] - which deployments to expect per provider, and how many
//! - [`probe`] - the readiness predicate applied to one target's deployments
//! - [`templates`] - the ClusterTemplate validity check
//! - [`poll`] - a deadline-bounded poll loop over any [`poll::ConvergenceCheck`]
//! - [`clock`] - time source injected into the poll loop (shared with `kcm-common`)
//! - [`query`] - the narrow read interface onto cluster state, plus its kube impl

#![deny(missing_docs)]

pub mod expectation;
pub mod poll;
pub mod probe;
pub mod query;
pub mod templates;

pub use kcm_common::clock;
pub use kcm_common::clock::{Clock, ManualClock, TokioClock};
pub use expectation::{label_for, ExpectationRegistry, ProviderKind, Target};
pub use poll::{await_convergence, ConvergenceCheck, Diagnostic, PollConfig, PollError, PollReport, Tick};
pub use probe::{probe, ControllerReadiness, ReadinessError};
pub use query::{ClusterStateQuery, DeploymentSnapshot, KubeClusterState, TemplateQuery, TemplateSnapshot};
pub use templates::{TemplateError, TemplateValidity};
