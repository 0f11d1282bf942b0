//! Shared types for the kcm e2e suite: errors, well-known names, time and kube helpers

#![deny(missing_docs)]

pub mod backoff;
pub mod clock;
pub mod error;
pub mod kube_utils;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the kcm controller and CAPI providers are installed into
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kcm-system";

/// Label selector matching the kcm controller-manager deployment
pub const KCM_CONTROLLER_LABEL: &str = "app.kubernetes.io/name=kcm";

/// Deployment name of the kcm controller-manager
pub const KCM_CONTROLLER_NAME: &str = "kcm-controller-manager";

/// Label key CAPI providers put on their controller deployments
pub const CAPI_PROVIDER_LABEL_KEY: &str = "cluster.x-k8s.io/provider";

/// Substring every controller deployment name must contain
pub const CONTROLLER_MANAGER_SUFFIX: &str = "controller-manager";

/// Environment variable that disables teardown after the suite
pub const ENV_NO_CLEANUP: &str = "NO_CLEANUP";

/// Environment variable holding the system namespace for child tooling
pub const ENV_NAMESPACE: &str = "NAMESPACE";
