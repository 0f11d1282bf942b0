//! Error types for the suite binary

use kcm_readiness::{PollError, ReadinessError, TemplateError};

/// Suite Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Why a suite phase failed
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Setup, config or command failure before or after verification
    #[error(transparent)]
    Common(#[from] kcm_common::Error),

    /// Controllers did not converge within the budget
    #[error("controller validation failed: {0}")]
    Controllers(#[from] PollError<ReadinessError>),

    /// ClusterTemplates did not become valid within the budget
    #[error("cluster template validation failed: {0}")]
    Templates(#[from] PollError<TemplateError>),
}
