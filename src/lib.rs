//! kcm-e2e - management-cluster bootstrap for the kcm end-to-end suite
//!
//! Deploys kcm and its CAPI providers, waits until every controller is
//! actually ready and every ClusterTemplate is valid, and tears the
//! deployment down afterwards.
//!
//! # Modules
//!
//! - [`config`] - flags and environment shared by every subcommand
//! - [`shell`] - external commands (make targets, support bundle)
//! - [`suite`] - the before-all / after-all lifecycle
//! - [`error`] - error types for the binary
//!
//! The convergence machinery itself lives in the `kcm-readiness` crate.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod shell;
pub mod suite;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use kcm_common::kube_utils;
use kcm_readiness::{KubeClusterState, TokioClock};

pub use error::{Error, Result};

use config::SuiteConfig;
use shell::ProcessRunner;
use suite::Suite;

/// kcm-e2e - deploy, verify and tear down kcm for the e2e suite
#[derive(Parser, Debug)]
#[command(name = "kcm-e2e", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    config: SuiteConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Deploy kcm, then wait for controllers and templates
    ///
    /// Runs `make test-apply` (plus `make stable-templates` with --upgrade),
    /// connects to the management cluster and blocks until every expected
    /// controller deployment is ready and every ClusterTemplate is valid.
    Up,

    /// Wait for controllers and templates without deploying anything
    Verify,

    /// Collect a support bundle and run `make dev-destroy`
    ///
    /// Does nothing when NO_CLEANUP is set.
    Down,
}

impl Cli {
    /// Run the selected subcommand to completion
    pub async fn run(self) -> Result<()> {
        let suite = Suite::new(
            self.config.clone(),
            Arc::new(ProcessRunner::default()),
            Arc::new(TokioClock),
        );

        match self.command {
            Commands::Up => suite.before_all().await,
            Commands::Verify => {
                let client = kube_utils::connect(self.config.kubeconfig.as_deref()).await?;
                suite
                    .verify(Arc::new(KubeClusterState::new(
                        client,
                        &self.config.namespace,
                    )))
                    .await
            }
            Commands::Down => suite.after_all().await,
        }
    }
}
