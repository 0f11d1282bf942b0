//! Suite configuration from flags and environment.
//!
//! Every flag has an environment fallback so CI can drive the suite without
//! touching its command line. `NO_CLEANUP` and `NAMESPACE` keep the names the
//! Makefile targets already use.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args};

use kcm_common::{Error, DEFAULT_SYSTEM_NAMESPACE, ENV_NAMESPACE, ENV_NO_CLEANUP};
use kcm_readiness::expectation::{core_target, default_replica_overrides};
use kcm_readiness::{ExpectationRegistry, PollConfig, ProviderKind};

/// Providers verified when none are given
pub const DEFAULT_PROVIDERS: &str =
    "cluster-api,infrastructure-aws,infrastructure-azure,infrastructure-vsphere";

/// Shared settings for every subcommand
#[derive(Args, Debug, Clone)]
pub struct SuiteConfig {
    /// Kubeconfig for the management cluster (defaults to the usual kube lookup)
    #[arg(long, env = "KCM_E2E_KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace kcm and the providers are installed into
    #[arg(long, env = ENV_NAMESPACE, default_value = DEFAULT_SYSTEM_NAMESPACE, global = true)]
    pub namespace: String,

    /// Providers whose controllers must become ready
    #[arg(
        long,
        env = "KCM_E2E_PROVIDERS",
        value_delimiter = ',',
        default_value = DEFAULT_PROVIDERS,
        global = true
    )]
    pub providers: Vec<ProviderKind>,

    /// Extra controller count for a provider, as `provider=count` (repeatable)
    #[arg(long = "replica-override", value_parser = parse_replica_override, global = true)]
    pub replica_overrides: Vec<(ProviderKind, u32)>,

    /// Overall budget for each convergence wait, in seconds
    #[arg(long, env = "KCM_E2E_TIMEOUT_SECS", default_value_t = 900, global = true)]
    pub timeout_secs: u64,

    /// Time between convergence checks, in seconds
    #[arg(long, env = "KCM_E2E_POLL_INTERVAL_SECS", default_value_t = 10, global = true)]
    pub poll_interval_secs: u64,

    /// Leave the deployment in place after the suite (any non-empty
    /// NO_CLEANUP value counts, including "false")
    #[arg(
        long,
        env = ENV_NO_CLEANUP,
        action = ArgAction::SetTrue,
        value_parser = env_is_set,
        global = true
    )]
    pub no_cleanup: bool,

    /// Install the stable templates for upgrade testing after deploying
    #[arg(
        long,
        env = "KCM_E2E_UPGRADE",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new(),
        global = true
    )]
    pub upgrade: bool,

    /// make binary used for deploy and teardown targets
    #[arg(long, env = "KCM_E2E_MAKE", default_value = "make", global = true)]
    pub make: String,

    /// Support-bundle collector binary
    #[arg(long, env = "KCM_E2E_SUPPORT_BUNDLE", default_value = "support-bundle", global = true)]
    pub support_bundle: String,
}

fn env_is_set(value: &str) -> Result<bool, String> {
    Ok(!value.is_empty())
}

fn parse_replica_override(s: &str) -> Result<(ProviderKind, u32), String> {
    let (provider, count) = s
        .split_once('=')
        .ok_or_else(|| format!("expected provider=count, got '{s}'"))?;
    let provider: ProviderKind = provider.parse().map_err(|e: Error| e.to_string())?;
    let count: u32 = count
        .trim()
        .parse()
        .map_err(|e| format!("invalid count '{count}': {e}"))?;
    if count == 0 {
        return Err(format!("{provider} must expect at least one controller"));
    }
    Ok((provider, count))
}

impl SuiteConfig {
    /// Poll timing for both convergence waits
    pub fn poll_config(&self) -> Result<PollConfig, Error> {
        PollConfig::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.poll_interval_secs),
        )
    }

    /// Registry with the default override table, updated by `--replica-override`
    pub fn registry(&self) -> Result<ExpectationRegistry, Error> {
        let mut overrides: BTreeMap<ProviderKind, u32> = default_replica_overrides();
        overrides.extend(self.replica_overrides.iter().copied());
        ExpectationRegistry::new(core_target(), overrides)
    }

    /// Whether teardown should run
    pub fn cleanup(&self) -> bool {
        !self.no_cleanup
    }
}
