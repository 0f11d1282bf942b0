//! Which controller deployments the suite waits for
//!
//! The kcm controller-manager is always expected. Each selected CAPI provider
//! adds one target selected by its `cluster.x-k8s.io/provider` label. Most
//! providers run a single controller deployment; the ones that run more are
//! listed in a replica override table handed to [`ExpectationRegistry::new`],
//! so adding a provider never means touching the probe or poll code.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kcm_common::{
    Error, CAPI_PROVIDER_LABEL_KEY, CONTROLLER_MANAGER_SUFFIX, KCM_CONTROLLER_LABEL,
    KCM_CONTROLLER_NAME,
};

/// CAPI providers the management cluster can run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    /// Core Cluster API controller
    ClusterApi,
    /// CAPA
    Aws,
    /// CAPZ, deployed together with the Azure Service Operator
    Azure,
    /// CAPV
    VSphere,
    /// CAPO
    OpenStack,
}

impl ProviderKind {
    /// Every known provider, in the order the suite verifies them
    pub const ALL: [ProviderKind; 5] = [
        Self::ClusterApi,
        Self::Aws,
        Self::Azure,
        Self::VSphere,
        Self::OpenStack,
    ];

    /// Provider name as it appears in the `cluster.x-k8s.io/provider` label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterApi => "cluster-api",
            Self::Aws => "infrastructure-aws",
            Self::Azure => "infrastructure-azure",
            Self::VSphere => "infrastructure-vsphere",
            Self::OpenStack => "infrastructure-openstack",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    /// Accepts the label value (`infrastructure-aws`) or the short name (`aws`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let short = lower.strip_prefix("infrastructure-").unwrap_or(&lower);
        match short {
            "cluster-api" | "capi" => Ok(Self::ClusterApi),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "vsphere" => Ok(Self::VSphere),
            "openstack" => Ok(Self::OpenStack),
            _ => Err(Error::unknown_provider(s)),
        }
    }
}

/// Label selector matching a provider's controller deployments
pub fn label_for(provider: ProviderKind) -> String {
    format!("{}={}", CAPI_PROVIDER_LABEL_KEY, provider.as_str())
}

/// One controller whose deployments must become ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    name: String,
    label_selector: String,
    name_contract: String,
    expected_replicas: u32,
}

impl Target {
    /// Build a target; `expected_replicas` must be at least 1
    pub fn new(
        name: impl Into<String>,
        label_selector: impl Into<String>,
        expected_replicas: u32,
    ) -> Result<Self, Error> {
        let name = name.into();
        if expected_replicas == 0 {
            return Err(Error::config(format!(
                "target {name} must expect at least one deployment"
            )));
        }
        Ok(Self {
            name,
            label_selector: label_selector.into(),
            name_contract: CONTROLLER_MANAGER_SUFFIX.to_string(),
            expected_replicas,
        })
    }

    /// Replace the substring every matched deployment name must contain
    pub fn with_name_contract(mut self, contract: impl Into<String>) -> Self {
        self.name_contract = contract.into();
        self
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label selector passed to the cluster-state query
    pub fn label_selector(&self) -> &str {
        &self.label_selector
    }

    /// Substring every matched deployment name must contain
    pub fn name_contract(&self) -> &str {
        &self.name_contract
    }

    /// Minimum number of matching deployments, each of which must be ready
    pub fn expected_replicas(&self) -> u32 {
        self.expected_replicas
    }
}

/// The kcm controller-manager target
pub fn core_target() -> Target {
    Target {
        name: KCM_CONTROLLER_NAME.to_string(),
        label_selector: KCM_CONTROLLER_LABEL.to_string(),
        name_contract: CONTROLLER_MANAGER_SUFFIX.to_string(),
        expected_replicas: 1,
    }
}

/// Providers that run more than one controller deployment.
///
/// Azure ships CAPZ plus the Azure Service Operator under the same provider
/// label.
pub fn default_replica_overrides() -> BTreeMap<ProviderKind, u32> {
    BTreeMap::from([(ProviderKind::Azure, 2)])
}

/// Maps selected providers to readiness targets
#[derive(Clone, Debug)]
pub struct ExpectationRegistry {
    core: Target,
    replica_overrides: BTreeMap<ProviderKind, u32>,
}

impl Default for ExpectationRegistry {
    fn default() -> Self {
        Self {
            core: core_target(),
            replica_overrides: default_replica_overrides(),
        }
    }
}

impl ExpectationRegistry {
    /// Registry with an explicit core target and override table.
    ///
    /// Providers missing from `replica_overrides` expect one deployment.
    pub fn new(
        core: Target,
        replica_overrides: BTreeMap<ProviderKind, u32>,
    ) -> Result<Self, Error> {
        if let Some((provider, _)) = replica_overrides.iter().find(|(_, n)| **n == 0) {
            return Err(Error::config_for_field(
                "replica override",
                format!("{provider} must expect at least one deployment"),
            ));
        }
        Ok(Self {
            core,
            replica_overrides,
        })
    }

    /// Number of controller deployments `provider` must have ready
    pub fn expected_replicas(&self, provider: ProviderKind) -> u32 {
        self.replica_overrides.get(&provider).copied().unwrap_or(1)
    }

    /// Core target first, then one target per provider in caller order.
    ///
    /// Repeated providers are only listed once.
    pub fn targets_for(&self, providers: &[ProviderKind]) -> Vec<Target> {
        let mut targets = Vec::with_capacity(providers.len() + 1);
        targets.push(self.core.clone());

        let mut seen = Vec::with_capacity(providers.len());
        for &provider in providers {
            if seen.contains(&provider) {
                continue;
            }
            seen.push(provider);
            targets.push(Target {
                name: provider.as_str().to_string(),
                label_selector: label_for(provider),
                name_contract: CONTROLLER_MANAGER_SUFFIX.to_string(),
                expected_replicas: self.expected_replicas(provider),
            });
        }
        targets
    }
}

/// Parse a comma separated provider list, failing on the first unknown name
pub fn parse_providers(list: &str) -> Result<Vec<ProviderKind>, Error> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProviderKind::from_str)
        .collect()
}
