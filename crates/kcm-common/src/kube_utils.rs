//! Kubernetes client helpers shared by the suite and the readiness checks

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, info};

use crate::backoff::{with_backoff, Backoff};
use crate::clock::{Clock, TokioClock};
use crate::Error;

/// Connection timeout for the management-cluster client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for the management-cluster client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client from an explicit kubeconfig, or infer one from the
/// environment (`KUBECONFIG`, `~/.kube/config`, in-cluster) when `None`.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    debug!(cluster_url = %config.cluster_url, "building kube client");

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Build a client and wait until the API server answers.
///
/// Kubeconfig problems fail immediately; an unreachable server is retried on
/// the [`Backoff::CONNECT`] schedule, since the management cluster may still
/// be starting when the suite begins.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let client = create_client(kubeconfig).await?;
    wait_for_api_server(client, &Backoff::CONNECT, &TokioClock).await
}

/// Return `client` once `/version` answers, retrying transient failures
pub async fn wait_for_api_server<K>(
    client: Client,
    backoff: &Backoff,
    clock: &K,
) -> Result<Client, Error>
where
    K: Clock + ?Sized,
{
    let api = &client;
    let version = with_backoff(
        backoff,
        clock,
        "connect_management_cluster",
        is_transient,
        move || async move { api.apiserver_version().await.map_err(Error::from) },
    )
    .await?;
    info!(version = %version.git_version, "management cluster reachable");
    Ok(client)
}

/// Whether retrying could help: transport failures, throttling and server
/// errors are transient; other API rejections and local errors are not.
pub fn is_transient(err: &Error) -> bool {
    match err {
        Error::Kube {
            source: kube::Error::Api(response),
        } => response.code == 429 || response.code >= 500,
        Error::Kube { .. } => true,
        _ => false,
    }
}

/// Describe a custom resource for use with `Api<DynamicObject>` without a
/// discovery round trip.
///
/// `api_version` is `group/version`; core resources (`v1`) have no group.
pub fn api_resource(api_version: &str, kind: &str, plural: &str) -> ApiResource {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: plural.to_string(),
    }
}
