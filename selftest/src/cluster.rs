use crate::TestSettings;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use log::info;
use psp_harness::constants::{APP_MANAGED_BY, FIELD_MANAGER};
use psp_harness::{HarnessConfig, KubeGateway, ScenarioDriver};
use snafu::{ResultExt, Snafu};
use std::time::Duration;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to connect to the cluster: {}", source))]
    Connect { source: psp_harness::gateway::Error },

    #[snafu(display("Unable to read harness configuration: {}", source))]
    Config { source: psp_harness::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube { action: String, source: kube::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// A live cluster with pod security policies enabled, reached through the kubeconfig named in
/// `TestSettings` or the ambient kube config.
#[derive(Clone)]
pub struct Cluster {
    gateway: KubeGateway,
}

impl Cluster {
    pub async fn connect() -> Result<Self> {
        let gateway = match TestSettings::kubeconfig() {
            Some(path) => KubeGateway::new_from_kubeconfig_path(path).await,
            None => KubeGateway::new().await,
        }
        .context(ConnectSnafu)?;
        Ok(Self { gateway })
    }

    pub fn gateway(&self) -> &KubeGateway {
        &self.gateway
    }

    /// Build a `ScenarioDriver` from `PSP_HARNESS_*` settings, with the scenario timeout taken
    /// from the selftest settings.
    pub fn driver(&self) -> Result<ScenarioDriver<KubeGateway>> {
        let mut config = HarnessConfig::from_env().context(ConfigSnafu)?;
        config.scenario_timeout_secs = TestSettings::scenario_timeout_secs();
        Ok(ScenarioDriver::new(self.gateway.clone(), config))
    }

    /// Names of the namespaces labelled as managed by the harness.
    pub async fn managed_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.gateway.k8s_client().clone());
        let namespaces = api
            .list(&ListParams {
                label_selector: Some(format!("{}={}", APP_MANAGED_BY, FIELD_MANAGER)),
                ..Default::default()
            })
            .await
            .context(KubeSnafu {
                action: "list harness namespaces",
            })?;
        Ok(namespaces
            .items
            .iter()
            .filter(|ns| {
                ns.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    != Some("Terminating")
            })
            .map(|ns| ns.name_any())
            .collect())
    }

    /// Returns `true` once `namespace` is gone or terminating, `false` if that doesn't happen
    /// within `timeout`.
    pub async fn wait_for_namespace_removal(&self, namespace: &str, timeout: Duration) -> bool {
        let api: Api<Namespace> = Api::all(self.gateway.k8s_client().clone());
        let result = tokio::time::timeout(timeout, async {
            loop {
                match api.get_opt(namespace).await {
                    Ok(None) => return,
                    Ok(Some(ns))
                        if ns.status.as_ref().and_then(|s| s.phase.as_deref())
                            == Some("Terminating") =>
                    {
                        return
                    }
                    _ => tokio::time::sleep(Duration::from_secs(1)).await,
                }
            }
        })
        .await;
        info!("namespace '{}' removed: {}", namespace, result.is_ok());
        result.is_ok()
    }
}
