use super::error::{self, Result};
use super::ClusterGateway;
use crate::constants::FIELD_MANAGER;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::policy::v1beta1::PodSecurityPolicy;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use log::trace;
use snafu::ResultExt;
use std::path::Path;

/// A `ClusterGateway` backed by a live cluster through `kube::Client`.
#[derive(Clone)]
pub struct KubeGateway {
    k8s_client: Client,
}

impl KubeGateway {
    pub fn new_from_k8s_client(k8s_client: Client) -> Self {
        Self { k8s_client }
    }

    /// Create a `KubeGateway` using the ambient cluster configuration (in-cluster service
    /// account, `$KUBECONFIG` or `~/.kube/config`).
    pub async fn new() -> Result<Self> {
        let k8s_client = Client::try_default()
            .await
            .context(error::InitializationSnafu)?;
        Ok(Self::new_from_k8s_client(k8s_client))
    }

    /// Create a `KubeGateway` from the path to a kubeconfig file.
    pub async fn new_from_kubeconfig_path(kubeconfig_path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(kubeconfig_path).context(error::KubeconfigSnafu)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(error::KubeconfigSnafu)?;
        let k8s_client = Client::try_from(config).context(error::InitializationSnafu)?;
        Ok(Self::new_from_k8s_client(k8s_client))
    }

    pub fn k8s_client(&self) -> &Client {
        &self.k8s_client
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.k8s_client.clone())
    }

    fn bindings(&self) -> Api<ClusterRoleBinding> {
        Api::all(self.k8s_client.clone())
    }
}

#[async_trait::async_trait]
impl ClusterGateway for KubeGateway {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        trace!("creating namespace '{}'", namespace.name_any());
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await
            .context(error::KubeApiCallSnafu {
                method: "create",
                what: "namespace",
                name: namespace.name_any(),
            })?;
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let namespace = self
            .namespaces()
            .get_opt(name)
            .await
            .context(error::KubeApiCallSnafu {
                method: "get",
                what: "namespace",
                name,
            })?;
        Ok(namespace.is_some())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        trace!("deleting namespace '{}'", name);
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .context(error::KubeApiCallSnafu {
                method: "delete",
                what: "namespace",
                name,
            })?;
        Ok(())
    }

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let name = deployment.name_any();
        trace!("applying deployment '{}' to namespace '{}'", name, namespace);
        Api::<Deployment>::namespaced(self.k8s_client.clone(), namespace)
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(deployment),
            )
            .await
            .context(error::KubeApiCallSnafu {
                method: "apply",
                what: "deployment",
                name: &name,
            })?;
        Ok(())
    }

    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()> {
        trace!("creating cluster role binding '{}'", binding.name_any());
        self.bindings()
            .create(&PostParams::default(), binding)
            .await
            .context(error::KubeApiCallSnafu {
                method: "create",
                what: "cluster role binding",
                name: binding.name_any(),
            })?;
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<()> {
        trace!("deleting cluster role binding '{}'", name);
        self.bindings()
            .delete(name, &DeleteParams::default())
            .await
            .context(error::KubeApiCallSnafu {
                method: "delete",
                what: "cluster role binding",
                name,
            })?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        Ok(Api::<Pod>::namespaced(self.k8s_client.clone(), namespace)
            .list(&ListParams::default())
            .await
            .context(error::KubeApiCallSnafu {
                method: "list",
                what: "pods in namespace",
                name: namespace,
            })?
            .items)
    }

    async fn list_pod_security_policies(&self) -> Result<Vec<PodSecurityPolicy>> {
        Ok(Api::<PodSecurityPolicy>::all(self.k8s_client.clone())
            .list(&ListParams::default())
            .await
            .context(error::KubeApiCallSnafu {
                method: "list",
                what: "pod security policies",
                name: "cluster",
            })?
            .items)
    }
}
