/*!

The cluster command gateway is the only boundary between the harness and the cluster. Every other
component talks to the cluster through a `ClusterGateway`, which allows tests to swap the live
cluster for an in-memory double.

!*/

mod error;
mod kube_gateway;

pub use error::{classify, AllowNotFound, Error, ErrorKind, HttpStatusCode, Result, StatusCode};
pub use kube_gateway::KubeGateway;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::policy::v1beta1::PodSecurityPolicy;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;

/// The imperative cluster operations the harness needs. Mutations return `()` on success, queries
/// return the raw objects. Implementations do not retry; callers decide based on
/// [`Error::kind`].
#[async_trait::async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()>;

    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Apply `deployment` to `namespace`, creating or updating it.
    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()>;

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<()>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_pod_security_policies(&self) -> Result<Vec<PodSecurityPolicy>>;
}
