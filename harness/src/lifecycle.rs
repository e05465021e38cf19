/*!

Creation and teardown of the per-scenario namespace and its privileged role binding.

Creation is fatal on failure, deletion is best-effort and idempotent. Whatever a scenario creates is
recorded in a `CreatedResources` ledger so that teardown can run even when the scenario body never
finished.

!*/

use crate::constants::{
    APP_MANAGED_BY, FIELD_MANAGER, MAX_NAMESPACE_LEN, RBAC_API_GROUP,
    SERVICE_ACCOUNTS_GROUP_PREFIX,
};
use crate::error::{self, Result};
use crate::gateway::{AllowNotFound, ClusterGateway, ErrorKind};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;
use log::{info, trace, warn};
use maplit::btreemap;
use snafu::{ensure, ResultExt};
use std::time::Duration;

/// Retry attempts for transient failures while creating an object.
const MAX_RETRIES: usize = 3;
/// Delay between creation retries.
const BACKOFF: Duration = Duration::from_millis(500);
/// How many times we check that a new namespace is readable, and how long we wait in between.
const SETTLE_CHECKS: usize = 20;
const SETTLE_DELAY: Duration = Duration::from_millis(50);
/// How many generated names we try before giving up on finding an unused one.
pub const MAX_NAME_ATTEMPTS: usize = 5;

/// The length of `-YYYYmmddHHMMSS-xxxxxxxx`, which follows the prefix in every generated name.
const NAME_SUFFIX_LEN: usize = 24;

/// Generate a namespace name from `prefix`, the current UTC time and a random suffix, e.g.
/// `integrationtest-psp-20240102150405-1a2b3c4d`. The timestamp keeps names readable, the suffix
/// keeps concurrent runs apart. A prefix too long to fit is shortened; the timestamp and suffix
/// are always kept whole.
pub fn generate_namespace_name(prefix: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let prefix = truncate_on_char_boundary(prefix, MAX_NAMESPACE_LEN - NAME_SUFFIX_LEN);
    format!(
        "{}-{}-{}",
        prefix.trim_end_matches('-'),
        timestamp,
        suffix.get(..8).unwrap_or(&suffix)
    )
}

fn truncate_on_char_boundary(s: &str, max_len: usize) -> &str {
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max_len)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// `true` if `prefix` can start a DNS-1123 label: lowercase alphanumerics and '-', beginning with
/// an alphanumeric.
pub fn is_valid_namespace_prefix(prefix: &str) -> bool {
    prefix
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .unwrap_or(false)
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Generate namespace names until one is found that does not already exist in the cluster.
pub async fn unique_namespace_name<G>(gateway: &G, prefix: &str) -> Result<String>
where
    G: ClusterGateway + ?Sized,
{
    ensure!(
        is_valid_namespace_prefix(prefix),
        error::InvalidNamespacePrefixSnafu { prefix }
    );
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = generate_namespace_name(prefix);
        let exists = gateway
            .namespace_exists(&name)
            .await
            .context(error::SetupSnafu {
                action: format!("check whether namespace '{}' is in use", name),
            })?;
        if !exists {
            return Ok(name);
        }
        trace!("namespace '{}' is already in use, generating another", name);
    }
    error::NameExhaustedSnafu {
        prefix,
        attempts: MAX_NAME_ATTEMPTS,
    }
    .fail()
}

/// Defines the namespace object for `name`.
pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(btreemap! {
                APP_MANAGED_BY.to_string() => FIELD_MANAGER.to_string()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Defines the binding that lets every service account in `namespace` use the policy granted by
/// `cluster_role`. The binding is named after the namespace so teardown can find it.
pub fn privileged_binding(namespace: &str, cluster_role: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(btreemap! {
                APP_MANAGED_BY.to_string() => FIELD_MANAGER.to_string()
            }),
            ..Default::default()
        },
        role_ref: RoleRef {
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
            api_group: RBAC_API_GROUP.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "Group".to_string(),
            name: format!("{}{}", SERVICE_ACCOUNTS_GROUP_PREFIX, namespace),
            api_group: Some(RBAC_API_GROUP.to_string()),
            ..Default::default()
        }]),
    }
}

/// Create the namespace `name`. An already existing namespace counts as success. Transient
/// failures are retried a few times, anything else is fatal.
pub async fn create_namespace<G>(gateway: &G, name: &str) -> Result<()>
where
    G: ClusterGateway + ?Sized,
{
    let ns = namespace(name);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match gateway.create_namespace(&ns).await {
            Ok(()) => break,
            Err(e) if e.kind() == ErrorKind::Conflict => {
                trace!("namespace '{}' already exists", name);
                break;
            }
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                warn!("transient failure creating namespace '{}': {}", name, e);
                tokio::time::sleep(BACKOFF).await;
            }
            Err(e) => {
                return Err(e).context(error::SetupSnafu {
                    action: format!("create namespace '{}'", name),
                })
            }
        }
    }

    // Give the object enough time to settle.
    let mut settle_count = 0;
    while !gateway.namespace_exists(name).await.unwrap_or(false) && settle_count < SETTLE_CHECKS {
        tokio::time::sleep(SETTLE_DELAY).await;
        settle_count += 1;
    }
    let exists = gateway
        .namespace_exists(name)
        .await
        .context(error::SetupSnafu {
            action: format!("confirm namespace '{}' exists", name),
        })?;
    ensure!(exists, error::NamespaceNotReadableSnafu { name });
    info!("created namespace '{}'", name);
    Ok(())
}

/// Delete the namespace `name`. A namespace that is already gone, or already terminating, counts
/// as success.
pub async fn delete_namespace<G>(gateway: &G, name: &str) -> crate::gateway::Result<()>
where
    G: ClusterGateway + ?Sized,
{
    match gateway
        .delete_namespace(name)
        .await
        .allow_not_found(|_| trace!("namespace '{}' was already deleted", name))
    {
        Err(e) if e.kind() == ErrorKind::Conflict => {
            trace!("namespace '{}' is already terminating", name);
            Ok(())
        }
        result => result.map(|_| ()),
    }
}

/// Bind the default service accounts of `namespace` to `cluster_role`.
pub async fn bind_privileged<G>(gateway: &G, namespace: &str, cluster_role: &str) -> Result<()>
where
    G: ClusterGateway + ?Sized,
{
    let binding = privileged_binding(namespace, cluster_role);
    match gateway.create_cluster_role_binding(&binding).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::Conflict => {
            trace!("cluster role binding '{}' already exists", namespace)
        }
        Err(e) => {
            return Err(e).context(error::SetupSnafu {
                action: format!("bind namespace '{}' to '{}'", namespace, cluster_role),
            })
        }
    }
    info!("bound namespace '{}' to '{}'", namespace, cluster_role);
    Ok(())
}

/// Delete the binding created by `bind_privileged` for `namespace`. A binding that is already gone
/// counts as success.
pub async fn unbind_privileged<G>(gateway: &G, namespace: &str) -> crate::gateway::Result<()>
where
    G: ClusterGateway + ?Sized,
{
    gateway
        .delete_cluster_role_binding(namespace)
        .await
        .allow_not_found(|_| {
            trace!("cluster role binding '{}' was already deleted", namespace)
        })?;
    Ok(())
}

/// The objects a scenario has created so far, in creation order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CreatedResources {
    pub namespace: Option<String>,
    pub binding: Option<String>,
}

impl CreatedResources {
    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.binding.is_none()
    }
}

/// What went wrong during teardown. Teardown failures are reported, never raised.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Remove everything recorded in `created`. Every step is attempted even if an earlier one
/// failed. The binding goes first since deleting the namespace does not remove it.
pub async fn teardown<G>(gateway: &G, created: &CreatedResources) -> TeardownReport
where
    G: ClusterGateway + ?Sized,
{
    let mut report = TeardownReport::default();
    if created.is_empty() {
        trace!("nothing to tear down");
        return report;
    }
    if let Some(binding) = &created.binding {
        match unbind_privileged(gateway, binding).await {
            Ok(()) => info!("deleted cluster role binding '{}'", binding),
            Err(e) => {
                warn!("unable to delete cluster role binding '{}': {}", binding, e);
                report.failures.push(e.to_string());
            }
        }
    }
    if let Some(namespace) = &created.namespace {
        match delete_namespace(gateway, namespace).await {
            Ok(()) => info!("deleted namespace '{}'", namespace),
            Err(e) => {
                warn!("unable to delete namespace '{}': {}", namespace, e);
                report.failures.push(e.to_string());
            }
        }
    }
    report
}
