use crate::constants::{
    APP_MANAGED_BY, APP_NAME, FIELD_MANAGER, PRIVILEGED_WORKLOAD, UNPRIVILEGED_UID,
    UNPRIVILEGED_WORKLOAD,
};
use crate::error::{self, Result};
use crate::gateway::{ClusterGateway, ErrorKind};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, PodSpec, PodTemplateSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use log::info;
use maplit::btreemap;
use snafu::ResultExt;
use std::fmt::{Display, Formatter};

/// Whether a workload asks for a privileged container.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum WorkloadKind {
    Privileged,
    Unprivileged,
}

impl WorkloadKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkloadKind::Privileged => PRIVILEGED_WORKLOAD,
            WorkloadKind::Unprivileged => UNPRIVILEGED_WORKLOAD,
        }
    }

    fn security_context(&self) -> SecurityContext {
        match self {
            WorkloadKind::Privileged => SecurityContext {
                privileged: Some(true),
                allow_privilege_escalation: Some(true),
                run_as_user: Some(0),
                ..Default::default()
            },
            WorkloadKind::Unprivileged => SecurityContext {
                privileged: Some(false),
                allow_privilege_escalation: Some(false),
                run_as_non_root: Some(true),
                run_as_user: Some(UNPRIVILEGED_UID),
                capabilities: Some(Capabilities {
                    drop: Some(vec!["ALL".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }
}

impl Display for WorkloadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadKind::Privileged => write!(f, "privileged"),
            WorkloadKind::Unprivileged => write!(f, "unprivileged"),
        }
    }
}

/// The result of handing a workload to the cluster.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Submission {
    Accepted,
    /// Admission refused the manifest itself. This is an outcome, not a failure.
    Rejected { reason: String },
}

/// Defines a single replica deployment of `image` for `kind`. The two kinds differ only in the
/// container's security context.
pub fn render(kind: WorkloadKind, namespace: &str, image: &str) -> Deployment {
    let labels = btreemap! {
        APP_NAME.to_string() => kind.name().to_string(),
    };
    Deployment {
        metadata: ObjectMeta {
            name: Some(kind.name().to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(btreemap! {
                APP_NAME.to_string() => kind.name().to_string(),
                APP_MANAGED_BY.to_string() => FIELD_MANAGER.to_string(),
            }),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: kind.name().to_string(),
                        image: Some(image.to_string()),
                        security_context: Some(kind.security_context()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Render the `kind` workload and apply it to `namespace`. Returns once the apply call returns,
/// which says nothing about whether pods will run.
pub async fn submit<G>(
    gateway: &G,
    namespace: &str,
    kind: WorkloadKind,
    image: &str,
) -> Result<Submission>
where
    G: ClusterGateway + ?Sized,
{
    let deployment = render(kind, namespace, image);
    match gateway.apply_deployment(namespace, &deployment).await {
        Ok(()) => {
            info!("submitted {} workload to namespace '{}'", kind, namespace);
            Ok(Submission::Accepted)
        }
        Err(e) if e.kind() == ErrorKind::Rejected => {
            info!(
                "{} workload was rejected by namespace '{}': {}",
                kind, namespace, e
            );
            Ok(Submission::Rejected {
                reason: e.to_string(),
            })
        }
        Err(e) => Err(e).context(error::SubmissionSnafu {
            namespace,
            workload: kind,
        }),
    }
}
