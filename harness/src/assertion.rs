use crate::error::{self, Result};
use crate::gateway::ClusterGateway;
use crate::poller::{observe, PollSettings};
use crate::scenario::ScenarioState;
use crate::workload::{submit, Submission, WorkloadKind};
use kube::ResourceExt;
use log::info;
use snafu::{ensure, ResultExt};
use std::collections::BTreeSet;

/// The names in `expected` that are absent from `installed`, in the order they were expected.
pub fn missing_policies<S>(installed: &BTreeSet<String>, expected: &[S]) -> Vec<String>
where
    S: AsRef<str>,
{
    expected
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| !installed.contains(*name))
        .map(|name| name.to_string())
        .collect()
}

/// The names of every pod security policy installed in the cluster.
pub async fn installed_policies<G>(gateway: &G) -> Result<BTreeSet<String>>
where
    G: ClusterGateway + ?Sized,
{
    Ok(gateway
        .list_pod_security_policies()
        .await
        .context(error::PolicyInventorySnafu)?
        .iter()
        .map(|policy| policy.name_any())
        .collect())
}

/// Fail with the missing names unless every name in `expected` is installed. Additional policies
/// in the cluster are ignored.
pub async fn expect_policies<G, S>(gateway: &G, expected: &[S]) -> Result<()>
where
    G: ClusterGateway + ?Sized,
    S: AsRef<str> + Sync,
{
    let installed = installed_policies(gateway).await?;
    let missing = missing_policies(&installed, expected);
    ensure!(missing.is_empty(), error::MissingPoliciesSnafu { missing });
    info!("all {} expected policies are installed", expected.len());
    Ok(())
}

/// Submit a `kind` workload to `namespace`, observe it, and fail unless whether it runs matches
/// `expected`. A rejected submission is observed as not runnable. `on_state` is called as the
/// check enters each of its submit, observe and assert steps.
pub async fn expect_runnable<G, F>(
    gateway: &G,
    namespace: &str,
    kind: WorkloadKind,
    expected: bool,
    image: &str,
    settings: &PollSettings,
    mut on_state: F,
) -> Result<()>
where
    G: ClusterGateway + ?Sized,
    F: FnMut(ScenarioState) + Send,
{
    on_state(ScenarioState::Submit);
    let submission = submit(gateway, namespace, kind, image).await?;

    on_state(ScenarioState::Observe);
    let observed = match submission {
        Submission::Accepted => observe(gateway, namespace, settings).await?,
        Submission::Rejected { .. } => false,
    };

    on_state(ScenarioState::Assert);
    ensure!(
        observed == expected,
        error::UnexpectedRunnableSnafu {
            namespace,
            workload: kind,
            expected,
            observed,
        }
    );
    info!(
        "{} workload in namespace '{}' runnable={} as expected",
        kind, namespace, observed
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn superset_is_accepted() {
        let installed = set(&["privileged", "restricted", "kube-system", "eks.privileged"]);
        let expected = ["privileged", "restricted", "kube-system"];
        assert!(missing_policies(&installed, &expected).is_empty());
    }

    #[test]
    fn missing_names_are_listed() {
        let installed = set(&["privileged", "kube-system"]);
        assert_eq!(
            missing_policies(&installed, &["privileged", "restricted", "kube-system"]),
            vec!["restricted".to_string()]
        );
        assert_eq!(
            missing_policies(&BTreeSet::new(), &["privileged", "restricted"]),
            vec!["privileged".to_string(), "restricted".to_string()]
        );
    }
}
