#![cfg(feature = "integ")]
/*!

Runs the harness against the cluster named by `PSP_SELFTEST_KUBECONFIG` (or the ambient kube
config). The cluster needs the `PodSecurityPolicy` admission plugin and the `privileged`,
`restricted` and `kube-system` policies.

!*/

use psp_harness::assertion::expect_runnable;
use psp_harness::lifecycle::{
    bind_privileged, create_namespace, delete_namespace, unbind_privileged, unique_namespace_name,
};
use psp_harness::{Scenario, WorkloadKind};
use selftest::Cluster;
use std::time::Duration;

/// The amount of time we allow a deleted namespace to start terminating.
const NAMESPACE_TIMEOUT: Duration = Duration::from_secs(60);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn has_the_expected_policies() {
    init_logger();
    let cluster = Cluster::connect().await.unwrap();
    cluster.driver().unwrap().check_policies().await.unwrap();
}

#[tokio::test]
async fn canonical_scenarios() {
    init_logger();
    let cluster = Cluster::connect().await.unwrap();
    let driver = cluster.driver().unwrap();
    let reports = driver.run_all(&Scenario::canonical()).await;
    for report in &reports {
        assert!(report.passed(), "{}: {:?}", report.scenario, report.result);
        let namespace = report.namespace.as_ref().unwrap();
        assert!(
            cluster
                .wait_for_namespace_removal(namespace, NAMESPACE_TIMEOUT)
                .await
        );
    }
}

#[tokio::test]
async fn privileged_and_unprivileged_namespaces() {
    init_logger();
    let cluster = Cluster::connect().await.unwrap();
    let driver = cluster.driver().unwrap();
    let config = driver.config();
    let gateway = cluster.gateway();
    let poll = config.poll_settings();

    let ns1 = unique_namespace_name(gateway, &config.namespace_prefix)
        .await
        .unwrap();
    create_namespace(gateway, &ns1).await.unwrap();
    bind_privileged(gateway, &ns1, &config.privileged_cluster_role)
        .await
        .unwrap();
    let privileged_runs = expect_runnable(
        gateway,
        &ns1,
        WorkloadKind::Privileged,
        true,
        &config.image,
        &poll,
        |_| (),
    )
    .await;

    let ns2 = unique_namespace_name(gateway, &config.namespace_prefix)
        .await
        .unwrap();
    create_namespace(gateway, &ns2).await.unwrap();
    let privileged_fails = expect_runnable(
        gateway,
        &ns2,
        WorkloadKind::Privileged,
        false,
        &config.image,
        &poll,
        |_| (),
    )
    .await;
    let unprivileged_runs = expect_runnable(
        gateway,
        &ns2,
        WorkloadKind::Unprivileged,
        true,
        &config.image,
        &poll,
        |_| (),
    )
    .await;

    // Clean up before asserting, twice to show deletion is idempotent.
    for _ in 0..2 {
        delete_namespace(gateway, &ns1).await.unwrap();
        delete_namespace(gateway, &ns2).await.unwrap();
        unbind_privileged(gateway, &ns1).await.unwrap();
    }

    privileged_runs.unwrap();
    privileged_fails.unwrap();
    unprivileged_runs.unwrap();
    assert!(!cluster.managed_namespaces().await.unwrap().contains(&ns1));
}
