use serde::Deserialize;
use std::path::PathBuf;

/// Test settings provides a way to send arguments into the Rust tests using environment variables.
pub struct TestSettings {}

impl TestSettings {
    /// The kubeconfig of the cluster under test. When unset, the ambient kube config is used.
    pub fn kubeconfig() -> Option<&'static PathBuf> {
        TEST_SETTINGS.kubeconfig.as_ref()
    }

    /// How long a single scenario may run before the test gives up on it.
    pub fn scenario_timeout_secs() -> u64 {
        TEST_SETTINGS.scenario_timeout_secs
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct Inner {
    /// The path to the kubeconfig of a cluster with the `PodSecurityPolicy` admission plugin
    /// enabled.
    ///
    /// # Example
    ///
    /// ```text
    /// PSP_SELFTEST_KUBECONFIG=/wherever/kubeconfig.yaml
    /// ```
    #[serde(default)]
    kubeconfig: Option<PathBuf>,

    #[serde(default = "scenario_timeout_secs")]
    scenario_timeout_secs: u64,
}

lazy_static::lazy_static! {
    static ref TEST_SETTINGS: Inner =
        envy::prefixed("PSP_SELFTEST_")
            .from_env::<Inner>()
            .expect("Error parsing TestSettings environment variables");
}

/// We need this to provide a default for serde.
fn scenario_timeout_secs() -> u64 {
    300
}
