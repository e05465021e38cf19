use crate::constants::{
    DEFAULT_IMAGE, DEFAULT_NAMESPACE_PREFIX, DEFAULT_PRIVILEGED_CLUSTER_ROLE, ENV_PREFIX,
    POLICY_KUBE_SYSTEM, POLICY_PRIVILEGED, POLICY_RESTRICTED,
};
use crate::error::{self, Result};
use crate::poller::PollSettings;
use serde::Deserialize;
use snafu::ResultExt;
use std::time::Duration;

/// Settings for a harness run. Every field has a default, and each can be overridden through a
/// `PSP_HARNESS_` prefixed environment variable.
///
/// # Example
///
/// ```text
/// PSP_HARNESS_EXPECTED_POLICIES=privileged,restricted,kube-system,eks.privileged
/// PSP_HARNESS_SETTLE_SECS=20
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Prefix of every namespace the harness generates.
    #[serde(default = "namespace_prefix")]
    pub namespace_prefix: String,

    /// The cluster role that grants `use` on the privileged policy.
    #[serde(default = "privileged_cluster_role")]
    pub privileged_cluster_role: String,

    /// Image used by both workload templates. It must be able to start as a non-root user.
    #[serde(default = "image")]
    pub image: String,

    /// Policies that must be installed in the cluster. Extra policies are fine.
    #[serde(default = "expected_policies")]
    pub expected_policies: Vec<String>,

    /// How long an empty pod list is tolerated before the workload is considered rejected.
    #[serde(default = "settle_secs")]
    pub settle_secs: u64,

    /// Upper bound on waiting for all pods to run.
    #[serde(default = "max_wait_secs")]
    pub max_wait_secs: u64,

    #[serde(default = "poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// A scenario that has not reached teardown after this long is aborted.
    #[serde(default = "scenario_timeout_secs")]
    pub scenario_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: namespace_prefix(),
            privileged_cluster_role: privileged_cluster_role(),
            image: image(),
            expected_policies: expected_policies(),
            settle_secs: settle_secs(),
            max_wait_secs: max_wait_secs(),
            poll_interval_ms: poll_interval_ms(),
            initial_backoff_ms: initial_backoff_ms(),
            scenario_timeout_secs: scenario_timeout_secs(),
        }
    }
}

impl HarnessConfig {
    /// Read the configuration from `PSP_HARNESS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .context(error::ConfigSnafu)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            settle: Duration::from_secs(self.settle_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
            interval: Duration::from_millis(self.poll_interval_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
        }
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.scenario_timeout_secs)
    }
}

// Functions providing defaults for serde.

fn namespace_prefix() -> String {
    DEFAULT_NAMESPACE_PREFIX.to_string()
}

fn privileged_cluster_role() -> String {
    DEFAULT_PRIVILEGED_CLUSTER_ROLE.to_string()
}

fn image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn expected_policies() -> Vec<String> {
    vec![POLICY_PRIVILEGED, POLICY_RESTRICTED, POLICY_KUBE_SYSTEM]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn settle_secs() -> u64 {
    10
}

fn max_wait_secs() -> u64 {
    60
}

fn poll_interval_ms() -> u64 {
    1000
}

fn initial_backoff_ms() -> u64 {
    250
}

fn scenario_timeout_secs() -> u64 {
    300
}
