/*!

The scenario driver composes the other components into the four canonical checks of pod security
policy enforcement, plus the policy inventory check.

Each scenario walks `Setup → Submit → Observe → Assert → Teardown`. Setup through assert run under
a timeout; teardown always runs against whatever setup managed to create.

!*/

use crate::assertion::{expect_policies, expect_runnable};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use crate::lifecycle::{
    bind_privileged, create_namespace, teardown, unique_namespace_name, CreatedResources,
    TeardownReport,
};
use crate::poller::PollSettings;
use crate::workload::WorkloadKind;
use futures::future::join_all;
use log::{error, info};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// One row of the enforcement table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Scenario {
    /// Whether the namespace's service accounts are bound to the privileged policy.
    pub privileged_namespace: bool,
    pub workload: WorkloadKind,
    pub expected_runnable: bool,
}

impl Scenario {
    /// The four combinations of namespace and workload privilege, and whether the workload should
    /// run in each.
    pub fn canonical() -> [Scenario; 4] {
        [
            Scenario {
                privileged_namespace: true,
                workload: WorkloadKind::Privileged,
                expected_runnable: true,
            },
            Scenario {
                privileged_namespace: true,
                workload: WorkloadKind::Unprivileged,
                expected_runnable: true,
            },
            Scenario {
                privileged_namespace: false,
                workload: WorkloadKind::Privileged,
                expected_runnable: false,
            },
            Scenario {
                privileged_namespace: false,
                workload: WorkloadKind::Unprivileged,
                expected_runnable: true,
            },
        ]
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let namespace = if self.privileged_namespace {
            "privileged"
        } else {
            "unprivileged"
        };
        let outcome = if self.expected_runnable {
            "runs"
        } else {
            "fails"
        };
        write!(
            f,
            "{} workload {} in {} namespace",
            self.workload, outcome, namespace
        )
    }
}

/// The steps a scenario moves through.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ScenarioState {
    Setup,
    Submit,
    Observe,
    Assert,
    Teardown,
    Done,
}

/// The outcome of one scenario.
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    /// The namespace the scenario ran in, if one was created.
    pub namespace: Option<String>,
    pub result: Result<()>,
    pub teardown: TeardownReport,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// The outcome of the policy inventory check and every scenario.
#[derive(Debug)]
pub struct SuiteReport {
    pub policies: Result<()>,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.policies.is_ok() && self.scenarios.iter().all(ScenarioReport::passed)
    }
}

/// Runs scenarios against the cluster behind `gateway`.
pub struct ScenarioDriver<G> {
    gateway: G,
    config: HarnessConfig,
    poll: PollSettings,
    scenario_timeout: Duration,
}

impl<G> ScenarioDriver<G>
where
    G: ClusterGateway,
{
    pub fn new(gateway: G, config: HarnessConfig) -> Self {
        let poll = config.poll_settings();
        let scenario_timeout = config.scenario_timeout();
        Self {
            gateway,
            config,
            poll,
            scenario_timeout,
        }
    }

    /// Replace the poll timing taken from the configuration.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Replace the scenario timeout taken from the configuration.
    pub fn with_scenario_timeout(mut self, scenario_timeout: Duration) -> Self {
        self.scenario_timeout = scenario_timeout;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Check that every configured policy is installed.
    pub async fn check_policies(&self) -> Result<()> {
        expect_policies(&self.gateway, &self.config.expected_policies).await
    }

    /// Run `scenario` in a freshly generated namespace.
    pub async fn run(&self, scenario: Scenario) -> ScenarioReport {
        let mut created = CreatedResources::default();
        let timeout = self.scenario_timeout;
        let outcome = tokio::time::timeout(timeout, self.run_body(scenario, &mut created)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Aborted {
                namespace: created.namespace.clone().unwrap_or_default(),
                after: timeout,
            }),
        };
        if let Err(e) = &result {
            error!("scenario '{}' failed: {}", scenario, e);
        }

        transition(&scenario, ScenarioState::Teardown);
        let teardown = teardown(&self.gateway, &created).await;
        transition(&scenario, ScenarioState::Done);

        ScenarioReport {
            scenario,
            namespace: created.namespace,
            result,
            teardown,
        }
    }

    /// Run every scenario in `scenarios` concurrently. Each one owns its namespace.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        join_all(scenarios.iter().map(|scenario| self.run(*scenario))).await
    }

    /// Run the policy inventory check and the four canonical scenarios.
    pub async fn run_suite(&self) -> SuiteReport {
        let policies = self.check_policies().await;
        if let Err(e) = &policies {
            error!("policy inventory check failed: {}", e);
        }
        let scenarios = self.run_all(&Scenario::canonical()).await;
        SuiteReport {
            policies,
            scenarios,
        }
    }

    /// Setup through assert. Anything setup attempts to create is recorded in `created` first.
    async fn run_body(&self, scenario: Scenario, created: &mut CreatedResources) -> Result<()> {
        transition(&scenario, ScenarioState::Setup);
        let namespace = unique_namespace_name(&self.gateway, &self.config.namespace_prefix).await?;
        created.namespace = Some(namespace.clone());
        create_namespace(&self.gateway, &namespace).await?;
        if scenario.privileged_namespace {
            created.binding = Some(namespace.clone());
            bind_privileged(
                &self.gateway,
                &namespace,
                &self.config.privileged_cluster_role,
            )
            .await?;
        }

        expect_runnable(
            &self.gateway,
            &namespace,
            scenario.workload,
            scenario.expected_runnable,
            &self.config.image,
            &self.poll,
            |state| transition(&scenario, state),
        )
        .await
    }
}

fn transition(scenario: &Scenario, state: ScenarioState) {
    info!("scenario '{}': {:?}", scenario, state);
}
