/*!

`psp-harness` checks that a Kubernetes cluster enforces its pod security policies. It creates
throwaway namespaces, optionally binds them to the privileged policy, submits privileged and
unprivileged workloads, and asserts which of them get to run.

The harness only observes admission; it never decides it. All cluster access goes through a
[`ClusterGateway`], with [`KubeGateway`] as the live implementation.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use gateway::{ClusterGateway, KubeGateway};
pub use lifecycle::{CreatedResources, TeardownReport};
pub use poller::{PodObservation, PollSettings};
pub use scenario::{Scenario, ScenarioDriver, ScenarioReport, ScenarioState, SuiteReport};
pub use workload::{Submission, WorkloadKind};

pub mod assertion;
mod config;
pub mod constants;
mod error;
pub mod gateway;
pub mod lifecycle;
pub mod poller;
mod scenario;
pub mod workload;
