use crate::workload::WorkloadKind;
use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the harness. Only `UnexpectedRunnable` and `MissingPolicies` mean the
/// cluster misbehaved; the others mean the check could not be carried out.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to read harness configuration: {}", source))]
    Config { source: envy::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    Setup {
        action: String,
        source: crate::gateway::Error,
    },

    #[snafu(display(
        "Namespace prefix '{}' must be lowercase alphanumerics and '-', starting with an \
         alphanumeric",
        prefix
    ))]
    InvalidNamespacePrefix { prefix: String },

    #[snafu(display(
        "Unable to find an unused namespace name with prefix '{}' after {} attempts",
        prefix,
        attempts
    ))]
    NameExhausted { prefix: String, attempts: usize },

    #[snafu(display("Namespace '{}' was created but never became readable", name))]
    NamespaceNotReadable { name: String },

    #[snafu(display(
        "Unable to submit {} workload to namespace '{}': {}",
        workload,
        namespace,
        source
    ))]
    Submission {
        namespace: String,
        workload: WorkloadKind,
        source: crate::gateway::Error,
    },

    #[snafu(display("Unable to observe pods in namespace '{}': {}", namespace, source))]
    Observation {
        namespace: String,
        source: crate::gateway::Error,
    },

    #[snafu(display("Unable to list pod security policies: {}", source))]
    PolicyInventory { source: crate::gateway::Error },

    #[snafu(display("Scenario in namespace '{}' was aborted after {:?}", namespace, after))]
    Aborted {
        namespace: String,
        after: std::time::Duration,
    },

    #[snafu(display(
        "Expected {} workload in namespace '{}' to be runnable={}, observed runnable={}",
        workload,
        namespace,
        expected,
        observed
    ))]
    UnexpectedRunnable {
        namespace: String,
        workload: WorkloadKind,
        expected: bool,
        observed: bool,
    },

    #[snafu(display("Missing pod security policies: {}", missing.join(", ")))]
    MissingPolicies { missing: Vec<String> },
}

impl Error {
    /// `true` when the cluster was reachable but did not behave as expected.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedRunnable { .. } | Error::MissingPolicies { .. }
        )
    }
}
