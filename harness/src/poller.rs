use crate::error::{self, Result};
use crate::gateway::ClusterGateway;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use log::{debug, warn};
use snafu::ResultExt;
use std::time::Duration;
use tokio::time::Instant;

const MIN_DELAY: Duration = Duration::from_millis(1);
/// Stand-in deadline for windows too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Timing of a readiness poll.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PollSettings {
    /// How long an empty pod list is tolerated. Pods that never appear within this window are
    /// treated as rejected at admission.
    pub settle: Duration,
    /// Upper bound on the whole poll.
    pub max_wait: Duration,
    /// The steady-state delay between two polls.
    pub interval: Duration,
    /// The first delay between polls. It doubles on every poll until it reaches `interval`.
    pub initial_backoff: Duration,
}

/// Point-in-time state of every pod in a namespace.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PodObservation {
    pub pods: Vec<(String, bool)>,
}

impl PodObservation {
    pub fn from_pods(pods: &[Pod]) -> Self {
        Self {
            pods: pods
                .iter()
                .map(|pod| (pod.name_any(), pod_is_running(pod)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// `true` iff at least one pod exists and every pod is running.
    pub fn all_running(&self) -> bool {
        !self.pods.is_empty() && self.pods.iter().all(|(_, running)| *running)
    }

    fn running_count(&self) -> usize {
        self.pods.iter().filter(|(_, running)| *running).count()
    }
}

/// A pod is running when it reports at least one container and every container is in the
/// `running` state. Container readiness is not consulted.
pub fn pod_is_running(pod: &Pod) -> bool {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref());
    match statuses {
        Some(statuses) if !statuses.is_empty() => statuses.iter().all(|status| {
            status
                .state
                .as_ref()
                .map(|state| state.running.is_some())
                .unwrap_or(false)
        }),
        _ => false,
    }
}

/// Poll the pods in `namespace` until every pod runs, or until it is clear they won't.
///
/// Returns `true` once at least one pod exists and all pods are running. Returns `false` as soon
/// as the pod list is still empty after `settings.settle`, since a rejected workload never
/// creates pods, or when `settings.max_wait` elapses with pods that are not all running.
/// Transient list failures are retried within the same window.
pub async fn observe<G>(gateway: &G, namespace: &str, settings: &PollSettings) -> Result<bool>
where
    G: ClusterGateway + ?Sized,
{
    let start = Instant::now();
    let settle_deadline = deadline_after(start, settings.settle);
    let deadline = deadline_after(start, settings.max_wait);
    let mut delay = settings
        .initial_backoff
        .min(settings.interval)
        .max(MIN_DELAY);

    loop {
        match gateway.list_pods(namespace).await {
            Ok(pods) => {
                let observation = PodObservation::from_pods(&pods);
                debug!(
                    "namespace '{}': {} of {} pods running",
                    namespace,
                    observation.running_count(),
                    observation.pods.len()
                );
                if observation.all_running() {
                    return Ok(true);
                }
                if observation.is_empty() && Instant::now() >= settle_deadline {
                    debug!("namespace '{}': no pods appeared", namespace);
                    return Ok(false);
                }
            }
            Err(e) if e.is_transient() => {
                warn!("transient failure listing pods in '{}': {}", namespace, e)
            }
            Err(e) => return Err(e).context(error::ObservationSnafu { namespace }),
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("namespace '{}': timed out waiting for pods", namespace);
            return Ok(false);
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = delay.saturating_mul(2).min(settings.interval);
    }
}

fn deadline_after(start: Instant, window: Duration) -> Instant {
    start
        .checked_add(window)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
