/*!

An in-memory stand-in for a cluster with pod security policies enabled. Deployments become pods on
`list_pods`; a privileged pod is only created in a namespace whose service accounts are bound to a
cluster role. Pods start running after a configurable number of polls. Failures can be injected
per operation.

!*/

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateWaiting, ContainerStatus, Namespace,
    Pod, PodStatus,
};
use k8s_openapi::api::policy::v1beta1::PodSecurityPolicy;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use psp_harness::gateway::{ClusterGateway, Error, Result};
use psp_harness::PollSettings;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Op {
    CreateNamespace,
    NamespaceExists,
    DeleteNamespace,
    ApplyDeployment,
    CreateBinding,
    DeleteBinding,
    ListPods,
    ListPolicies,
}

/// Short timings so the mock tests run quickly.
pub fn fast_poll() -> PollSettings {
    PollSettings {
        settle: Duration::from_millis(200),
        max_wait: Duration::from_secs(2),
        interval: Duration::from_millis(20),
        initial_backoff: Duration::from_millis(5),
    }
}

pub fn api_error(method: &str, what: &str, name: &str, code: u16) -> Error {
    Error::KubeApiCall {
        method: method.to_string(),
        what: what.to_string(),
        name: name.to_string(),
        source: kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("mock {} {} '{}' failed", method, what, name),
            reason: "Mock".to_string(),
            code,
        }),
    }
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    bindings: BTreeMap<String, ClusterRoleBinding>,
    deployments: BTreeMap<String, Vec<Deployment>>,
    policies: Vec<String>,
    list_calls: HashMap<String, usize>,
    failures: HashMap<Op, VecDeque<u16>>,
    calls: Vec<(Op, String)>,
    /// The number of upcoming `namespace_exists` calls that answer true regardless of name.
    names_taken: usize,
}

pub struct MockGateway {
    state: Mutex<State>,
    /// The number of `list_pods` calls after which admitted pods report running.
    running_after: usize,
    /// Admitted pods never reach running, e.g. a crash looping image.
    never_running: bool,
    /// Privileged deployments are allowed everywhere, i.e. policy enforcement is broken.
    enforcement_disabled: bool,
    /// Refuse privileged deployments at apply time instead of at pod creation.
    reject_at_apply: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                policies: vec![
                    "privileged".to_string(),
                    "restricted".to_string(),
                    "kube-system".to_string(),
                ],
                ..Default::default()
            }),
            running_after: 2,
            never_running: false,
            enforcement_disabled: false,
            reject_at_apply: false,
        }
    }

    pub fn running_after(mut self, polls: usize) -> Self {
        self.running_after = polls;
        self
    }

    pub fn never_running(mut self) -> Self {
        self.never_running = true;
        self
    }

    pub fn enforcement_disabled(mut self) -> Self {
        self.enforcement_disabled = true;
        self
    }

    pub fn reject_at_apply(mut self) -> Self {
        self.reject_at_apply = true;
        self
    }

    pub fn with_policies(self, policies: &[&str]) -> Self {
        self.state.lock().unwrap().policies = policies.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make the next call of `op` fail with the HTTP status `code`. Calls queue up.
    pub fn fail_next(&self, op: Op, code: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(code);
    }

    /// Make the next `count` existence checks report the namespace as already taken.
    pub fn names_taken(self, count: usize) -> Self {
        self.state.lock().unwrap().names_taken = count;
        self
    }

    pub fn add_binding(&self, binding: ClusterRoleBinding) {
        self.state
            .lock()
            .unwrap()
            .bindings
            .insert(binding.name_any(), binding);
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.iter().cloned().collect()
    }

    pub fn bindings(&self) -> Vec<String> {
        self.state.lock().unwrap().bindings.keys().cloned().collect()
    }

    pub fn calls(&self, op: Op) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(call, _)| *call == op)
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn record(&self, op: Op, name: &str, method: &str, what: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((op, name.to_string()));
        match state.failures.get_mut(&op).and_then(|queue| queue.pop_front()) {
            Some(code) => Err(api_error(method, what, name, code)),
            None => Ok(()),
        }
    }

    fn privileged_allowed(state: &State, namespace: &str) -> bool {
        let group = format!("system:serviceaccounts:{}", namespace);
        state.bindings.values().any(|binding| {
            binding
                .subjects
                .iter()
                .flatten()
                .any(|subject| subject.kind == "Group" && subject.name == group)
        })
    }

    fn is_privileged(deployment: &Deployment) -> bool {
        deployment
            .spec
            .iter()
            .filter_map(|spec| spec.template.spec.as_ref())
            .flat_map(|pod| pod.containers.iter())
            .any(|container| {
                container
                    .security_context
                    .as_ref()
                    .and_then(|context| context.privileged)
                    .unwrap_or(false)
            })
    }

    fn pod(name: &str, running: bool) -> Pod {
        let state = if running {
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            }
        } else {
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("ContainerCreating".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }
        };
        Pod {
            metadata: ObjectMeta {
                name: Some(format!("{}-0", name)),
                ..Default::default()
            },
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: name.to_string(),
                    state: Some(state),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterGateway for MockGateway {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        let name = namespace.name_any();
        self.record(Op::CreateNamespace, &name, "create", "namespace")?;
        let mut state = self.state.lock().unwrap();
        if !state.namespaces.insert(name.clone()) {
            return Err(api_error("create", "namespace", &name, 409));
        }
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        self.record(Op::NamespaceExists, name, "get", "namespace")?;
        let mut state = self.state.lock().unwrap();
        if state.names_taken > 0 {
            state.names_taken -= 1;
            return Ok(true);
        }
        Ok(state.namespaces.contains(name))
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.record(Op::DeleteNamespace, name, "delete", "namespace")?;
        let mut state = self.state.lock().unwrap();
        state.deployments.remove(name);
        if !state.namespaces.remove(name) {
            return Err(api_error("delete", "namespace", name, 404));
        }
        Ok(())
    }

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.record(Op::ApplyDeployment, namespace, "apply", "deployment")?;
        let mut state = self.state.lock().unwrap();
        if !state.namespaces.contains(namespace) {
            return Err(api_error("apply", "deployment", namespace, 404));
        }
        if self.reject_at_apply
            && !self.enforcement_disabled
            && Self::is_privileged(deployment)
            && !Self::privileged_allowed(&state, namespace)
        {
            return Err(api_error("apply", "deployment", namespace, 403));
        }
        state
            .deployments
            .entry(namespace.to_string())
            .or_default()
            .push(deployment.clone());
        Ok(())
    }

    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()> {
        let name = binding.name_any();
        self.record(Op::CreateBinding, &name, "create", "cluster role binding")?;
        let mut state = self.state.lock().unwrap();
        if state.bindings.contains_key(&name) {
            return Err(api_error("create", "cluster role binding", &name, 409));
        }
        state.bindings.insert(name, binding.clone());
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<()> {
        self.record(Op::DeleteBinding, name, "delete", "cluster role binding")?;
        match self.state.lock().unwrap().bindings.remove(name) {
            Some(_) => Ok(()),
            None => Err(api_error("delete", "cluster role binding", name, 404)),
        }
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.record(Op::ListPods, namespace, "list", "pods in namespace")?;
        let mut state = self.state.lock().unwrap();
        let polls = {
            let count = state.list_calls.entry(namespace.to_string()).or_default();
            *count += 1;
            *count
        };
        let running = !self.never_running && polls > self.running_after;
        let privileged_allowed =
            self.enforcement_disabled || Self::privileged_allowed(&state, namespace);
        Ok(state
            .deployments
            .get(namespace)
            .into_iter()
            .flatten()
            .filter(|deployment| privileged_allowed || !Self::is_privileged(deployment))
            .map(|deployment| Self::pod(&deployment.name_any(), running))
            .collect())
    }

    async fn list_pod_security_policies(&self) -> Result<Vec<PodSecurityPolicy>> {
        self.record(Op::ListPolicies, "cluster", "list", "pod security policies")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .policies
            .iter()
            .map(|name| PodSecurityPolicy {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect())
    }
}
