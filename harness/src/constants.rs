// Identity of the harness on the objects it writes.
pub const FIELD_MANAGER: &str = "psp-harness";
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// RBAC
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
pub const SERVICE_ACCOUNTS_GROUP_PREFIX: &str = "system:serviceaccounts:";
pub const DEFAULT_PRIVILEGED_CLUSTER_ROLE: &str = "psp:privileged";

// Policy names every cluster under test is expected to carry.
pub const POLICY_PRIVILEGED: &str = "privileged";
pub const POLICY_RESTRICTED: &str = "restricted";
pub const POLICY_KUBE_SYSTEM: &str = "kube-system";

// Workloads
pub const PRIVILEGED_WORKLOAD: &str = "psp-privileged";
pub const UNPRIVILEGED_WORKLOAD: &str = "psp-unprivileged";
pub const DEFAULT_IMAGE: &str = "nginxinc/nginx-unprivileged:stable-alpine";
/// The uid the default image is built to run as.
pub const UNPRIVILEGED_UID: i64 = 101;

// Namespaces
pub const DEFAULT_NAMESPACE_PREFIX: &str = "integrationtest-psp";
pub const MAX_NAMESPACE_LEN: usize = 63;

// Environment variables
pub const ENV_PREFIX: &str = "PSP_HARNESS_";
