use serde::{
    Deserialize,
    Serialize,
};

/// What kind of Kubernetes object a forward's target name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Service,
    Pod,
}

/// One configured tunnel, immutable after load.
///
/// Identity is `(cluster, namespace, name)`; `local_port` is unique across
/// every spec in a loaded config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardSpec {
    pub cluster: String,
    pub namespace: String,
    pub kind: TargetKind,
    pub name: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl ForwardSpec {
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.cluster, &self.namespace, &self.name)
    }
}

/// Per-cluster kubeconfig location, resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub name: String,
    pub kubeconfig: String,
    pub context: Option<String>,
}

/// Fully loaded and validated configuration: clusters plus every forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedConfig {
    pub check_interval: std::time::Duration,
    pub reconnect_delay: std::time::Duration,
    pub clusters: Vec<ClusterConfig>,
    pub forwards: Vec<ForwardSpec>,
}
