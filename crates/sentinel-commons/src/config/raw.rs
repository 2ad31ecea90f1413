use std::time::Duration;

use serde::Deserialize;

fn default_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
    pub clusters: Vec<RawCluster>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawCluster {
    pub name: String,
    pub kubeconfig: String,
    #[serde(default)]
    pub context: Option<String>,
    pub forwards: Vec<RawForward>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawForward {
    pub namespace: String,
    pub service: String,
    #[serde(rename = "type")]
    pub kind: RawTargetKind,
    pub local_port: u16,
    pub remote_port: u16,
    /// Opaque to the core; consumed only by the database-dump collaborator.
    #[serde(default)]
    pub db_backup: Option<serde_yaml::Value>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RawTargetKind {
    Service,
    Pod,
}
