use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::raw::{
    RawCluster,
    RawConfig,
    RawForward,
    RawTargetKind,
};
use crate::model::{
    ClusterConfig,
    ForwardSpec,
    LoadedConfig,
    TargetKind,
};

/// Reads, parses, and validates the YAML config at `path`.
///
/// Validation enforces every invariant in the data model before a single
/// `ForwardSpec` is handed back: port ranges, cluster-name uniqueness,
/// per-cluster `(namespace, service)` uniqueness, and global `local_port`
/// uniqueness.
pub fn load_config(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let raw: RawConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    validate_and_build(raw)
}

fn validate_and_build(raw: RawConfig) -> Result<LoadedConfig, ConfigError> {
    if raw.clusters.is_empty() {
        return Err(ConfigError::NoClusters);
    }

    let mut cluster_names = HashSet::new();
    let mut forward_identities = HashSet::new();
    let mut local_ports = HashSet::new();

    let mut clusters = Vec::with_capacity(raw.clusters.len());
    let mut forwards = Vec::new();

    for RawCluster {
        name,
        kubeconfig,
        context,
        forwards: raw_forwards,
    } in raw.clusters
    {
        if !cluster_names.insert(name.clone()) {
            return Err(ConfigError::DuplicateCluster(name));
        }

        if raw_forwards.is_empty() {
            return Err(ConfigError::NoForwards(name));
        }

        for RawForward {
            namespace,
            service,
            kind,
            local_port,
            remote_port,
            db_backup: _,
        } in raw_forwards
        {
            validate_port("local_port", local_port)?;
            validate_port("remote_port", remote_port)?;

            let identity = (name.clone(), namespace.clone(), service.clone());
            if !forward_identities.insert(identity) {
                return Err(ConfigError::DuplicateForward {
                    cluster: name.clone(),
                    namespace,
                    service,
                });
            }

            if !local_ports.insert(local_port) {
                return Err(ConfigError::DuplicateLocalPort(local_port));
            }

            forwards.push(ForwardSpec {
                cluster: name.clone(),
                namespace,
                kind: match kind {
                    RawTargetKind::Service => TargetKind::Service,
                    RawTargetKind::Pod => TargetKind::Pod,
                },
                name: service,
                local_port,
                remote_port,
            });
        }

        clusters.push(ClusterConfig {
            name,
            kubeconfig,
            context,
        });
    }

    Ok(LoadedConfig {
        check_interval: raw.check_interval,
        reconnect_delay: raw.reconnect_delay,
        clusters,
        forwards,
    })
}

fn validate_port(field: &'static str, value: u16) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::PortOutOfRange {
            field,
            value: value as u32,
        });
    }
    Ok(())
}
