use thiserror::Error;

/// Malformed, missing, duplicate, or out-of-range configuration.
///
/// Always fatal: surfaced to the caller before any supervisor starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no clusters configured")]
    NoClusters,

    #[error("cluster '{0}' has no forwards configured")]
    NoForwards(String),

    #[error("duplicate cluster name '{0}'")]
    DuplicateCluster(String),

    #[error("duplicate forward ({cluster}, {namespace}, {service})")]
    DuplicateForward {
        cluster: String,
        namespace: String,
        service: String,
    },

    #[error("local_port {0} is used by more than one forward")]
    DuplicateLocalPort(u16),

    #[error("{field} must be between 1 and 65535, got {value}")]
    PortOutOfRange { field: &'static str, value: u32 },
}
