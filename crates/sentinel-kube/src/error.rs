use thiserror::Error;

/// Unreadable kubeconfig file, unknown context, or invalid credentials.
///
/// Surfaced at initialization; fatal.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("failed to read kubeconfig at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: kube::config::KubeconfigError,
    },

    #[error("context '{context}' not found in kubeconfig {path}")]
    ContextNotFound { path: String, context: String },

    #[error("failed to build client configuration: {0}")]
    Config(#[source] kube::config::KubeconfigError),

    #[error("failed to build Kubernetes client: {0}")]
    Client(#[source] kube::Error),
}

/// Target pod absent or not running, or service has no running endpoints.
///
/// Transient; routed to `Reconnecting` with backoff.
#[derive(Debug, Error, Clone)]
pub enum PodResolveError {
    #[error("pod '{0}' not found")]
    NotFound(String),

    #[error("pod '{0}' is not running")]
    NotRunning(String),

    #[error("service '{0}' has no running endpoints")]
    NoEndpoints(String),

    #[error("Kubernetes API error: {0}")]
    Transport(String),

    #[error("pod resolution for '{0}' did not complete within the 10s deadline")]
    Timeout(String),
}

/// Everything that can go wrong while opening or running one tunnel attempt.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("pod resolution failed: {0}")]
    PodResolve(#[from] PodResolveError),

    #[error("failed to upgrade to a port-forward stream: {0}")]
    Dial(String),

    #[error("tunnel engine did not become ready within 30s")]
    ReadyTimeout,

    #[error("tunnel terminated: {0}")]
    Terminated(String),

    #[error("local bind failed: {0}")]
    Bind(String),
}
