use thiserror::Error;

/// Something is already bound to a local port a forward wants, and it
/// isn't safely ours to evict.
#[derive(Debug, Error, Clone)]
pub enum PortConflictError {
    #[error("port {port} is in use by '{process_name}' (pid {pid}), which isn't this program")]
    Foreign {
        port: u16,
        pid: i32,
        process_name: String,
    },

    #[error("a stale instance (pid {pid}) kept port {port} after being signalled to stop: {reason}")]
    EvictionFailed {
        port: u16,
        pid: i32,
        reason: String,
    },

    #[error("evicting a stale process is only implemented on unix")]
    UnsupportedPlatform,
}
