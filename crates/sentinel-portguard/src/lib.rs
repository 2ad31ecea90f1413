pub mod error;
pub mod resolver;

pub use error::PortConflictError;
pub use resolver::ensure_port_available;
