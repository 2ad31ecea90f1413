mod error;
mod loader;
mod raw;

pub use error::ConfigError;
pub use loader::load_config;
pub use raw::{
    RawCluster,
    RawConfig,
    RawForward,
    RawTargetKind,
};
