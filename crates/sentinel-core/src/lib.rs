pub mod backoff;
pub mod backup;
pub mod bus;
pub mod probe;
pub mod record;
pub mod supervisor;

pub use backoff::backoff;
pub use backup::{
    wait_active,
    WaitActiveFailure,
};
pub use bus::{
    update_bus,
    UpdateBus,
    UpdateSubscriber,
};
pub use probe::HealthProbe;
pub use record::{
    snapshot_all,
    BackupStatus,
    TunnelRecord,
    TunnelState,
    TunnelView,
};
pub use supervisor::TunnelSupervisor;
