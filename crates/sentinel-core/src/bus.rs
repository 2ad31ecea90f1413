use tokio::sync::mpsc;

use crate::record::TunnelView;

/// Capacity of the update channel. Once full, publishers drop the update
/// rather than block — a slow or absent consumer must never stall a
/// supervisor's state transition.
const CAPACITY: usize = 100;

/// The publishing half. Supervisors hold a clone of this and call
/// [`UpdateBus::publish`] after every state transition; a full channel is
/// not an error, just a dropped update (the next snapshot carries the
/// current truth regardless).
#[derive(Clone)]
pub struct UpdateBus {
    tx: mpsc::Sender<TunnelView>,
}

/// The single consuming half, handed to whichever task renders updates
/// (the CLI's operator view, in this crate's only caller).
pub struct UpdateSubscriber {
    rx: mpsc::Receiver<TunnelView>,
}

/// Creates a bounded, lossy, single-consumer update channel.
pub fn update_bus() -> (UpdateBus, UpdateSubscriber) {
    let (tx, rx) = mpsc::channel(CAPACITY);
    (UpdateBus { tx }, UpdateSubscriber { rx })
}

impl UpdateBus {
    /// Publishes a snapshot. Never awaits: a saturated channel silently
    /// drops the update instead of pushing back on the caller.
    pub fn publish(&self, view: TunnelView) {
        if self.tx.try_send(view).is_err() {
            tracing::debug!("update bus full or closed, dropping snapshot");
        }
    }
}

impl UpdateSubscriber {
    pub async fn recv(&mut self) -> Option<TunnelView> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use sentinel_commons::model::{
        ForwardSpec,
        TargetKind,
    };

    use super::*;
    use crate::record::{
        BackupStatus,
        TunnelState,
    };

    fn view(local_port: u16) -> TunnelView {
        let spec = ForwardSpec {
            cluster: "dev".into(),
            namespace: "default".into(),
            kind: TargetKind::Pod,
            name: "web-0".into(),
            local_port,
            remote_port: 80,
        };
        TunnelView {
            cluster: spec.cluster,
            namespace: spec.namespace,
            name: spec.name,
            local_port: spec.local_port,
            remote_port: spec.remote_port,
            state: TunnelState::Active,
            last_error: None,
            last_probe_at: None,
            reconnect_at: None,
            retry_count: 0,
            backup_status: BackupStatus::Idle,
        }
    }

    #[tokio::test]
    async fn published_updates_are_received_in_order() {
        let (bus, mut sub) = update_bus();
        bus.publish(view(1));
        bus.publish(view(2));

        assert_eq!(sub.recv().await.unwrap().local_port, 1);
        assert_eq!(sub.recv().await.unwrap().local_port, 2);
    }

    #[tokio::test]
    async fn publishing_past_capacity_drops_instead_of_blocking() {
        let (bus, mut sub) = update_bus();
        for port in 0..(CAPACITY as u16 + 10) {
            bus.publish(view(port));
        }

        // The channel never blocked the publisher; only the oldest
        // `CAPACITY` updates (or fewer, if the consumer lagged) survive.
        let mut received = 0;
        while tokio::time::timeout(std::time::Duration::from_millis(10), sub.recv())
            .await
            .is_ok_and(|v| v.is_some())
        {
            received += 1;
        }
        assert!(received <= CAPACITY);
    }
}
