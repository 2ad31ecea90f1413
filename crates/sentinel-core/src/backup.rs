use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::record::{
    TunnelRecord,
    TunnelState,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why [`wait_active`] gave up before the tunnel reached `Active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitActiveFailure {
    pub state: TunnelState,
    pub last_error: Option<String>,
}

/// The outbound half of the core's interface to a database-dump style
/// collaborator: block until `record` is ready to be backed up, or until
/// `timeout` elapses.
///
/// This is a boundary, not an orchestrator — the core does not know a
/// backup collaborator exists, schedule one, or interpret `BackupStatus`
/// beyond exposing [`TunnelRecord::set_backup_status`] as a setter. A
/// caller outside this crate is expected to call `wait_active`, then
/// drive the backup itself, reporting progress back through those
/// setters.
pub async fn wait_active(
    record: &Arc<TunnelRecord>, timeout: Duration,
) -> Result<(), WaitActiveFailure> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let view = record.snapshot().await;
        match view.state {
            TunnelState::Active => return Ok(()),
            TunnelState::Stopped | TunnelState::Failed => {
                return Err(WaitActiveFailure {
                    state: view.state,
                    last_error: view.last_error,
                });
            }
            TunnelState::Starting | TunnelState::Reconnecting => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(WaitActiveFailure {
                state: view.state,
                last_error: view.last_error,
            });
        }

        sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(tokio::time::Instant::now())))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use sentinel_commons::model::{
        ForwardSpec,
        TargetKind,
    };

    use super::*;

    fn spec() -> ForwardSpec {
        ForwardSpec {
            cluster: "dev".into(),
            namespace: "default".into(),
            kind: TargetKind::Pod,
            name: "web-0".into(),
            local_port: 8080,
            remote_port: 80,
        }
    }

    #[tokio::test]
    async fn returns_ok_once_the_record_is_active() {
        let record = Arc::new(TunnelRecord::new(spec()));
        record.mark_active().await;

        let result = wait_active(&record, Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn returns_the_current_state_and_error_on_timeout() {
        let record = Arc::new(TunnelRecord::new(spec()));
        record.mark_reconnecting("pod not found".into()).await;

        let result = wait_active(&record, Duration::from_millis(150)).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.state, TunnelState::Reconnecting);
        assert_eq!(failure.last_error.as_deref(), Some("pod not found"));
    }

    #[tokio::test]
    async fn stopped_fails_immediately_without_waiting_out_the_timeout() {
        let record = Arc::new(TunnelRecord::new(spec()));
        record.mark_stopped().await;

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            wait_active(&record, Duration::from_secs(30)),
        )
        .await
        .expect("wait_active should return immediately for a stopped record");

        assert_eq!(result.unwrap_err().state, TunnelState::Stopped);
    }
}
