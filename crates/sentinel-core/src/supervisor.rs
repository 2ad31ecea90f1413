use std::sync::Arc;
use std::time::{
    Duration,
    SystemTime,
};

use sentinel_kube::{
    ClusterBinding,
    PodResolver,
    TunnelEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};

use crate::backoff::backoff;
use crate::bus::UpdateBus;
use crate::record::TunnelRecord;

/// Drives one [`TunnelRecord`] through its whole lifetime: resolve a
/// target pod, open an engine attempt, wait for it to become ready or
/// die, and on failure wait out a backoff before trying again. Runs
/// until `shutdown` is cancelled, at which point it tears down any live
/// attempt and leaves the record in `Stopped`.
pub struct TunnelSupervisor {
    record: Arc<TunnelRecord>,
    binding: ClusterBinding,
    pod_resolver: PodResolver,
    engine: TunnelEngine,
    reconnect_delay: Duration,
    bus: UpdateBus,
}

impl TunnelSupervisor {
    pub fn new(
        record: Arc<TunnelRecord>, binding: ClusterBinding, reconnect_delay: Duration,
        bus: UpdateBus,
    ) -> Self {
        Self {
            record,
            binding,
            pod_resolver: PodResolver,
            engine: TunnelEngine,
            reconnect_delay,
            bus,
        }
    }

    #[tracing::instrument(skip(self, shutdown), fields(cluster = %self.record.spec.cluster, namespace = %self.record.spec.namespace, name = %self.record.spec.name))]
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            self.record.mark_starting().await;
            self.publish().await;

            let pod_name = match self
                .pod_resolver
                .resolve(&self.binding, &self.record.spec)
                .await
            {
                Ok(pod_name) => pod_name,
                Err(e) => {
                    if !self.fail_and_wait(e.to_string(), &shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            let attempt_token = self.record.begin_attempt();
            let handle = self.engine.open(
                self.binding.clone(),
                self.record.spec.namespace.clone(),
                pod_name,
                self.record.spec.local_port,
                self.record.spec.remote_port,
                attempt_token.clone(),
            );

            let mut ready_rx = handle.ready;
            let mut terminated_rx = handle.terminated;

            let became_ready = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.shut_down(attempt_token, terminated_rx).await;
                    return;
                }
                term = &mut terminated_rx => {
                    // Failed before ever becoming ready: pod-resolve-shaped
                    // failures that only surface once the stream is dialed.
                    let error = termination_error(term);
                    if !self.fail_and_wait(error, &shutdown).await {
                        return;
                    }
                    continue;
                }
                ready = &mut ready_rx => ready.is_ok(),
            };

            if became_ready {
                info!("tunnel active");
                self.record.mark_active().await;
                self.publish().await;
            }

            let error = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.shut_down(attempt_token, terminated_rx).await;
                    return;
                }
                term = &mut terminated_rx => termination_error(term),
            };

            if !self.fail_and_wait(error, &shutdown).await {
                return;
            }
        }
    }

    /// Cancels the live attempt, waits for its engine task to actually
    /// exit, and leaves the record in `Stopped`. Shared by both points in
    /// `run` where a shutdown can land.
    async fn shut_down(
        &self, attempt_token: CancellationToken,
        terminated: tokio::sync::oneshot::Receiver<Option<sentinel_kube::EngineError>>,
    ) {
        attempt_token.cancel();
        let _ = terminated.await;
        self.record.mark_stopped().await;
        self.publish().await;
    }

    /// Records a failure, computes the backoff wait, and sleeps it out
    /// (or stops early on shutdown). Returns `false` if the supervisor
    /// should exit instead of retrying.
    async fn fail_and_wait(&self, error: String, shutdown: &CancellationToken) -> bool {
        warn!(error = %error, "tunnel attempt failed");
        let retry_count = self.record.mark_reconnecting(error).await;
        let wait = backoff(retry_count, self.reconnect_delay);
        let reconnect_at = SystemTime::now() + wait;
        self.record.set_reconnect_at(reconnect_at).await;
        self.publish().await;

        tokio::select! {
            _ = shutdown.cancelled() => {
                self.record.mark_stopped().await;
                self.publish().await;
                false
            }
            _ = tokio::time::sleep(wait) => true,
        }
    }

    async fn publish(&self) {
        self.bus.publish(self.record.snapshot().await);
    }
}

/// Turns an engine's termination signal into a human-readable cause. A
/// clean, error-free termination still counts as a failure here — it
/// only happens when something (the health probe, most often) cancelled
/// the attempt out from under an otherwise-healthy tunnel, and that
/// deserves the same reconnect-with-backoff treatment as an explicit
/// error.
fn termination_error(
    term: Result<Option<sentinel_kube::EngineError>, tokio::sync::oneshot::error::RecvError>,
) -> String {
    match term {
        Ok(Some(e)) => e.to_string(),
        Ok(None) => "tunnel connection lost".into(),
        Err(_) => "tunnel engine task ended unexpectedly".into(),
    }
}
