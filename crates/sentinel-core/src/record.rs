use std::sync::Mutex as StdMutex;
use std::time::SystemTime;

use sentinel_commons::model::ForwardSpec;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Where a tunnel sits in its lifecycle. See the transition table this
/// mirrors: `Starting -> Active -> Reconnecting -> (Stopped)`, with
/// `Failed` reserved for the terminal case of a cancelled shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Starting,
    Active,
    Reconnecting,
    Failed,
    Stopped,
}

/// Progress of the backup collaborator's most recent pass over this
/// tunnel, if any. The supervisor never sets this itself; it only exposes
/// the setters to whoever is told to back the tunnel up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    Idle,
    Pending,
    Running,
    Completed { size_bytes: u64 },
    Failed { error: String },
}

struct Inner {
    state: TunnelState,
    last_error: Option<String>,
    last_probe_at: Option<SystemTime>,
    reconnect_at: Option<SystemTime>,
    retry_count: u32,
    backup_status: BackupStatus,
}

/// A read-only snapshot of a [`TunnelRecord`], cheap to clone and safe to
/// hand to an operator view or a backup collaborator without holding any
/// lock.
#[derive(Debug, Clone)]
pub struct TunnelView {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub state: TunnelState,
    pub last_error: Option<String>,
    pub last_probe_at: Option<SystemTime>,
    pub reconnect_at: Option<SystemTime>,
    pub retry_count: u32,
    pub backup_status: BackupStatus,
}

impl TunnelView {
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.cluster, &self.namespace, &self.name)
    }
}

/// The one piece of shared, mutable state per forward. The owning
/// supervisor holds the write lock for the whole of each state
/// transition; every other reader (the operator view, the health probe,
/// a backup collaborator) only ever takes a read lock to snapshot.
///
/// Cancellation works the same way: the supervisor swaps in a fresh
/// [`CancellationToken`] at the start of each attempt, and
/// [`TunnelRecord::request_reconnect`] cancels whichever token is current
/// without either side needing to know the other's state. This keeps the
/// handle cycle-free — the probe holds a `Arc<TunnelRecord>`, never a
/// `CancellationToken` it would otherwise have to keep in sync by hand.
pub struct TunnelRecord {
    pub spec: ForwardSpec,
    state: RwLock<Inner>,
    cancel: StdMutex<CancellationToken>,
}

impl TunnelRecord {
    pub fn new(spec: ForwardSpec) -> Self {
        Self {
            spec,
            state: RwLock::new(Inner {
                state: TunnelState::Starting,
                last_error: None,
                last_probe_at: None,
                reconnect_at: None,
                retry_count: 0,
                backup_status: BackupStatus::Idle,
            }),
            cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    /// Starts a fresh attempt: returns the token the engine should run
    /// under, replacing whatever token a previous attempt left behind.
    pub fn begin_attempt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().expect("cancel mutex poisoned") = token.clone();
        token
    }

    /// Cancels whichever attempt is currently running, if any. Safe to
    /// call from any task holding an `Arc<TunnelRecord>` — the health
    /// probe's only write access to a tunnel goes through this method.
    pub fn request_reconnect(&self) {
        let token = self.cancel.lock().expect("cancel mutex poisoned").clone();
        token.cancel();
    }

    pub async fn mark_starting(&self) {
        let mut guard = self.state.write().await;
        guard.state = TunnelState::Starting;
    }

    pub async fn mark_active(&self) {
        let mut guard = self.state.write().await;
        guard.state = TunnelState::Active;
        guard.retry_count = 0;
        guard.last_error = None;
        guard.reconnect_at = None;
    }

    /// Bumps the retry count and enters `Reconnecting`, returning the new
    /// count so the caller can compute the backoff wait. Every transition
    /// into `Reconnecting` goes through here, whether the failing attempt
    /// ever reached `Active` or not, so the backoff sequence observed
    /// from a cold start (pod never resolves) matches the one observed
    /// after a live tunnel drops. Call [`TunnelRecord::set_reconnect_at`]
    /// once the wait is known.
    pub async fn mark_reconnecting(&self, error: String) -> u32 {
        let mut guard = self.state.write().await;
        guard.state = TunnelState::Reconnecting;
        guard.last_error = Some(error);
        guard.retry_count += 1;
        guard.retry_count
    }

    pub async fn set_reconnect_at(&self, at: SystemTime) {
        self.state.write().await.reconnect_at = Some(at);
    }

    pub async fn mark_stopped(&self) {
        let mut guard = self.state.write().await;
        guard.state = TunnelState::Stopped;
        guard.reconnect_at = None;
    }

    pub async fn mark_failed(&self, error: String) {
        let mut guard = self.state.write().await;
        guard.state = TunnelState::Failed;
        guard.last_error = Some(error);
        guard.reconnect_at = None;
    }

    pub async fn record_probe(&self, at: SystemTime) {
        let mut guard = self.state.write().await;
        guard.last_probe_at = Some(at);
    }

    pub async fn retry_count(&self) -> u32 {
        self.state.read().await.retry_count
    }

    pub async fn state(&self) -> TunnelState {
        self.state.read().await.state
    }

    pub async fn set_backup_status(&self, status: BackupStatus) {
        self.state.write().await.backup_status = status;
    }

    pub async fn snapshot(&self) -> TunnelView {
        let guard = self.state.read().await;
        TunnelView {
            cluster: self.spec.cluster.clone(),
            namespace: self.spec.namespace.clone(),
            name: self.spec.name.clone(),
            local_port: self.spec.local_port,
            remote_port: self.spec.remote_port,
            state: guard.state,
            last_error: guard.last_error.clone(),
            last_probe_at: guard.last_probe_at,
            reconnect_at: guard.reconnect_at,
            retry_count: guard.retry_count,
            backup_status: guard.backup_status.clone(),
        }
    }
}

/// Snapshots every record in `records`, in order. This is the `snapshot()`
/// half of the outbound interface to a UI collaborator — the other half is
/// [`crate::bus::UpdateSubscriber`]'s `updates()` stream.
pub async fn snapshot_all(records: &[std::sync::Arc<TunnelRecord>]) -> Vec<TunnelView> {
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        views.push(record.snapshot().await);
    }
    views
}

#[cfg(test)]
mod tests {
    use sentinel_commons::model::TargetKind;

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
    async fn new_record_starts_in_starting_with_zero_retries() {
        let record = TunnelRecord::new(spec());
        assert_eq!(record.state().await, TunnelState::Starting);
        assert_eq!(record.retry_count().await, 0);
    }

    #[tokio::test]
    async fn mark_active_resets_retry_count_and_error() {
        let record = TunnelRecord::new(spec());
        record.mark_reconnecting("boom".into()).await;
        assert_eq!(record.retry_count().await, 1);

        record.mark_active().await;
        assert_eq!(record.state().await, TunnelState::Active);
        assert_eq!(record.retry_count().await, 0);
        assert!(record.snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn request_reconnect_cancels_the_current_attempt_token() {
        let record = TunnelRecord::new(spec());
        let token = record.begin_attempt();
        assert!(!token.is_cancelled());

        record.request_reconnect();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn begin_attempt_leaves_earlier_tokens_untouched_by_later_cancellation() {
        let record = TunnelRecord::new(spec());
        let first = record.begin_attempt();
        let second = record.begin_attempt();

        record.request_reconnect();
        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn snapshot_all_preserves_order() {
        let mut one_spec = spec();
        one_spec.name = "one".into();
        let mut two_spec = spec();
        two_spec.name = "two".into();

        let records = vec![
            std::sync::Arc::new(TunnelRecord::new(one_spec)),
            std::sync::Arc::new(TunnelRecord::new(two_spec)),
        ];

        let views = snapshot_all(&records).await;
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].name, "one");
        assert_eq!(views[1].name, "two");
    }
}
