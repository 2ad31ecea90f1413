use std::sync::Arc;
use std::time::{
    Duration,
    SystemTime,
};

use futures::stream::{
    FuturesUnordered,
    StreamExt,
};
use tokio::net::TcpStream;
use tokio::time::interval;
use tracing::{
    debug,
    warn,
};

use crate::record::{
    TunnelRecord,
    TunnelState,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Periodically dials every tunnel's local loopback port and requests a
/// reconnect for whichever ones don't answer. A closed or refused local
/// socket means the supervisor's accept loop has died without anyone
/// noticing yet — dialing it is cheaper and more honest than trusting the
/// engine to always report its own death. Tunnels outside `Active` are
/// skipped: a `Starting` tunnel may simply not have bound its socket yet,
/// and dialing it would just cancel a legitimately in-flight attempt.
pub struct HealthProbe {
    tick: Duration,
    records: Vec<Arc<TunnelRecord>>,
}

impl HealthProbe {
    pub fn new(tick: Duration, records: Vec<Arc<TunnelRecord>>) -> Self {
        Self { tick, records }
    }

    /// Runs until cancelled, probing every registered tunnel once per
    /// tick. All probes within a tick run concurrently so one slow
    /// connect can't delay the rest.
    pub async fn run(self, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = interval(self.tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("health probe stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
    }

    async fn probe_once(&self) {
        let mut in_flight: FuturesUnordered<_> = self
            .records
            .iter()
            .map(|record| probe_one(record.clone()))
            .collect();

        while in_flight.next().await.is_some() {}
    }
}

async fn probe_one(record: Arc<TunnelRecord>) {
    if record.state().await != TunnelState::Active {
        return;
    }

    let addr = ("127.0.0.1", record.spec.local_port);
    let now = SystemTime::now();
    record.record_probe(now).await;

    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!(port = record.spec.local_port, error = %e, "health probe connect failed, requesting reconnect");
            record.request_reconnect();
        }
        Err(_) => {
            warn!(port = record.spec.local_port, "health probe timed out, requesting reconnect");
            record.request_reconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use sentinel_commons::model::{
        ForwardSpec,
        TargetKind,
    };
    use tokio::net::TcpListener;

    use super::*;

    fn spec(local_port: u16) -> ForwardSpec {
        ForwardSpec {
            cluster: "dev".into(),
            namespace: "default".into(),
            kind: TargetKind::Pod,
            name: "web-0".into(),
            local_port,
            remote_port: 80,
        }
    }

    #[tokio::test]
    async fn a_listening_socket_is_left_alone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    return;
                }
            }
        });

        let record = Arc::new(TunnelRecord::new(spec(port)));
        let token = record.begin_attempt();
        record.mark_active().await;

        probe_one(record.clone()).await;

        assert!(!token.is_cancelled());
        assert!(record.snapshot().await.last_probe_at.is_some());
    }

    #[tokio::test]
    async fn a_dead_local_socket_triggers_a_reconnect_request() {
        // Bind then drop immediately to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let record = Arc::new(TunnelRecord::new(spec(port)));
        let token = record.begin_attempt();
        record.mark_active().await;

        probe_one(record.clone()).await;

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn a_tunnel_still_starting_is_never_dialed() {
        // Nothing is listening on this port, so a dial would fail if it
        // happened at all.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let record = Arc::new(TunnelRecord::new(spec(port)));
        let token = record.begin_attempt();

        probe_one(record.clone()).await;

        assert!(!token.is_cancelled());
        assert!(record.snapshot().await.last_probe_at.is_none());
    }
}
