use std::net::SocketAddr;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use tokio::io::{
    copy_bidirectional,
    AsyncWriteExt,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};

use crate::client::ClusterBinding;
use crate::error::EngineError;

const READY_DEADLINE: Duration = Duration::from_secs(30);

/// The two asynchronous signals an in-flight tunnel attempt exposes.
pub struct EngineHandle {
    /// Resolves once when the local socket is bound and the stream is live.
    pub ready: oneshot::Receiver<()>,
    /// Resolves with an optional error when the tunnel ends for any reason.
    pub terminated: oneshot::Receiver<Option<EngineError>>,
}

/// Binds `127.0.0.1:local_port`, pumps bytes between it and `remote_port`
/// on the resolved pod, for as long as the attempt lives.
pub struct TunnelEngine;

impl TunnelEngine {
    /// Starts one tunnel attempt in the background and returns immediately
    /// with the `ready`/`terminated` signal pair described in the engine's
    /// contract. The bind address is always loopback. The 30s readiness
    /// ceiling covers only the bind step, not the tunnel's subsequent
    /// (unbounded) lifetime.
    #[tracing::instrument(skip(binding, cancel), fields(pod = %pod_name, local_port, remote_port))]
    pub fn open(
        &self, binding: ClusterBinding, namespace: String, pod_name: String, local_port: u16,
        remote_port: u16, cancel: CancellationToken,
    ) -> EngineHandle {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (terminated_tx, terminated_rx) = oneshot::channel();

        tokio::spawn(async move {
            let addr: SocketAddr = ([127, 0, 0, 1], local_port).into();

            let listener = match tokio::time::timeout(READY_DEADLINE, TcpListener::bind(addr))
                .await
            {
                Ok(Ok(listener)) => listener,
                Ok(Err(e)) => {
                    let _ = terminated_tx.send(Some(EngineError::Bind(e.to_string())));
                    return;
                }
                Err(_) => {
                    let _ = terminated_tx.send(Some(EngineError::ReadyTimeout));
                    return;
                }
            };

            info!(%addr, "tunnel bound");
            if ready_tx.send(()).is_err() {
                debug!("ready receiver dropped before bind completed");
            }

            let outcome = accept_loop(binding, namespace, pod_name, listener, remote_port, cancel)
                .await;

            let _ = terminated_tx.send(outcome.err());
        });

        EngineHandle {
            ready: ready_rx,
            terminated: terminated_rx,
        }
    }
}

/// Runs the accept loop for an already-bound attempt. Returns once the
/// listener is cancelled (`Ok`) or a fatal error ends the tunnel (`Err`).
async fn accept_loop(
    binding: ClusterBinding, namespace: String, pod_name: String, listener: TcpListener,
    remote_port: u16, cancel: CancellationToken,
) -> Result<(), EngineError> {
    let pods: Api<Pod> = Api::namespaced(binding.client.clone(), &namespace);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("tunnel cancelled");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (mut client_conn, peer) = accepted.map_err(|e| EngineError::Bind(e.to_string()))?;
                debug!(%peer, "accepted local connection");

                let mut forwarder = pods
                    .portforward(&pod_name, &[remote_port])
                    .await
                    .map_err(|e| EngineError::Dial(e.to_string()))?;

                let mut upstream = forwarder
                    .take_stream(remote_port)
                    .ok_or_else(|| EngineError::Dial("port not present in forwarder".into()))?;

                tokio::spawn(async move {
                    if let Err(e) = copy_bidirectional(&mut client_conn, &mut upstream).await {
                        warn!(error = %e, "connection forwarding ended with an error");
                    }
                    let _ = client_conn.shutdown().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{
        Request,
        Response,
    };
    use kube::client::Body;
    use kube::Client;
    use tower_test::mock;

    use super::*;

    fn mock_binding() -> ClusterBinding {
        let (mock_service, _handle) = mock::pair::<Request<Body>, Response<Body>>();
        ClusterBinding {
            cluster: "c1".into(),
            client: Client::new(mock_service, "default"),
        }
    }

    async fn free_loopback_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn ready_fires_once_the_loopback_socket_is_bound() {
        let port = free_loopback_port().await;
        let cancel = CancellationToken::new();

        let handle = TunnelEngine.open(
            mock_binding(),
            "default".into(),
            "api-xyz".into(),
            port,
            80,
            cancel.clone(),
        );

        tokio::time::timeout(Duration::from_secs(1), handle.ready)
            .await
            .expect("ready should fire promptly")
            .expect("ready sender should not be dropped");

        cancel.cancel();
        let outcome = handle.terminated.await.unwrap();
        assert!(outcome.is_none(), "a cancelled-before-any-connection tunnel ends cleanly");
    }

    #[tokio::test]
    async fn binding_an_already_used_port_surfaces_a_bind_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let cancel = CancellationToken::new();
        let handle = TunnelEngine.open(
            mock_binding(),
            "default".into(),
            "api-xyz".into(),
            port,
            80,
            cancel,
        );

        // The bind fails before `ready` ever fires; `terminated` carries the
        // error instead, and the ready sender is simply dropped.
        assert!(handle.ready.await.is_err());
        let outcome = handle.terminated.await.unwrap();
        assert!(matches!(outcome, Some(EngineError::Bind(_))));
    }

    #[tokio::test]
    async fn cancelling_before_any_connection_ends_the_accept_loop_without_error() {
        let port = free_loopback_port().await;
        let cancel = CancellationToken::new();

        let handle = TunnelEngine.open(
            mock_binding(),
            "default".into(),
            "api-xyz".into(),
            port,
            80,
            cancel.clone(),
        );

        handle.ready.await.unwrap();
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle.terminated)
            .await
            .expect("cancellation should end the loop promptly")
            .unwrap();
        assert!(outcome.is_none());
    }
}
