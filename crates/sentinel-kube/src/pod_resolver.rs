use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Pod,
    Service,
};
use kube::api::{
    Api,
    ListParams,
};
use sentinel_commons::{
    ForwardSpec,
    TargetKind,
};
use tracing::debug;

use crate::client::ClusterBinding;
use crate::error::PodResolveError;

const RESOLVE_DEADLINE: Duration = Duration::from_secs(10);

/// Finds the concrete running pod a `ForwardSpec` should tunnel to.
///
/// Pure: holds no state of its own and is called fresh on every supervisor
/// reconnect, which is how pod restarts are tracked — a new pod identity is
/// simply picked up on the next call.
pub struct PodResolver;

impl PodResolver {
    pub async fn resolve(
        &self, binding: &ClusterBinding, spec: &ForwardSpec,
    ) -> Result<String, PodResolveError> {
        let fut = self.resolve_inner(binding, spec);
        match tokio::time::timeout(RESOLVE_DEADLINE, fut).await {
            Ok(result) => result,
            Err(_) => Err(PodResolveError::Timeout(spec.name.clone())),
        }
    }

    async fn resolve_inner(
        &self, binding: &ClusterBinding, spec: &ForwardSpec,
    ) -> Result<String, PodResolveError> {
        let pods: Api<Pod> = Api::namespaced(binding.client.clone(), &spec.namespace);

        match spec.kind {
            TargetKind::Pod => {
                let pod = pods.get(&spec.name).await.map_err(|e| match e {
                    kube::Error::Api(err) if err.code == 404 => {
                        PodResolveError::NotFound(spec.name.clone())
                    }
                    other => PodResolveError::Transport(other.to_string()),
                })?;

                if is_running(&pod) {
                    Ok(spec.name.clone())
                } else {
                    Err(PodResolveError::NotRunning(spec.name.clone()))
                }
            }
            TargetKind::Service => {
                let services: Api<Service> =
                    Api::namespaced(binding.client.clone(), &spec.namespace);

                let service = services.get(&spec.name).await.map_err(|e| match e {
                    kube::Error::Api(err) if err.code == 404 => {
                        PodResolveError::NotFound(spec.name.clone())
                    }
                    other => PodResolveError::Transport(other.to_string()),
                })?;

                let selector = service
                    .spec
                    .and_then(|s| s.selector)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| PodResolveError::NoEndpoints(spec.name.clone()))?;

                let label_selector = selector
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");

                debug!(%label_selector, "listing pods for service selector");

                let list = pods
                    .list(&ListParams::default().labels(&label_selector))
                    .await
                    .map_err(|e| PodResolveError::Transport(e.to_string()))?;

                list.items
                    .into_iter()
                    .find(|pod| is_running(pod))
                    .and_then(|pod| pod.metadata.name)
                    .ok_or_else(|| PodResolveError::NoEndpoints(spec.name.clone()))
            }
        }
    }
}

fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Running")
}
