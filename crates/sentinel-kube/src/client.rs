use kube::config::{
    KubeConfigOptions,
    Kubeconfig,
};
use kube::{
    Client,
    Config,
};
use sentinel_commons::ClusterConfig;
use tracing::info;

use crate::error::KubeconfigError;

/// The resolved credentials and transport parameters for one cluster,
/// immutable once produced and freely shared by every supervisor and the
/// pod resolver for that cluster.
#[derive(Clone)]
pub struct ClusterBinding {
    pub cluster: String,
    pub client: Client,
}

/// Resolves a `ClusterConfig` into a `ClusterBinding` exactly once per
/// cluster, during initialization.
#[tracing::instrument(skip(cluster), fields(cluster = %cluster.name))]
pub async fn resolve_cluster(cluster: &ClusterConfig) -> Result<ClusterBinding, KubeconfigError> {
    info!(path = %cluster.kubeconfig, "reading kubeconfig");

    let kubeconfig =
        Kubeconfig::read_from(&cluster.kubeconfig).map_err(|source| KubeconfigError::Read {
            path: cluster.kubeconfig.clone(),
            source,
        })?;

    if let Some(context) = &cluster.context {
        if !kubeconfig.contexts.iter().any(|c| &c.name == context) {
            return Err(KubeconfigError::ContextNotFound {
                path: cluster.kubeconfig.clone(),
                context: context.clone(),
            });
        }
    }

    let options = KubeConfigOptions {
        context: cluster.context.clone(),
        ..Default::default()
    };

    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(KubeconfigError::Config)?;

    let client = Client::try_from(config).map_err(KubeconfigError::Client)?;

    Ok(ClusterBinding {
        cluster: cluster.name.clone(),
        client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_kubeconfig_file_is_fatal() {
        let cluster = ClusterConfig {
            name: "c1".into(),
            kubeconfig: "/nonexistent/kubeconfig".into(),
            context: None,
        };

        let err = resolve_cluster(&cluster).await.unwrap_err();
        assert!(matches!(err, KubeconfigError::Read { .. }));
    }

    #[tokio::test]
    async fn unknown_context_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig.yaml");
        std::fs::write(
            &path,
            r#"
apiVersion: v1
kind: Config
clusters:
  - name: test-cluster
    cluster:
      server: https://example.invalid:6443
contexts:
  - name: test-context
    context:
      cluster: test-cluster
      user: test-user
current-context: test-context
users:
  - name: test-user
    user: {}
"#,
        )
        .unwrap();

        let cluster = ClusterConfig {
            name: "c1".into(),
            kubeconfig: path.to_string_lossy().to_string(),
            context: Some("missing-context".into()),
        };

        let err = resolve_cluster(&cluster).await.unwrap_err();
        assert!(matches!(err, KubeconfigError::ContextNotFound { .. }));
    }
}
