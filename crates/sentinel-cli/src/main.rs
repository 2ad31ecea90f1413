mod cli;
mod logging;
mod operator_view;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use sentinel_commons::{
    load_config,
    ClusterConfig,
    ForwardSpec,
};
use sentinel_core::{
    update_bus,
    HealthProbe,
    TunnelRecord,
    TunnelSupervisor,
};
use sentinel_kube::{
    resolve_cluster,
    ClusterBinding,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
};

const PROGRAM_NAME: &str = "sentinel";

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log.as_deref());

    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal error during startup");
        std::process::exit(1);
    }
}

async fn run(cli: cli::Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    info!(
        clusters = config.clusters.len(),
        forwards = config.forwards.len(),
        "configuration loaded"
    );

    for forward in &config.forwards {
        sentinel_portguard::ensure_port_available(PROGRAM_NAME, forward.local_port).await?;
    }

    let bindings = resolve_clusters(&config.clusters).await?;

    let shutdown = CancellationToken::new();
    let (bus, subscriber) = update_bus();

    let records: Vec<Arc<TunnelRecord>> = config
        .forwards
        .iter()
        .cloned()
        .map(|spec| Arc::new(TunnelRecord::new(spec)))
        .collect();

    let mut supervisor_tasks = Vec::with_capacity(records.len());
    for record in &records {
        let binding = binding_for(&bindings, &record.spec)?;
        let supervisor = TunnelSupervisor::new(
            record.clone(),
            binding,
            config.reconnect_delay,
            bus.clone(),
        );
        let task_shutdown = shutdown.clone();
        supervisor_tasks.push(tokio::spawn(supervisor.run(task_shutdown)));
    }
    drop(bus);

    let probe = HealthProbe::new(config.check_interval, records.clone());
    let probe_shutdown = shutdown.clone();
    let probe_task = tokio::spawn(probe.run(probe_shutdown));

    let view_task = tokio::spawn(operator_view::run(subscriber, records));

    wait_for_signal().await;
    info!("shutdown signal received, stopping all tunnels");
    shutdown.cancel();

    for task in supervisor_tasks {
        let _ = task.await;
    }
    let _ = probe_task.await;
    let _ = view_task.await;

    info!("shutdown complete");
    Ok(())
}

async fn resolve_clusters(
    clusters: &[ClusterConfig],
) -> anyhow::Result<HashMap<String, ClusterBinding>> {
    let mut bindings = HashMap::with_capacity(clusters.len());
    for cluster in clusters {
        let binding = resolve_cluster(cluster).await?;
        bindings.insert(cluster.name.clone(), binding);
    }
    Ok(bindings)
}

fn binding_for(
    bindings: &HashMap<String, ClusterBinding>, spec: &ForwardSpec,
) -> anyhow::Result<ClusterBinding> {
    bindings
        .get(&spec.cluster)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no resolved cluster binding for '{}'", spec.cluster))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{
        signal,
        SignalKind,
    };

    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
