use std::sync::Arc;
use std::time::Duration;

use sentinel_core::{
    snapshot_all,
    TunnelRecord,
    TunnelState,
    TunnelView,
    UpdateSubscriber,
};

const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Renders every published snapshot as one line on stdout. This is
/// intentionally the whole operator-facing surface: a richer view (TUI,
/// HTTP status endpoint) can subscribe to the same bus instead of this
/// one, but nothing here assumes it is the only consumer.
///
/// The bus is lossy by design, so this also calls `snapshot()` over
/// `records` once at startup and once every 30 s, printing every tunnel's
/// current line regardless of whether an update for it was ever received.
/// That resync is what keeps a dropped update from leaving this view
/// permanently stale.
pub async fn run(mut subscriber: UpdateSubscriber, records: Vec<Arc<TunnelRecord>>) {
    print_snapshot(&records).await;

    let mut resync = tokio::time::interval(RESYNC_INTERVAL);
    resync.tick().await; // first tick fires immediately; already handled above.

    loop {
        tokio::select! {
            update = subscriber.recv() => {
                match update {
                    Some(view) => println!("{}", format_line(&view)),
                    None => return,
                }
            }
            _ = resync.tick() => {
                print_snapshot(&records).await;
            }
        }
    }
}

async fn print_snapshot(records: &[Arc<TunnelRecord>]) {
    for view in snapshot_all(records).await {
        println!("{}", format_line(&view));
    }
}

fn format_line(view: &TunnelView) -> String {
    format!(
        "[{}/{}/{}] {} local_port={} retry={}{}",
        view.cluster,
        view.namespace,
        view.name,
        state_label(view.state),
        view.local_port,
        view.retry_count,
        view.last_error
            .as_deref()
            .map(|e| format!(" last_error=\"{e}\""))
            .unwrap_or_default(),
    )
}

fn state_label(state: TunnelState) -> &'static str {
    match state {
        TunnelState::Starting => "starting",
        TunnelState::Active => "active",
        TunnelState::Reconnecting => "reconnecting",
        TunnelState::Failed => "failed",
        TunnelState::Stopped => "stopped",
    }
}
