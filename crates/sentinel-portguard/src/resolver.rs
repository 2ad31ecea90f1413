use std::time::Duration;

use netstat2::{
    get_sockets_info,
    AddressFamilyFlags,
    ProtocolFlags,
    ProtocolSocketInfo,
};
use sysinfo::{
    Pid,
    System,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::error::PortConflictError;

const EVICTION_POLL_INTERVAL: Duration = Duration::from_millis(200);
const EVICTION_POLL_ATTEMPTS: u32 = 10;

/// Makes sure `port` is free before a tunnel binds it. A previous run of
/// this same program (identified by pid or by its process name matching
/// `program_name`) left holding the port is evicted with `SIGTERM` and
/// waited out; anything else is a fatal conflict the caller must report,
/// not silently steal.
pub async fn ensure_port_available(
    program_name: &str, port: u16,
) -> Result<(), PortConflictError> {
    let Some((pid, process_name)) = find_process_by_port(port) else {
        return Ok(());
    };

    if !is_ours(pid, &process_name, program_name) {
        return Err(PortConflictError::Foreign {
            port,
            pid,
            process_name,
        });
    }

    info!(
        port,
        pid, process_name, "evicting stale instance holding this port"
    );
    terminate(pid)?;

    for attempt in 0..EVICTION_POLL_ATTEMPTS {
        tokio::time::sleep(EVICTION_POLL_INTERVAL).await;
        if find_process_by_port(port).is_none() {
            debug!(port, attempts = attempt + 1, "port freed after eviction");
            return Ok(());
        }
    }

    Err(PortConflictError::EvictionFailed {
        port,
        pid,
        reason: "process did not release the port after SIGTERM".into(),
    })
}

fn is_ours(pid: i32, process_name: &str, program_name: &str) -> bool {
    pid == std::process::id() as i32 || process_name.to_lowercase().contains(program_name)
}

#[cfg(unix)]
fn terminate(pid: i32) -> Result<(), PortConflictError> {
    // SAFETY: `kill` with a signal number and no side effects beyond
    // delivering the signal; failure is reported through `errno`, not UB.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error();
        warn!(pid, error = %errno, "SIGTERM delivery failed");
        return Err(PortConflictError::EvictionFailed {
            port: 0,
            pid,
            reason: errno.to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(_pid: i32) -> Result<(), PortConflictError> {
    Err(PortConflictError::UnsupportedPlatform)
}

fn find_process_by_port(port: u16) -> Option<(i32, String)> {
    if port == 0 {
        return None;
    }

    let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
    let proto_flags = ProtocolFlags::TCP;

    let sockets_info = match get_sockets_info(af_flags, proto_flags) {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "failed to enumerate local sockets");
            return None;
        }
    };

    for socket in sockets_info {
        if let ProtocolSocketInfo::Tcp(tcp_info) = &socket.protocol_socket_info {
            if tcp_info.local_port == port {
                if let Some(&pid) = socket.associated_pids.first() {
                    return Some((pid as i32, process_name_by_pid(pid as i32)));
                }
            }
        }
    }

    None
}

fn process_name_by_pid(pid: i32) -> String {
    let mut system = System::new_all();
    system.refresh_all();

    system
        .process(Pid::from(pid as usize))
        .map(|process| process.name().to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("pid {pid}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn an_unbound_port_is_reported_available() {
        // Port 0 is never a real bound port; `find_process_by_port`
        // short-circuits it, and nothing else listens there.
        assert!(ensure_port_available("sentinel", 0).await.is_ok());
    }

    #[test]
    fn is_ours_matches_on_pid_or_program_name_substring() {
        let my_pid = std::process::id() as i32;
        assert!(is_ours(my_pid, "anything", "sentinel"));
        assert!(is_ours(my_pid + 1, "sentinel-cli", "sentinel"));
        assert!(!is_ours(my_pid + 1, "nginx", "sentinel"));
    }
}
