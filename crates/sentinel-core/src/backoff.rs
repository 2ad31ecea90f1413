use std::time::Duration;

/// Computes the wait before the next reconnect attempt.
///
/// `retry_count` is the count *after* bumping on entry into `Reconnecting`
/// (so the first ever failure passes `1`). The first wait is always
/// `reconnect_delay`; every subsequent wait doubles, capped at 60s.
///
/// This realizes the backoff law in the testable-properties section: for a
/// run of `k` consecutive failures with no intervening `Active`, the k-th
/// wait is `reconnect_delay` when `k == 1`, else `min(2^(k-1)s, 60s)`.
pub fn backoff(retry_count: u32, reconnect_delay: Duration) -> Duration {
    if retry_count <= 1 {
        return reconnect_delay;
    }

    // Cap the exponent before shifting so an unbounded retry count (retries
    // are never given up on) can never overflow the shift.
    let exponent = (retry_count - 1).min(6);
    let secs = 1u64 << exponent;
    Duration::from_secs(secs.min(60))
}
