//! Wall clock and the periodic accrual refresh.
//!
//! The ledger itself never reads the clock; every call gets `now` from here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::DaemonState;

/// Current Unix time in seconds.
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Refresh the reward accumulator every `interval_secs` until shutdown.
///
/// Accrual is also refreshed lazily by every mutating call, so this only
/// keeps queries and the event stream current during quiet periods.
pub async fn run_accrual_ticker(state: Arc<DaemonState>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = now();
                let mut ledger = state.ledger.lock().await;
                match ledger.update_reward_per_share(now) {
                    Ok(emitted) => {
                        debug!(emitted = %emitted, "accrual refreshed");
                        if emitted > 0 {
                            state.event_bus.emit(
                                "RewardAccrued",
                                now,
                                serde_json::json!({ "emitted": emitted.to_string() }),
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "accrual refresh failed"),
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
