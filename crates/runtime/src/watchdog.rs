//! Wall-clock watchdog for a player's program.
//!
//! Armed whenever control passes into player code (at entry-point invocation,
//! and again at every action-start call, since a player can loop forever
//! between actions without ever yielding through the bridge). Cleared when
//! control returns to the orchestrator. A fired watchdog is a forfeit, not
//! a retry: the offending tank is killed and the match continues without it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Canonical per-invocation timeout: a player's entry-point call, or any
/// single action-start call within it, must return within this long.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A resettable deadline timer. `arm`/`disarm` are called from the player's
/// execution thread as it enters and leaves player code; `wait_for_timeout`
/// runs on a tokio task and resolves only if the deadline is reached without
/// an intervening `disarm`.
pub struct Watchdog {
    timeout: Duration,
    state: Arc<WatchdogState>,
}

struct WatchdogState {
    notify: Notify,
    deadline: std::sync::Mutex<Option<Instant>>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Arc::new(WatchdogState {
                notify: Notify::new(),
                deadline: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn with_default_timeout() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// (Re-)arms the deadline `self.timeout` from now. Safe to call
    /// repeatedly; each call pushes the deadline back out.
    pub fn arm(&self) {
        let mut deadline = self.state.deadline.lock().expect("watchdog mutex poisoned");
        *deadline = Some(Instant::now() + self.timeout);
        drop(deadline);
        self.state.notify.notify_one();
    }

    /// Clears the deadline. Call when control returns to the orchestrator.
    pub fn disarm(&self) {
        let mut deadline = self.state.deadline.lock().expect("watchdog mutex poisoned");
        *deadline = None;
        drop(deadline);
        self.state.notify.notify_one();
    }

    /// Spawns a task that resolves once the watchdog fires (the armed
    /// deadline elapses without being re-armed or disarmed in the meantime).
    /// The task runs until the returned handle is dropped/aborted; callers
    /// should abort it once the player's invocation completes normally.
    pub fn spawn_timeout_task(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                let deadline = *state.deadline.lock().expect("watchdog mutex poisoned");
                match deadline {
                    None => state.notify.notified().await,
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                let still_armed = *state.deadline.lock().expect("watchdog mutex poisoned") == Some(deadline);
                                if still_armed {
                                    return;
                                }
                            }
                            _ = state.notify.notified() => {}
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_when_never_disarmed() {
        let watchdog = Watchdog::new(Duration::from_millis(50));
        watchdog.arm();
        let handle = watchdog.spawn_timeout_task();
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("watchdog task should have completed")
            .expect("watchdog task should not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_fire_while_repeatedly_armed() {
        let watchdog = Watchdog::new(Duration::from_millis(50));
        watchdog.arm();
        let handle = watchdog.spawn_timeout_task();
        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(30)).await;
            watchdog.arm();
        }
        handle.abort();
        let result = handle.await;
        assert!(result.is_err_and(|e| e.is_cancelled()));
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_cancels_a_pending_deadline() {
        let watchdog = Watchdog::new(Duration::from_millis(50));
        watchdog.arm();
        let handle = watchdog.spawn_timeout_task();
        tokio::time::advance(Duration::from_millis(10)).await;
        watchdog.disarm();
        tokio::time::advance(Duration::from_millis(100)).await;
        handle.abort();
        let result = handle.await;
        assert!(result.is_err_and(|e| e.is_cancelled()));
    }
}
