//! Periodic re-validation of the stored session.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::session::{AuthState, SessionManager};

/// What a single liveness check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Authenticated,
    /// Server said the session is gone; the session was logged out.
    LoggedOut,
    /// Transport or server failure; the session is left alone.
    Failed,
    /// The session changed while the check was in flight; result ignored.
    Stale,
}

/// Background task that checks `/auth-status` while a session is logged in.
///
/// The first check runs as soon as a login is observed. The timer stops on
/// logout and starts over on the next login.
pub struct LivenessMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub fn spawn(session: Arc<SessionManager>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(session, interval, cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(session: Arc<SessionManager>, interval: Duration, cancel: CancellationToken) {
    let mut states = session.subscribe();

    'sessions: loop {
        if !wait_for_login(&mut states, &cancel).await {
            return;
        }

        let epoch = session.epoch();
        debug!("Liveness checks started (every {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = states.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if is_superseded(&session, epoch) {
                        debug!("Liveness checks stopped");
                        continue 'sessions;
                    }
                }
                _ = ticker.tick() => {
                    // an in-flight check is dropped as soon as the session changes
                    let check = check_once(&session, epoch);
                    tokio::pin!(check);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = &mut check => break,
                            changed = states.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                if is_superseded(&session, epoch) {
                                    debug!("Liveness check abandoned");
                                    continue 'sessions;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn is_superseded(session: &SessionManager, epoch: u64) -> bool {
    session.epoch() != epoch || !session.is_logged_in()
}

/// Returns false when the monitor should exit.
async fn wait_for_login(
    states: &mut watch::Receiver<AuthState>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        if matches!(*states.borrow_and_update(), AuthState::LoggedIn(_)) {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = states.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Run one check on behalf of the session that was current at `epoch`.
pub async fn check_once(session: &SessionManager, epoch: u64) -> CheckOutcome {
    let result = session.check_auth_status().await;

    // logout (or a fresh login) won the race
    if is_superseded(session, epoch) {
        debug!("Discarding stale liveness result");
        return CheckOutcome::Stale;
    }

    match result {
        Ok(status) if status.is_authenticated => CheckOutcome::Authenticated,
        Ok(status) => {
            info!(
                "Session no longer valid ({}), logging out",
                status.message.as_deref().unwrap_or("not authenticated")
            );
            session.logout();
            CheckOutcome::LoggedOut
        }
        Err(e) => {
            warn!("Liveness check failed: {}", e);
            CheckOutcome::Failed
        }
    }
}
