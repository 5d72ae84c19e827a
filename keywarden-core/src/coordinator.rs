//! Single-flight coordination of credential renewals.
//!
//! A [`RefreshCoordinator`] is either idle or running exactly one renewal. The
//! first caller that needs a renewal becomes the leader and its renewal future is
//! spawned onto the runtime; callers arriving while it runs are queued as waiters.
//! When the renewal finishes, the same result is sent to every queued caller in
//! arrival order and the coordinator returns to idle.
//!
//! Each flight is tagged with the scope it requests. A caller asking for another
//! scope still waits for the running flight, but is then told to re-read the store
//! instead of receiving a result it did not ask for.
//!
//! Because the renewal runs on its own task, dropping a caller's future only
//! abandons that caller's wait; the renewal and the remaining waiters are unaffected.

use std::future::Future;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::credentials::{Credentials, ScopeSet};
use crate::error::{CredentialsManagerError, ErrorCode};

/// Outcome shared by every caller of one renewal.
pub type RenewalResult = Result<Credentials, CredentialsManagerError>;

/// The renewal task stopped before producing a result (it panicked or the runtime shut down).
#[derive(Debug, Error)]
#[error("renewal task ended before producing a result")]
pub struct RenewalAborted;

enum FlightState {
    Idle,
    Refreshing {
        scope: Option<ScopeSet>,
        waiters: Vec<oneshot::Sender<RenewalResult>>,
    },
}

struct Shared {
    state: FlightState,
    /// Number of renewals completed so far.
    epoch: u64,
}

/// What a caller got from [`RefreshCoordinator::join`].
#[derive(Debug)]
pub enum Flight {
    /// A renewal ran (led by this caller or another) and produced this result.
    Completed(RenewalResult),
    /// A renewal finished after the caller took its epoch snapshot, or the renewal
    /// the caller waited for requested a different scope; the caller must re-read
    /// the store before deciding to renew.
    Stale,
}

/// Ensures at most one renewal is in flight per manager.
pub struct RefreshCoordinator {
    shared: Arc<Mutex<Shared>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: FlightState::Idle,
                epoch: 0,
            })),
        }
    }

    /// Number of completed renewals.
    ///
    /// Take this snapshot *before* loading the record that is about to be evaluated
    /// and pass it to [`join`](Self::join).
    pub fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }

    /// Whether a renewal is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.shared.lock().state, FlightState::Refreshing { .. })
    }

    /// Join the in-flight renewal, or lead a new one running `renewal`.
    ///
    /// `observed_epoch` is the [`epoch`](Self::epoch) seen before the caller loaded its
    /// record. If the coordinator is idle but a renewal completed since then, the
    /// record the caller evaluated is outdated: [`Flight::Stale`] is returned and
    /// `renewal` is dropped without running.
    ///
    /// `scope` is the scope `renewal` requests. Only callers requesting the same
    /// scope share a result; others wait for the running flight to finish and then
    /// get [`Flight::Stale`].
    pub async fn join<F>(
        &self,
        observed_epoch: u64,
        scope: Option<&ScopeSet>,
        renewal: F,
    ) -> Flight
    where
        F: Future<Output = RenewalResult> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let (leader, shares_result) = {
            let mut guard = self.shared.lock();
            let shared = &mut *guard;
            match shared.state {
                FlightState::Refreshing {
                    scope: ref running,
                    ref mut waiters,
                } => {
                    waiters.push(tx);
                    let same_scope = running.as_ref() == scope;
                    tracing::debug!(
                        "Renewal already in flight, waiting ({} queued, same scope: {})",
                        waiters.len(),
                        same_scope
                    );
                    (false, same_scope)
                }
                FlightState::Idle => {
                    if shared.epoch != observed_epoch {
                        return Flight::Stale;
                    }
                    shared.state = FlightState::Refreshing {
                        scope: scope.cloned(),
                        waiters: vec![tx],
                    };
                    (true, true)
                }
            }
        };

        if leader {
            let flight = InFlight {
                shared: Some(Arc::clone(&self.shared)),
            };
            tokio::spawn(async move {
                let result = renewal.await;
                flight.complete(result);
            });
        }

        let outcome = rx.await;
        if !shares_result {
            return Flight::Stale;
        }

        match outcome {
            Ok(result) => Flight::Completed(result),
            Err(_) => Flight::Completed(Err(CredentialsManagerError::with_cause(
                ErrorCode::RenewFailed,
                RenewalAborted,
            ))),
        }
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        let waiters = match &shared.state {
            FlightState::Idle => 0,
            FlightState::Refreshing { waiters, .. } => waiters.len(),
        };
        f.debug_struct("RefreshCoordinator")
            .field("epoch", &shared.epoch)
            .field("waiters", &waiters)
            .finish()
    }
}

/// Handle owned by the spawned renewal task; returns the coordinator to idle exactly once.
struct InFlight {
    shared: Option<Arc<Mutex<Shared>>>,
}

impl InFlight {
    fn finish(&mut self) -> Vec<oneshot::Sender<RenewalResult>> {
        let Some(shared) = self.shared.take() else {
            return Vec::new();
        };
        let mut shared = shared.lock();
        shared.epoch = shared.epoch.wrapping_add(1);
        match mem::replace(&mut shared.state, FlightState::Idle) {
            FlightState::Refreshing { waiters, .. } => waiters,
            FlightState::Idle => Vec::new(),
        }
    }

    fn complete(mut self, result: RenewalResult) {
        let waiters = self.finish();
        tracing::debug!("Renewal finished, notifying {} caller(s)", waiters.len());
        for waiter in waiters {
            // A closed receiver means that caller stopped waiting.
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // Reached without `complete` only if the renewal task unwound; dropping the
        // senders wakes every waiter with `RenewalAborted`.
        let waiters = self.finish();
        if !waiters.is_empty() {
            tracing::error!("Renewal task aborted with {} caller(s) waiting", waiters.len());
        }
    }
}
