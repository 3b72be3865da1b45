//! Evaluation state tracking.
//!
//! Every address the daemon has seen lives in at most one of three sets:
//!
//! - **local**: this host's own addresses, never evaluated
//! - **pending**: admitted, evaluation in flight
//! - **completed**: evaluated, verdict acted upon
//!
//! Each set has its own lock. When more than one lock is held at once they
//! are always taken in the order pending, then completed.

use ipnet::IpNet;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Where a known address was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Local,
    Pending,
    Completed,
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Membership::Local => write!(f, "local"),
            Membership::Pending => write!(f, "pending"),
            Membership::Completed => write!(f, "completed"),
        }
    }
}

/// Sets that are pruned by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrunableSet {
    Pending,
    Completed,
}

impl fmt::Display for PrunableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrunableSet::Pending => write!(f, "pending"),
            PrunableSet::Completed => write!(f, "completed"),
        }
    }
}

type TrackingSet = HashMap<IpAddr, Instant>;

/// The three tracking sets plus the static ignore list.
#[derive(Default)]
pub struct EvaluationStateStore {
    local: RwLock<TrackingSet>,
    ignored: Vec<IpNet>,
    pending: RwLock<TrackingSet>,
    completed: RwLock<TrackingSet>,
}

impl EvaluationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that also treats the given networks as local.
    pub fn with_ignored(ignored: Vec<IpNet>) -> Self {
        Self {
            ignored,
            ..Self::default()
        }
    }

    /// Report which set, if any, knows this address.
    ///
    /// Sets are consulted in precedence order local, pending, completed.
    /// Each check is consistent on its own; there is no snapshot across sets.
    pub fn membership(&self, ip: &IpAddr) -> Option<Membership> {
        if self.is_local(ip) {
            return Some(Membership::Local);
        }
        if contains(&self.pending, ip) {
            return Some(Membership::Pending);
        }
        if contains(&self.completed, ip) {
            return Some(Membership::Completed);
        }
        None
    }

    pub fn is_known(&self, ip: &IpAddr) -> bool {
        self.membership(ip).is_some()
    }

    fn is_local(&self, ip: &IpAddr) -> bool {
        contains(&self.local, ip) || self.ignored.iter().any(|net| net.contains(ip))
    }

    /// Admit an address for evaluation.
    ///
    /// Check and insert happen under the pending write lock, with completed
    /// read in lock order, so concurrent callers for the same address see
    /// exactly one `true`. Returns `false` if the address was already pending
    /// or completed.
    pub fn admit(&self, ip: IpAddr) -> bool {
        let Ok(mut pending) = self.pending.write() else {
            return false;
        };
        if pending.contains_key(&ip) {
            return false;
        }
        let Ok(completed) = self.completed.read() else {
            return false;
        };
        if completed.contains_key(&ip) {
            return false;
        }
        pending.insert(ip, Instant::now());
        true
    }

    /// Move an address from pending to completed.
    ///
    /// Both locks are held for the whole move, so the address is never in
    /// both sets nor in neither. The address is recorded as completed even if
    /// the pending entry has already been pruned.
    pub fn complete(&self, ip: IpAddr) {
        let Ok(mut pending) = self.pending.write() else {
            return;
        };
        let Ok(mut completed) = self.completed.write() else {
            return;
        };
        pending.remove(&ip);
        completed.insert(ip, Instant::now());
    }

    /// Drop pending entries older than `threshold`. Returns the number removed.
    pub fn prune_pending(&self, threshold: Duration) -> usize {
        prune(&self.pending, threshold)
    }

    /// Drop completed entries older than `threshold`. Returns the number removed.
    pub fn prune_completed(&self, threshold: Duration) -> usize {
        prune(&self.completed, threshold)
    }

    pub fn prune(&self, set: PrunableSet, threshold: Duration) -> usize {
        match set {
            PrunableSet::Pending => self.prune_pending(threshold),
            PrunableSet::Completed => self.prune_completed(threshold),
        }
    }

    /// Replace the local set wholesale.
    pub fn rebuild_local<I>(&self, addresses: I)
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let now = Instant::now();
        let fresh: TrackingSet = addresses.into_iter().map(|ip| (ip, now)).collect();

        if let Ok(mut local) = self.local.write() {
            if !local.is_empty() {
                info!(entries = local.len(), "Clearing local address set");
            }
            *local = fresh;
        }
    }

    pub fn local_len(&self) -> usize {
        len(&self.local)
    }

    pub fn pending_len(&self) -> usize {
        len(&self.pending)
    }

    pub fn completed_len(&self) -> usize {
        len(&self.completed)
    }

    pub fn len(&self, set: PrunableSet) -> usize {
        match set {
            PrunableSet::Pending => self.pending_len(),
            PrunableSet::Completed => self.completed_len(),
        }
    }
}

fn contains(set: &RwLock<TrackingSet>, ip: &IpAddr) -> bool {
    set.read().map(|s| s.contains_key(ip)).unwrap_or(false)
}

fn len(set: &RwLock<TrackingSet>) -> usize {
    set.read().map(|s| s.len()).unwrap_or(0)
}

fn prune(set: &RwLock<TrackingSet>, threshold: Duration) -> usize {
    let Ok(mut set) = set.write() else {
        return 0;
    };
    let before = set.len();
    set.retain(|_, touched| touched.elapsed() <= threshold);
    before - set.len()
}

/// Periodically prune one set until shutdown is signalled.
///
/// The first prune happens one full `interval` after start.
pub async fn run_pruner(
    store: std::sync::Arc<EvaluationStateStore>,
    set: PrunableSet,
    interval: Duration,
    threshold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        set = %set,
        interval_secs = interval.as_secs(),
        threshold_secs = threshold.as_secs(),
        "Pruner started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!(set = %set, "Cleaning tracking set");
                let removed = store.prune(set, threshold);
                info!(
                    set = %set,
                    removed,
                    size = store.len(set),
                    "Cleaned tracking set"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(set = %set, "Pruner stopped");
                    return;
                }
            }
        }
    }
}
