//! Per-address classification.

use crate::action::{ActionDispatcher, Dispatch};
use crate::checkers::{CheckerChain, Verdict};
use crate::state::{EvaluationStateStore, Membership};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Terminal state of one classification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Already known; nothing was done.
    Skipped(Membership),
    /// Lost the admission race to a concurrent task.
    NotAdmitted,
    /// Evaluated, recorded as completed and acted upon.
    Evaluated { verdict: Verdict, dispatch: Dispatch },
}

/// Drives an address through check, admit, evaluate, complete and act.
pub struct Classifier {
    store: Arc<EvaluationStateStore>,
    chain: CheckerChain,
    dispatcher: ActionDispatcher,
}

impl Classifier {
    pub fn new(
        store: Arc<EvaluationStateStore>,
        chain: CheckerChain,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            store,
            chain,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<EvaluationStateStore> {
        &self.store
    }

    /// Classify one address. No step is retried.
    pub async fn classify(&self, ip: IpAddr) -> Outcome {
        if let Some(membership) = self.store.membership(&ip) {
            debug!(ip = %ip, set = %membership, "Address already known, skipping");
            return Outcome::Skipped(membership);
        }

        if !self.store.admit(ip) {
            debug!(ip = %ip, "Address admitted by another task, skipping");
            return Outcome::NotAdmitted;
        }

        let verdict = self.chain.evaluate(&ip).await;
        self.store.complete(ip);

        match verdict.checker() {
            Some(checker) => info!(ip = %ip, verdict = %verdict, dnsbl = checker, "Evaluated IP"),
            None => info!(ip = %ip, verdict = %verdict, "Evaluated IP"),
        }

        let dispatch = self.dispatcher.dispatch(&ip, &verdict).await;
        Outcome::Evaluated { verdict, dispatch }
    }

    /// Classify an address on its own task and return immediately.
    pub fn trigger(self: &Arc<Self>, ip: IpAddr) -> JoinHandle<Outcome> {
        let classifier = Arc::clone(self);
        tokio::spawn(async move { classifier.classify(ip).await })
    }

    /// Like [`Classifier::trigger`], for callers outside the runtime.
    pub fn trigger_on(self: &Arc<Self>, runtime: &tokio::runtime::Handle, ip: IpAddr) {
        let classifier = Arc::clone(self);
        runtime.spawn(async move { classifier.classify(ip).await });
    }
}
