//! Daemon wiring: builds the classifier, starts pruners and capture, and
//! reacts to process signals.

use crate::action::ActionDispatcher;
use crate::capture::{self, LinkLayer, PacketObserver};
use crate::checkers::{CheckerChain, DnsblResolver, SystemResolver};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::local;
use crate::state::{run_pruner, EvaluationStateStore, PrunableSet};
use anyhow::Context;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

/// Process-level control events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Stop immediately. In-flight evaluations are dropped.
    Shutdown(&'static str),
    /// Reload requested. Currently only logged.
    Reload,
}

/// The running service: owns the tracking state and the classifier.
pub struct Daemon {
    config: Arc<Config>,
    classifier: Arc<Classifier>,
}

impl Daemon {
    /// Build the daemon with the system DNS resolver.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let resolver = SystemResolver::from_system_conf().context("failed to create DNS resolver")?;
        Ok(Self::with_resolver(config, Arc::new(resolver)))
    }

    pub fn with_resolver(config: Config, resolver: Arc<dyn DnsblResolver>) -> Self {
        let store = Arc::new(EvaluationStateStore::with_ignored(config.parse_ignore()));
        let chain = CheckerChain::from_config(&config.checkers, resolver);
        let dispatcher = ActionDispatcher::from_settings(&config.settings);

        if chain.is_empty() {
            warn!("No checkers enabled, every address will be judged legit");
        }

        info!(
            checkers = chain.len(),
            ignored = config.ignore.len(),
            "Daemon initialized"
        );

        Self {
            config: Arc::new(config),
            classifier: Arc::new(Classifier::new(store, chain, dispatcher)),
        }
    }

    pub fn store(&self) -> &Arc<EvaluationStateStore> {
        self.classifier.store()
    }

    /// Spawn the periodic pruning tasks.
    pub fn spawn_pruners(&self, shutdown: &watch::Receiver<bool>) {
        let settings = &self.config.settings;

        tokio::spawn(run_pruner(
            self.store().clone(),
            PrunableSet::Pending,
            settings.pending_prune_interval(),
            settings.pending_threshold(),
            shutdown.clone(),
        ));

        match settings.completed_ttl() {
            Some(ttl) => {
                tokio::spawn(run_pruner(
                    self.store().clone(),
                    PrunableSet::Completed,
                    settings.completed_prune_interval(),
                    ttl,
                    shutdown.clone(),
                ));
            }
            None => info!("Completed entries never expire"),
        }
    }

    /// Run until a termination signal arrives or the capture fails.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting...");

        let own = local::interface_addresses().context("could not determine own IPs")?;
        self.store().rebuild_local(own);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.spawn_pruners(&shutdown_rx);

        let capture = capture::open(&self.config.settings)?;
        let link = LinkLayer::from_linktype(capture.get_datalink());
        let observer = PacketObserver::new(
            self.classifier.clone(),
            link,
            tokio::runtime::Handle::current(),
        );

        let (done_tx, mut done_rx) = oneshot::channel();
        let capture_shutdown = shutdown_rx.clone();
        std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let result = capture::run(capture, &observer, capture_shutdown);
                let _ = done_tx.send(result);
            })
            .context("failed to spawn capture thread")?;

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        loop {
            let event = tokio::select! {
                _ = sigterm.recv() => ControlEvent::Shutdown("SIGTERM"),
                _ = sigint.recv() => ControlEvent::Shutdown("SIGINT"),
                _ = sighup.recv() => ControlEvent::Reload,
                result = &mut done_rx => {
                    let _ = shutdown_tx.send(true);
                    return match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => {
                            error!(error = %e, "Capture failed");
                            Err(e.into())
                        }
                        Err(_) => Err(anyhow::anyhow!("capture thread exited unexpectedly")),
                    };
                }
            };

            match event {
                ControlEvent::Shutdown(name) => {
                    info!(signal = name, "Terminating...");
                    let _ = shutdown_tx.send(true);
                    return Ok(());
                }
                ControlEvent::Reload => self.on_reload(),
            }
        }
    }

    fn on_reload(&self) {
        info!("Received SIGHUP, reload is not supported yet");
    }
}
