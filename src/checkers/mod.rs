//! IP reputation checkers.

pub mod dnsbl;
pub mod honeypot;
pub mod resolver;

use crate::config::CheckerConfig;
use crate::error::LookupError;
use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, info};

pub use dnsbl::DnsblChecker;
pub use honeypot::ProjectHoneyPotChecker;
pub use resolver::{DnsblResolver, SystemResolver};

/// Outcome of evaluating an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not listed, listed below threshold, or the lookup failed.
    Legit,
    /// Listed above threshold by the named checker.
    Malicious { checker: String },
}

impl Verdict {
    pub fn malicious(checker: &str) -> Self {
        Verdict::Malicious {
            checker: checker.to_string(),
        }
    }

    pub fn is_malicious(&self) -> bool {
        matches!(self, Verdict::Malicious { .. })
    }

    /// Name of the checker that matched, if any.
    pub fn checker(&self) -> Option<&str> {
        match self {
            Verdict::Legit => None,
            Verdict::Malicious { checker } => Some(checker),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Legit => write!(f, "legit"),
            Verdict::Malicious { .. } => write!(f, "malicious"),
        }
    }
}

/// A source of reputation verdicts.
#[async_trait]
pub trait ReputationChecker: Send + Sync {
    /// Evaluate an address. Lookup failures resolve to [`Verdict::Legit`].
    async fn evaluate(&self, ip: &IpAddr) -> Verdict;

    /// Checker name for logging and verdict attribution.
    fn name(&self) -> &str;
}

/// Ordered list of checkers. The first malicious verdict wins.
pub struct CheckerChain {
    checkers: Vec<Box<dyn ReputationChecker>>,
}

impl CheckerChain {
    pub fn new(checkers: Vec<Box<dyn ReputationChecker>>) -> Self {
        Self { checkers }
    }

    /// Build the chain from configuration, skipping disabled entries.
    pub fn from_config(configs: &[CheckerConfig], resolver: Arc<dyn DnsblResolver>) -> Self {
        let mut checkers: Vec<Box<dyn ReputationChecker>> = Vec::new();

        for config in configs.iter().filter(|c| c.is_enabled()) {
            let checker: Box<dyn ReputationChecker> = match config {
                CheckerConfig::ProjectHoneyPot(c) => {
                    Box::new(ProjectHoneyPotChecker::new(c.clone(), resolver.clone()))
                }
                CheckerConfig::Dnsbl(c) => Box::new(DnsblChecker::new(c.clone(), resolver.clone())),
            };
            info!(checker = checker.name(), "Checker enabled");
            checkers.push(checker);
        }

        Self { checkers }
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Run the chain, stopping at the first malicious verdict.
    pub async fn evaluate(&self, ip: &IpAddr) -> Verdict {
        for checker in &self.checkers {
            let verdict = checker.evaluate(ip).await;
            if verdict.is_malicious() {
                return verdict;
            }
        }
        Verdict::Legit
    }
}

/// IPv4 form of the address, or `None` for addresses we do not evaluate.
pub(crate) fn ipv4_only(ip: &IpAddr, checker: &str) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => {
            // IPv6 is not supported, consider it legit
            debug!(checker, ip = %ip, "Skipping IPv6 address");
            None
        }
    }
}

/// Octets of an IPv4 address in reverse order, as used in DNSBL query names.
pub fn reverse_octets(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}.{}.{}.{}", d, c, b, a)
}

/// First A record for a DNSBL query name.
pub(crate) async fn query_first(
    resolver: &dyn DnsblResolver,
    name: &str,
) -> Result<Ipv4Addr, LookupError> {
    let answers = resolver.lookup_ipv4(name).await?;
    answers
        .first()
        .copied()
        .ok_or_else(|| LookupError::Empty(name.to_string()))
}

/// Validate a DNSBL answer. Listed answers are in 127.0.0.0/8.
pub(crate) fn answer_octets(answer: Ipv4Addr) -> Option<[u8; 4]> {
    let octets = answer.octets();
    (octets[0] == 127).then_some(octets)
}
