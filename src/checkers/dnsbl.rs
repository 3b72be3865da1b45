//! Generic DNSBL checker.
//!
//! Queries `{d.c.b.a}.{host}` and scores on the last answer octet.

use super::{
    answer_octets, ipv4_only, query_first, reverse_octets, DnsblResolver, ReputationChecker,
    Verdict,
};
use crate::config::DnsblConfig;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// DNSBL checker for zones that encode a score in the answer.
pub struct DnsblChecker {
    config: DnsblConfig,
    name: String,
    resolver: Arc<dyn DnsblResolver>,
}

impl DnsblChecker {
    pub fn new(config: DnsblConfig, resolver: Arc<dyn DnsblResolver>) -> Self {
        let name = format!("Dnsbl {}", config.host);
        Self {
            config,
            name,
            resolver,
        }
    }

    fn is_malicious(&self, score: u8) -> bool {
        u32::from(score) >= self.config.malicious_threshold
    }
}

#[async_trait]
impl ReputationChecker for DnsblChecker {
    async fn evaluate(&self, ip: &IpAddr) -> Verdict {
        let Some(v4) = ipv4_only(ip, self.name()) else {
            return Verdict::Legit;
        };

        let query = format!("{}.{}", reverse_octets(v4), self.config.host);
        let answer = match query_first(self.resolver.as_ref(), &query).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(checker = self.name(), ip = %ip, error = %e, "Received no result");
                return Verdict::Legit;
            }
        };

        let Some([_, _, _, score]) = answer_octets(answer) else {
            warn!(checker = self.name(), ip = %ip, answer = %answer, "Invalid return value");
            return Verdict::Legit;
        };

        let malicious = self.is_malicious(score);
        let verdict = if malicious { "malicious" } else { "legit" };
        info!(
            checker = self.name(),
            ip = %ip,
            score,
            threshold = self.config.malicious_threshold,
            verdict,
            answer = %answer,
            "DNSBL verdict"
        );

        if malicious {
            Verdict::malicious(self.name())
        } else {
            Verdict::Legit
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
