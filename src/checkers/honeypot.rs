//! Project Honey Pot http:BL checker.
//!
//! Queries `{key}.{d.c.b.a}.dnsbl.httpbl.org`. A listed address answers
//! `127.{days since last activity}.{threat score}.{visitor type}`.

use super::{
    answer_octets, ipv4_only, query_first, reverse_octets, DnsblResolver, ReputationChecker,
    Verdict,
};
use crate::config::ProjectHoneyPotConfig;
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const HTTPBL_ZONE: &str = "dnsbl.httpbl.org";

/// Visitor type bitmask from the last answer octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorType(u8);

impl VisitorType {
    pub const SEARCH_ENGINE: u8 = 0;
    pub const SUSPICIOUS: u8 = 1;
    pub const HARVESTER: u8 = 2;
    pub const COMMENT_SPAMMER: u8 = 4;
}

impl fmt::Display for VisitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == Self::SEARCH_ENGINE {
            return write!(f, "search engine");
        }
        let mut kinds = Vec::new();
        if self.0 & Self::SUSPICIOUS != 0 {
            kinds.push("suspicious");
        }
        if self.0 & Self::HARVESTER != 0 {
            kinds.push("harvester");
        }
        if self.0 & Self::COMMENT_SPAMMER != 0 {
            kinds.push("comment spammer");
        }
        if kinds.is_empty() {
            return write!(f, "unknown ({})", self.0);
        }
        write!(f, "{}", kinds.join(", "))
    }
}

/// Scored http:BL answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    /// Days since last activity, clamped to at least 1.
    pub stale_days: u32,
    pub threat_score: u32,
    pub score: u32,
    pub stale: bool,
    pub malicious: bool,
}

/// Score an http:BL answer against the configured limits.
///
/// `score = floor(stale_period / stale_days) * threat_score`. Listings older
/// than the stale period are never malicious. A stale day count of zero is
/// treated as one.
pub fn assess(
    stale_period_days: u32,
    max_score: u32,
    observed_stale_days: u8,
    observed_threat_score: u8,
) -> Assessment {
    let stale_days = u32::from(observed_stale_days).max(1);
    let threat_score = u32::from(observed_threat_score);
    let score = (stale_period_days / stale_days).saturating_mul(threat_score);
    let stale = stale_days > stale_period_days;

    Assessment {
        stale_days,
        threat_score,
        score,
        stale,
        malicious: !stale && score > max_score,
    }
}

/// Project Honey Pot checker.
pub struct ProjectHoneyPotChecker {
    config: ProjectHoneyPotConfig,
    resolver: Arc<dyn DnsblResolver>,
}

impl ProjectHoneyPotChecker {
    pub fn new(config: ProjectHoneyPotConfig, resolver: Arc<dyn DnsblResolver>) -> Self {
        Self { config, resolver }
    }

    fn query_name(&self, reversed: &str) -> String {
        format!("{}.{}.{}", self.config.api_key, reversed, HTTPBL_ZONE)
    }
}

#[async_trait]
impl ReputationChecker for ProjectHoneyPotChecker {
    async fn evaluate(&self, ip: &IpAddr) -> Verdict {
        let Some(v4) = ipv4_only(ip, self.name()) else {
            return Verdict::Legit;
        };

        let name = self.query_name(&reverse_octets(v4));
        let answer = match query_first(self.resolver.as_ref(), &name).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(checker = self.name(), ip = %ip, error = %e, "Received no result from httpbl.org");
                return Verdict::Legit;
            }
        };

        let Some([_, stale_days, threat_score, visitor]) = answer_octets(answer) else {
            warn!(checker = self.name(), ip = %ip, answer = %answer, "Invalid return value from httpbl.org");
            return Verdict::Legit;
        };

        let assessment = assess(
            self.config.stale_period_days,
            self.config.max_score,
            stale_days,
            threat_score,
        );
        let verdict = if assessment.stale {
            "stale"
        } else if assessment.malicious {
            "malicious"
        } else {
            "legit"
        };

        info!(
            checker = self.name(),
            ip = %ip,
            score = assessment.score,
            threshold = self.config.max_score,
            stale_days = assessment.stale_days,
            stale_threshold = self.config.stale_period_days,
            visitor_type = %VisitorType(visitor),
            verdict,
            answer = %answer,
            "DNSBL verdict"
        );

        if assessment.malicious {
            Verdict::malicious(self.name())
        } else {
            Verdict::Legit
        }
    }

    fn name(&self) -> &str {
        "projectHoneyPot"
    }
}
