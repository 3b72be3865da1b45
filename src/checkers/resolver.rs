//! DNS lookups used by the DNSBL checkers.

use crate::error::LookupError;
use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Resolves a DNSBL query name to its A records.
#[async_trait]
pub trait DnsblResolver: Send + Sync {
    /// Look up the IPv4 addresses for `name`.
    ///
    /// An empty answer is reported as [`LookupError::Empty`].
    async fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, LookupError>;
}

/// Resolver backed by the system DNS configuration.
///
/// No timeout is layered on top of the resolver's own.
pub struct SystemResolver {
    resolver: TokioResolver,
}

impl SystemResolver {
    /// Build a resolver from `/etc/resolv.conf` (or platform equivalent).
    pub fn from_system_conf() -> Result<Self, LookupError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| LookupError::Resolve {
                name: "system resolver".to_string(),
                reason: e.to_string(),
            })?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsblResolver for SystemResolver {
    async fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        debug!(name, "DNSBL query");

        let lookup = self
            .resolver
            .lookup_ip(name)
            .await
            .map_err(|e| LookupError::Resolve {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let addresses: Vec<Ipv4Addr> = lookup
            .iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        if addresses.is_empty() {
            return Err(LookupError::Empty(name.to_string()));
        }
        Ok(addresses)
    }
}
