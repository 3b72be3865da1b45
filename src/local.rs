//! Addresses assigned to this host.

use crate::error::CaptureError;
use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::info;

/// Addresses of every local interface known to libpcap, both families.
pub fn interface_addresses() -> Result<Vec<IpAddr>, CaptureError> {
    let devices = pcap::Device::list().map_err(CaptureError::Interfaces)?;

    let addresses = unique(
        devices
            .iter()
            .flat_map(|device| device.addresses.iter().map(|a| a.addr)),
    );

    for ip in &addresses {
        info!(ip = %ip, "Added address to local set");
    }

    Ok(addresses)
}

fn unique<I>(addresses: I) -> Vec<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addresses
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_keeps_both_families() {
        let input: Vec<IpAddr> = ["10.0.0.1", "fe80::1", "127.0.0.1", "10.0.0.1", "fe80::1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        let addresses = unique(input);
        assert_eq!(
            addresses,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "127.0.0.1".parse::<IpAddr>().unwrap(),
                "fe80::1".parse::<IpAddr>().unwrap(),
            ]
        );
    }
}
