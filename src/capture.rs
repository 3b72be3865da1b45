//! Packet capture and address extraction.
//!
//! The capture loop is blocking and runs on its own thread. It never waits on
//! classification: every extracted address is handed to the runtime as a
//! separate task.

use crate::classifier::Classifier;
use crate::config::Settings;
use crate::error::CaptureError;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Active, Capture};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Read timeout so the loop can notice shutdown on a quiet interface.
const READ_TIMEOUT_MS: i32 = 500;

/// Link-layer framing of captured packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Packets start directly with the IP header.
    RawIp,
    /// Linux cooked capture, used by the `any` device.
    LinuxSll,
    /// BSD loopback: a 4-byte address family header, then IP.
    Loopback,
}

/// Length of the address family header on BSD loopback captures.
const LOOPBACK_HEADER_LEN: usize = 4;

impl LinkLayer {
    /// Map a pcap data link type. Unknown types are decoded as Ethernet.
    pub fn from_linktype(linktype: pcap::Linktype) -> Self {
        match linktype.0 {
            // DLT_RAW (BSD and Linux values), LINKTYPE_RAW, LINKTYPE_IPV4, LINKTYPE_IPV6
            12 | 14 | 101 | 228 | 229 => LinkLayer::RawIp,
            1 => LinkLayer::Ethernet,
            // DLT_NULL, DLT_LOOP
            0 | 108 => LinkLayer::Loopback,
            113 => LinkLayer::LinuxSll,
            other => {
                warn!(linktype = other, "Unsupported link type, decoding as Ethernet");
                LinkLayer::Ethernet
            }
        }
    }
}

/// Source and destination of a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// Decode a packet and extract its network-layer endpoints.
///
/// Returns `None` when the packet has no IP layer.
pub fn extract_endpoints(link: LinkLayer, data: &[u8]) -> Option<Endpoints> {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data),
        LinkLayer::RawIp => SlicedPacket::from_ip(data),
        LinkLayer::LinuxSll => SlicedPacket::from_linux_sll(data),
        LinkLayer::Loopback => SlicedPacket::from_ip(data.get(LOOPBACK_HEADER_LEN..)?),
    };
    let sliced = match sliced {
        Ok(sliced) => sliced,
        Err(e) => {
            debug!(error = %e, "Failed to decode packet");
            return None;
        }
    };

    let (src, dst) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
            )
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
            )
        }
        _ => return None,
    };

    let (src_port, dst_port) = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => (Some(tcp.source_port()), Some(tcp.destination_port())),
        Some(TransportSlice::Udp(udp)) => (Some(udp.source_port()), Some(udp.destination_port())),
        _ => (None, None),
    };

    Some(Endpoints {
        src,
        dst,
        src_port,
        dst_port,
    })
}

/// Hands addresses from captured packets to the classifier.
pub struct PacketObserver {
    classifier: Arc<Classifier>,
    link: LinkLayer,
    runtime: Handle,
}

impl PacketObserver {
    pub fn new(classifier: Arc<Classifier>, link: LinkLayer, runtime: Handle) -> Self {
        Self {
            classifier,
            link,
            runtime,
        }
    }

    /// Process one captured packet. Returns whether it had an IP layer.
    pub fn observe(&self, data: &[u8]) -> bool {
        let Some(endpoints) = extract_endpoints(self.link, data) else {
            warn!(len = data.len(), "No net layer in packet found");
            return false;
        };

        debug!(
            src = %endpoints.src,
            src_port = ?endpoints.src_port,
            dst = %endpoints.dst,
            dst_port = ?endpoints.dst_port,
            "Received packet"
        );

        self.classifier.trigger_on(&self.runtime, endpoints.src);
        self.classifier.trigger_on(&self.runtime, endpoints.dst);
        true
    }
}

/// Open the capture device and apply the filter.
pub fn open(settings: &Settings) -> Result<Capture<Active>, CaptureError> {
    let open_err = |source| CaptureError::Open {
        interface: settings.interface.clone(),
        source,
    };

    let mut capture = Capture::from_device(settings.interface.as_str())
        .map_err(open_err)?
        .promisc(settings.promiscuous)
        .snaplen(settings.snaplen)
        .timeout(READ_TIMEOUT_MS)
        .open()
        .map_err(open_err)?;

    if !settings.capture_filter.trim().is_empty() {
        capture
            .filter(&settings.capture_filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: settings.capture_filter.clone(),
                source,
            })?;
    }

    info!(
        interface = %settings.interface,
        filter = %settings.capture_filter,
        "Capture started"
    );

    Ok(capture)
}

/// Read packets until shutdown is signalled or the capture fails.
pub fn run(
    mut capture: Capture<Active>,
    observer: &PacketObserver,
    shutdown: watch::Receiver<bool>,
) -> Result<(), CaptureError> {
    loop {
        if *shutdown.borrow() {
            debug!("Capture loop stopped");
            return Ok(());
        }

        match capture.next_packet() {
            Ok(packet) => {
                observer.observe(packet.data);
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => return Err(CaptureError::Read(e)),
        }
    }
}
