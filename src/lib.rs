//! Riversist: monitor network traffic and firewall hosts based on DNSBLs.
//!
//! Every source and destination address seen on the capture interface is
//! looked up once against a chain of DNS blackhole lists. Depending on the
//! verdict an external command is run, typically adding the address to a
//! firewall table.
//!
//! # Features
//!
//! - **Project Honey Pot** - http:BL lookups scored on threat level and age
//! - **Generic DNSBLs** - any zone encoding a score in the answer's last octet
//! - **Deduplication** - each address is evaluated at most once until its
//!   verdict expires
//! - **Fail-Open** - lookup failures and odd answers count as legit
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   interface: eth0
//!   capture_filter: "tcp and ip"
//!   malicious_ip_cmd: "/sbin/pfctl -t malicious -T add {ip}"
//!
//! checkers:
//!   - type: project_honeypot
//!     api_key: "${HTTPBL_API_KEY}"
//!   - type: dnsbl
//!     host: dnsbl.example.org
//!     malicious_threshold: 10
//! ```

pub mod action;
pub mod capture;
pub mod checkers;
pub mod classifier;
pub mod config;
pub mod daemon;
pub mod error;
pub mod local;
pub mod state;

pub use classifier::Classifier;
pub use config::Config;
pub use daemon::Daemon;
