//! Error types.
//!
//! Only [`ConfigError`] and [`CaptureError`] are fatal, and only at startup.
//! Everything that can go wrong while classifying a single address is
//! absorbed where it happens and resolved toward allowing the address.

use std::process::ExitStatus;
use thiserror::Error;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Failure to open the capture device or apply the capture filter.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device '{interface}': {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to apply capture filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to read from capture device: {0}")]
    Read(#[source] pcap::Error),

    #[error("failed to enumerate interface addresses: {0}")]
    Interfaces(#[source] pcap::Error),
}

/// DNSBL lookup failure. Callers treat every variant as "not listed".
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("resolution of {name} failed: {reason}")]
    Resolve { name: String, reason: String },

    #[error("no A record for {0}")]
    Empty(String),
}

/// Failure to run a verdict command.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("command template rendered to an empty command")]
    EmptyCommand,

    #[error("could not execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    ExitStatus { command: String, status: ExitStatus },
}
