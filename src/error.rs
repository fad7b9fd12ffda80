//! Error types for mdns-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// mDNS daemon error
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),

    /// A discovery provider failed to browse a service type
    #[error("Discovery failed for {service_type}: {reason}")]
    Discovery {
        /// Service type being browsed.
        service_type: String,
        /// Provider-specific failure description.
        reason: String,
    },

    /// A name could not be turned into a DNS name
    #[error("Invalid DNS name: {0}")]
    InvalidName(String),
}
