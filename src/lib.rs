//! mdns-dns - An authoritative DNS server that republishes mDNS discoveries.
//!
//! This crate browses multicast DNS for a host service type and a set of
//! member service types, rewrites what it finds from the discovery domain
//! (`.local.`) into a configured authoritative domain, and serves the result
//! over unicast DNS. Service member lists are published as SRV records once a
//! quorum of members is visible, and each member gets a stable
//! `<prefix>-<n>.<domain>.` CNAME.
//!
//! ## Features
//!
//! - A/AAAA records for discovered hosts, renamed into the served domain
//! - SRV records per service type, withheld until a minimum member count is seen
//! - Ordinal CNAME aliases that stay put while the member set is unchanged
//! - Names the snapshot does not know are passed on to the next authority
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           mdns-dns                              │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │ Refresh Loop     │───▶│   DNS State      │                  │
//! │  │ (every interval) │    │   (snapshot)     │                  │
//! │  └──────────────────┘    └────────┬─────────┘                  │
//! │         │                         │ read                        │
//! │         │ browse:                 ▼                             │
//! │         │ - _workstation     ┌──────────────────┐              │
//! │         │ - _etcd-server-ssl │  Hickory DNS     │◀── UDP/TCP   │
//! │         ▼                    │  Server          │    :53       │
//! │  ┌──────────────────┐        └──────────────────┘              │
//! │  │ mDNS provider    │                                          │
//! │  └──────────────────┘                                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! master-0.example.com                     A     → 10.0.0.1
//! etcd-0.example.com                       CNAME → master-0.example.com. (+ A/AAAA)
//! _etcd-server-ssl._tcp.example.com        SRV   → 0 10 2380 master-0.example.com. ...
//! anything else                            → next authority
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use mdns_dns::{DnsConfig, DnsServer, MdnsSdProvider};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig::new("[::]:5353".parse().unwrap(), "example.com");
//!     let provider = Arc::new(MdnsSdProvider::new(None).unwrap());
//!
//!     let cancel = CancellationToken::new();
//!     let server = DnsServer::new(config, provider);
//!     server.run(cancel).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod alias;
pub mod authority;
pub mod config;
pub mod discovery;
pub mod error;
pub mod mdns;
pub mod metrics;
pub mod normalize;
pub mod refresh;
pub mod resolver;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use authority::MdnsAuthority;
pub use config::{Config, DiscoveryConfig, DnsConfig, TelemetryConfig};
pub use discovery::{DiscoveredInstance, DiscoveryProvider};
pub use error::DnsError;
pub use mdns::MdnsSdProvider;
pub use refresh::Refresher;
pub use server::DnsServer;
pub use state::{DnsState, Snapshot};
