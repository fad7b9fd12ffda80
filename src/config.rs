//! Configuration types for mdns-dns.

use hickory_proto::rr::Name;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::DnsError;

/// Prefix of environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "MDNS_DNS";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Environment overrides, e.g. `MDNS_DNS__DNS__DISCOVERY__MIN_SRV_RECORDS=1`.
    ///
    /// `MDNS_DNS__DNS__DISCOVERY__SRV_SERVICES` is a comma-separated list
    /// without spaces.
    pub fn environment() -> ::config::Environment {
        ::config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("dns.discovery.srv_services")
    }
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Authoritative domain (e.g., "example.com").
    /// Discovered `.local.` hosts are republished under it.
    pub domain: String,

    /// TTL for A/AAAA records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// mDNS discovery configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// mDNS discovery and refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds between two refresh cycles.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Browse window per service type, in milliseconds.
    #[serde(default = "default_browse_timeout_ms")]
    pub browse_timeout_ms: u64,

    /// Minimum number of members before a service's SRV set is published.
    #[serde(default = "default_min_srv_records")]
    pub min_srv_records: usize,

    /// Only instances whose name contains this string are kept.
    /// Empty matches everything.
    #[serde(default)]
    pub instance_filter: String,

    /// Domain the discovered records live in.
    #[serde(default = "default_discovery_domain")]
    pub discovery_domain: String,

    /// Service type browsed for host (A/AAAA) records.
    #[serde(default = "default_host_service")]
    pub host_service: String,

    /// Service types browsed for SRV membership.
    #[serde(default = "default_srv_services")]
    pub srv_services: Vec<String>,

    /// First label component of synthesized aliases (`<prefix>-<n>.<domain>.`).
    #[serde(default = "default_alias_prefix")]
    pub alias_prefix: String,

    /// Restrict multicast traffic to the interface owning this address.
    #[serde(default)]
    pub bind_address: Option<IpAddr>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "mdns_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            browse_timeout_ms: default_browse_timeout_ms(),
            min_srv_records: default_min_srv_records(),
            instance_filter: String::new(),
            discovery_domain: default_discovery_domain(),
            host_service: default_host_service(),
            srv_services: default_srv_services(),
            alias_prefix: default_alias_prefix(),
            bind_address: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl() -> u32 {
    60
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_browse_timeout_ms() -> u64 {
    1000
}

fn default_min_srv_records() -> usize {
    3
}

fn default_discovery_domain() -> String {
    "local.".to_string()
}

fn default_host_service() -> String {
    "_workstation._tcp".to_string()
}

fn default_srv_services() -> Vec<String> {
    vec!["_etcd-server-ssl._tcp".to_string()]
}

fn default_alias_prefix() -> String {
    "etcd".to_string()
}

impl DnsConfig {
    /// Build a configuration with default discovery settings.
    pub fn new(listen_addr: SocketAddr, domain: impl Into<String>) -> Self {
        Self {
            listen_addr,
            domain: domain.into(),
            ttl: default_ttl(),
            discovery: DiscoveryConfig::default(),
        }
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), DnsError> {
        let domain = self.domain.trim_end_matches('.');
        if domain.is_empty() {
            return Err(DnsError::Config("domain must not be empty".into()));
        }
        Name::from_ascii(domain)
            .map_err(|e| DnsError::Config(format!("invalid domain {:?}: {}", self.domain, e)))?;

        if self.ttl == 0 {
            return Err(DnsError::Config("ttl must be positive".into()));
        }

        self.discovery.validate()
    }
}

impl DiscoveryConfig {
    /// Interval between refresh cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Browse window for one service type.
    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }

    fn validate(&self) -> Result<(), DnsError> {
        if self.refresh_interval_secs == 0 {
            return Err(DnsError::Config("refresh_interval_secs must be positive".into()));
        }
        if self.browse_timeout_ms == 0 {
            return Err(DnsError::Config("browse_timeout_ms must be positive".into()));
        }
        // A browse must finish within one refresh period.
        if self.browse_timeout() >= self.refresh_interval() {
            return Err(DnsError::Config(format!(
                "browse_timeout_ms ({}) must be shorter than refresh_interval_secs ({})",
                self.browse_timeout_ms, self.refresh_interval_secs
            )));
        }

        if self.discovery_domain.trim_end_matches('.').is_empty() {
            return Err(DnsError::Config("discovery_domain must not be empty".into()));
        }

        for service in std::iter::once(&self.host_service).chain(&self.srv_services) {
            if !service.starts_with('_') {
                return Err(DnsError::Config(format!(
                    "service type {:?} must start with '_'",
                    service
                )));
            }
        }

        let prefix_ok = !self.alias_prefix.is_empty()
            && self.alias_prefix.len() <= 60
            && self
                .alias_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !prefix_ok {
            return Err(DnsError::Config(format!(
                "alias_prefix {:?} is not a valid DNS label",
                self.alias_prefix
            )));
        }

        Ok(())
    }
}
