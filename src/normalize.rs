//! Record normalization: filtering and renaming discovered instances into
//! the authoritative domain.
//!
//! ```text
//! master-0.local.   (discovery domain "local.")
//!   → master-0.example.com.   (domain "example.com")
//! ```
//!
//! Only the first IPv4 and the first IPv6 address seen for a hostname during
//! a cycle are kept. Multi-address answers are not supported.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, trace};

use crate::discovery::DiscoveredInstance;

/// A host reachable under the authoritative domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    /// Fully-qualified, lowercase hostname with trailing dot.
    pub hostname: String,
    /// First IPv4 address seen for this host.
    pub ipv4: Option<Ipv4Addr>,
    /// First IPv6 address seen for this host.
    pub ipv6: Option<Ipv6Addr>,
}

/// One member of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Target hostname, already rewritten into the authoritative domain.
    pub hostname: String,
    /// Advertised port.
    pub port: u16,
}

/// hostname -> HostRecord
pub type HostMap = HashMap<String, HostRecord>;

/// service key -> members, in discovery order
pub type ServiceMap = HashMap<String, Vec<ServiceRecord>>;

/// Lowercase `name` and give it exactly one trailing dot.
pub fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.').to_ascii_lowercase())
}

/// Replace the `discovery_domain` suffix of `hostname` with `domain`.
///
/// Returns `None` when `hostname` does not live in `discovery_domain`
/// or has no label left once the suffix is removed.
pub fn rewrite_hostname(hostname: &str, discovery_domain: &str, domain: &str) -> Option<String> {
    let hostname = fqdn(hostname);
    let suffix = format!(".{}", fqdn(discovery_domain));
    let labels = hostname.strip_suffix(&suffix)?;
    if labels.is_empty() {
        return None;
    }
    Some(format!("{}.{}", labels, fqdn(domain)))
}

/// Build the SRV owner name for a service type: `<service-type>.<domain>.`,
/// lowercased like every other published name.
pub fn service_key(service_type: &str, domain: &str) -> String {
    fqdn(&format!("{}.{}", service_type.trim_end_matches('.'), domain))
}

/// Filters and renames discovered instances.
#[derive(Debug, Clone)]
pub struct Normalizer {
    domain: String,
    discovery_domain: String,
    filter: String,
}

impl Normalizer {
    /// Create a normalizer publishing into `domain`.
    pub fn new(domain: &str, discovery_domain: &str, filter: &str) -> Self {
        Self {
            domain: fqdn(domain),
            discovery_domain: fqdn(discovery_domain),
            filter: filter.to_string(),
        }
    }

    /// Whether the instance name passes the substring filter.
    pub fn matches(&self, instance: &DiscoveredInstance) -> bool {
        instance.instance.contains(&self.filter)
    }

    fn rewrite(&self, instance: &DiscoveredInstance) -> Option<String> {
        if !self.matches(instance) {
            trace!(
                instance = %instance.instance,
                filter = %self.filter,
                "ignoring instance not matching filter"
            );
            return None;
        }
        let hostname = rewrite_hostname(&instance.hostname, &self.discovery_domain, &self.domain);
        if hostname.is_none() {
            debug!(
                instance = %instance.instance,
                hostname = %instance.hostname,
                discovery_domain = %self.discovery_domain,
                "ignoring instance outside the discovery domain"
            );
        }
        hostname
    }

    /// Turn host-service instances into a host map.
    pub fn hosts(&self, instances: &[DiscoveredInstance]) -> HostMap {
        let mut hosts = HostMap::new();

        for instance in instances {
            let Some(hostname) = self.rewrite(instance) else {
                continue;
            };
            let record = hosts
                .entry(hostname.clone())
                .or_insert_with(|| HostRecord {
                    hostname,
                    ipv4: None,
                    ipv6: None,
                });
            if record.ipv4.is_none() {
                record.ipv4 = instance.ipv4.first().copied();
            }
            if record.ipv6.is_none() {
                record.ipv6 = instance.ipv6.first().copied();
            }
        }

        hosts
    }

    /// Turn SRV-service instances into a service map.
    ///
    /// A hostname appears at most once per service key.
    pub fn services(&self, instances: &[DiscoveredInstance]) -> ServiceMap {
        let mut services = ServiceMap::new();

        for instance in instances {
            let Some(hostname) = self.rewrite(instance) else {
                continue;
            };
            let members = services
                .entry(service_key(&instance.service_type, &self.domain))
                .or_default();
            if members.iter().any(|m| m.hostname == hostname) {
                trace!(hostname = %hostname, "duplicate service member");
                continue;
            }
            members.push(ServiceRecord {
                hostname,
                port: instance.port,
            });
        }

        services
    }

    /// Normalize one cycle's worth of raw records.
    pub fn normalize(
        &self,
        host_instances: &[DiscoveredInstance],
        service_instances: &[DiscoveredInstance],
    ) -> (HostMap, ServiceMap) {
        (self.hosts(host_instances), self.services(service_instances))
    }
}
