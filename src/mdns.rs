//! Multicast DNS discovery provider built on `mdns-sd`.

use async_trait::async_trait;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::discovery::{DiscoveredInstance, DiscoveryProvider};
use crate::error::DnsError;
use crate::normalize::fqdn;

/// Browses service types with a shared mDNS daemon.
pub struct MdnsSdProvider {
    daemon: ServiceDaemon,
}

impl MdnsSdProvider {
    /// Start the mDNS daemon.
    ///
    /// With `bind_address` set, multicast traffic is limited to the
    /// interface owning that address.
    pub fn new(bind_address: Option<IpAddr>) -> Result<Self, DnsError> {
        let daemon = ServiceDaemon::new()?;

        if let Some(addr) = bind_address {
            daemon.disable_interface(IfKind::All)?;
            daemon.enable_interface(IfKind::Addr(addr))?;
            info!(bind_address = %addr, "mDNS restricted to interface");
        }

        Ok(Self { daemon })
    }

    /// Stop the mDNS daemon.
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.shutdown() {
            warn!("failed to shut down mDNS daemon: {}", e);
        }
    }
}

/// Instance label of a resolved service: its full name without the
/// `.<type>.<domain>.` suffix.
fn instance_name(info: &ServiceInfo) -> &str {
    let fullname = info.get_fullname();
    fullname
        .strip_suffix(info.get_type())
        .and_then(|name| name.strip_suffix('.'))
        .filter(|name| !name.is_empty())
        .unwrap_or(fullname)
}

/// Convert a resolved service into a discovered instance.
///
/// Addresses come out of the daemon as a set; they are sorted so the
/// "first address" of a host is stable from one cycle to the next.
fn convert_service_info(service_type: &str, info: &ServiceInfo) -> DiscoveredInstance {
    let mut ipv4: Vec<Ipv4Addr> = Vec::new();
    let mut ipv6: Vec<Ipv6Addr> = Vec::new();
    for addr in info.get_addresses() {
        match addr {
            IpAddr::V4(v4) => ipv4.push(*v4),
            IpAddr::V6(v6) => ipv6.push(*v6),
        }
    }
    ipv4.sort();
    ipv6.sort();

    DiscoveredInstance {
        instance: instance_name(info).to_string(),
        service_type: service_type.to_string(),
        hostname: info.get_hostname().to_string(),
        port: info.get_port(),
        ipv4,
        ipv6,
    }
}

#[async_trait]
impl DiscoveryProvider for MdnsSdProvider {
    async fn browse(
        &self,
        service_type: &str,
        domain: &str,
        results: mpsc::Sender<DiscoveredInstance>,
        timeout: Duration,
    ) -> Result<(), DnsError> {
        let ty_domain = format!("{}.{}", service_type.trim_end_matches('.'), fqdn(domain));
        let receiver = self.daemon.browse(&ty_domain)?;
        let deadline = Instant::now() + timeout;

        debug!(service = %ty_domain, timeout_ms = timeout.as_millis() as u64, "browse started");

        let outcome = loop {
            let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                Ok(Err(_)) => {
                    break Err(DnsError::Discovery {
                        service_type: service_type.to_string(),
                        reason: "mDNS daemon closed the browse channel".to_string(),
                    })
                }
                Err(_) => break Ok(()),
            };

            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let instance = convert_service_info(service_type, &info);
                    if results.send(instance).await.is_err() {
                        // Collector gave up on this cycle.
                        break Ok(());
                    }
                }
                other => trace!(service = %ty_domain, event = ?other, "ignoring mDNS event"),
            }
        };

        if let Err(e) = self.daemon.stop_browse(&ty_domain) {
            debug!(service = %ty_domain, "stop_browse failed: {}", e);
        }

        outcome
    }
}
