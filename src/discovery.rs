//! Discovery provider abstraction and per-cycle collection.
//!
//! A [`DiscoveryProvider`] browses one service type for a bounded window and
//! streams what it sees into a bounded channel. [`discover`] fans out one task
//! per service type and gathers the results into private per-type buffers;
//! nothing here touches the published [`DnsState`](crate::state::DnsState).

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::DnsError;
use crate::metrics::{self, Timer};

/// Capacity of the channel between a provider and its collector.
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// How long a provider may overrun its browse window before it is abandoned.
const BROWSE_GRACE: Duration = Duration::from_millis(500);

/// A service instance as seen on the network, before any renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInstance {
    /// Instance label, without the service type and domain (e.g., "master-0").
    pub instance: String,
    /// Service type that was browsed (e.g., "_workstation._tcp").
    pub service_type: String,
    /// Advertised hostname (e.g., "master-0.local.").
    pub hostname: String,
    /// Advertised port.
    pub port: u16,
    /// IPv4 addresses in the order the provider reported them.
    pub ipv4: Vec<Ipv4Addr>,
    /// IPv6 addresses in the order the provider reported them.
    pub ipv6: Vec<Ipv6Addr>,
}

/// Source of service instances.
///
/// Implementations send every instance seen within `timeout` into `results`
/// and return once the window is over. Dropping `results` closes the stream.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync + 'static {
    /// Browse `service_type` in `domain` for at most `timeout`.
    async fn browse(
        &self,
        service_type: &str,
        domain: &str,
        results: mpsc::Sender<DiscoveredInstance>,
        timeout: Duration,
    ) -> Result<(), DnsError>;
}

/// Browse a single service type and collect its instances.
///
/// Returns an empty list when the provider fails or overruns its window;
/// the next refresh cycle is the retry.
pub async fn collect(
    provider: &dyn DiscoveryProvider,
    service_type: &str,
    domain: &str,
    timeout: Duration,
) -> Vec<DiscoveredInstance> {
    let timer = Timer::start();
    let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

    let browse = provider.browse(service_type, domain, tx, timeout);
    let drain = async {
        let mut instances = Vec::new();
        while let Some(instance) = rx.recv().await {
            trace!(
                service_type,
                instance = %instance.instance,
                hostname = %instance.hostname,
                port = instance.port,
                ipv4 = ?instance.ipv4,
                ipv6 = ?instance.ipv6,
                "discovered instance"
            );
            instances.push(instance);
        }
        instances
    };

    let outcome = tokio::time::timeout(timeout + BROWSE_GRACE, async {
        tokio::join!(browse, drain)
    })
    .await;

    match outcome {
        Ok((Ok(()), instances)) => {
            debug!(
                service_type,
                count = instances.len(),
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "browse complete"
            );
            metrics::record_discovered(service_type, instances.len());
            instances
        }
        Ok((Err(e), partial)) => {
            warn!(
                service_type,
                discarded = partial.len(),
                "discovery failed: {}",
                e
            );
            metrics::record_discovery_failure(service_type);
            Vec::new()
        }
        Err(_) => {
            warn!(
                service_type,
                timeout_ms = timeout.as_millis() as u64,
                "discovery provider overran its browse window"
            );
            metrics::record_discovery_failure(service_type);
            Vec::new()
        }
    }
}

/// Browse every service type concurrently, one task per type.
///
/// The result always has an entry for each requested type.
pub async fn discover(
    provider: Arc<dyn DiscoveryProvider>,
    service_types: &[String],
    domain: &str,
    timeout: Duration,
) -> HashMap<String, Vec<DiscoveredInstance>> {
    let tasks = service_types.iter().map(|service_type| {
        let provider = provider.clone();
        let service_type = service_type.clone();
        let domain = domain.to_string();
        tokio::spawn(async move {
            let instances = collect(provider.as_ref(), &service_type, &domain, timeout).await;
            (service_type, instances)
        })
    });

    let mut results: HashMap<String, Vec<DiscoveredInstance>> = service_types
        .iter()
        .map(|service_type| (service_type.clone(), Vec::new()))
        .collect();

    for joined in join_all(tasks).await {
        match joined {
            Ok((service_type, instances)) => {
                results
                    .entry(service_type)
                    .or_default()
                    .extend(instances);
            }
            Err(e) => warn!("discovery task panicked: {}", e),
        }
    }

    results
}
