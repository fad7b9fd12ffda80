//! Periodic refresh of the published snapshot from mDNS discovery.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::alias;
use crate::config::DnsConfig;
use crate::discovery::{self, DiscoveryProvider};
use crate::metrics::{self, Timer};
use crate::normalize::Normalizer;
use crate::state::{DnsState, Snapshot};

/// Runs discovery cycles and publishes their output to [`DnsState`].
pub struct Refresher {
    provider: Arc<dyn DiscoveryProvider>,
    state: DnsState,
    normalizer: Normalizer,
    domain: String,
    discovery_domain: String,
    host_service: String,
    srv_services: Vec<String>,
    alias_prefix: String,
    min_srv_records: usize,
    interval: Duration,
    browse_timeout: Duration,
}

impl Refresher {
    /// Create a refresher for the given configuration.
    pub fn new(config: &DnsConfig, provider: Arc<dyn DiscoveryProvider>, state: DnsState) -> Self {
        let discovery = &config.discovery;
        Self {
            provider,
            state,
            normalizer: Normalizer::new(
                &config.domain,
                &discovery.discovery_domain,
                &discovery.instance_filter,
            ),
            domain: config.domain.clone(),
            discovery_domain: discovery.discovery_domain.clone(),
            host_service: discovery.host_service.clone(),
            srv_services: discovery.srv_services.clone(),
            alias_prefix: discovery.alias_prefix.clone(),
            min_srv_records: discovery.min_srv_records,
            interval: discovery.refresh_interval(),
            browse_timeout: discovery.browse_timeout(),
        }
    }

    /// Run one discovery cycle and publish the result.
    ///
    /// Returns the generation of the published snapshot. The snapshot is
    /// built entirely before publication; a failed service type simply
    /// contributes nothing to it.
    pub async fn refresh_once(&self) -> u64 {
        let timer = Timer::start();

        let mut service_types = vec![self.host_service.clone()];
        for service_type in &self.srv_services {
            if !service_types.contains(service_type) {
                service_types.push(service_type.clone());
            }
        }

        let mut discovered = discovery::discover(
            self.provider.clone(),
            &service_types,
            &self.discovery_domain,
            self.browse_timeout,
        )
        .await;

        let host_instances = discovered.remove(&self.host_service).unwrap_or_default();
        let service_instances: Vec<_> = self
            .srv_services
            .iter()
            .flat_map(|service_type| {
                if *service_type == self.host_service {
                    host_instances.clone()
                } else {
                    discovered.remove(service_type).unwrap_or_default()
                }
            })
            .collect();

        let (hosts, services) = self.normalizer.normalize(&host_instances, &service_instances);
        let services = alias::retain_quorum(services, self.min_srv_records);
        let aliases = alias::synthesize(&services, &hosts, &self.domain, &self.alias_prefix);

        let generation = self.state.publish(Snapshot::new(hosts, services, aliases));

        let elapsed = timer.elapsed();
        metrics::record_refresh(elapsed);
        debug!(
            generation,
            elapsed_ms = elapsed.as_millis() as u64,
            "refresh cycle complete"
        );

        generation
    }

    /// Refresh on a fixed interval until `cancel` fires.
    ///
    /// The first cycle starts immediately. A cycle that runs long delays the
    /// next tick instead of stacking up missed ones.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            host_service = %self.host_service,
            srv_services = ?self.srv_services,
            "refresh loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => break,
            }

            tokio::select! {
                _ = self.refresh_once() => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("refresh loop shutting down");
    }
}
