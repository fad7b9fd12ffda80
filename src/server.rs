//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::authority::{MdnsAuthority, ServFailAuthority};
use crate::config::DnsConfig;
use crate::discovery::DiscoveryProvider;
use crate::error::DnsError;
use crate::refresh::Refresher;
use crate::state::DnsState;

/// How often readiness is polled while waiting for the first snapshot.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Idle timeout for TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a catalog serving `config.domain` from `state`.
///
/// Queries the mDNS authority declines fall through to a SERVFAIL authority
/// so that every in-zone query gets a reply.
pub fn build_catalog(config: &DnsConfig, state: DnsState) -> Result<Catalog, DnsError> {
    let authority = MdnsAuthority::new(config, state)?;
    let origin = authority.origin().clone();

    let authorities: Vec<Arc<dyn AuthorityObject>> = vec![
        Arc::new(authority),
        Arc::new(ServFailAuthority::new(origin.clone())),
    ];

    let mut catalog = Catalog::new();
    catalog.upsert(origin, authorities);

    Ok(catalog)
}

/// DNS server backed by mDNS discovery.
pub struct DnsServer {
    config: DnsConfig,
    provider: Arc<dyn DiscoveryProvider>,
    state: DnsState,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration and provider.
    pub fn new(config: DnsConfig, provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self {
            config,
            provider,
            state: DnsState::new(),
        }
    }

    /// Get a reference to the DNS state.
    pub fn state(&self) -> &DnsState {
        &self.state
    }

    /// Run the DNS server until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DnsError> {
        self.config.validate()?;

        info!(
            listen_addr = %self.config.listen_addr,
            domain = %self.config.domain,
            min_srv_records = self.config.discovery.min_srv_records,
            "Starting mdns-dns server"
        );

        let refresher = Refresher::new(&self.config, self.provider.clone(), self.state.clone());
        let refresh_cancel = cancel.child_token();
        let refresh_handle = tokio::spawn(refresher.run(refresh_cancel.clone()));

        // Wait for the first snapshot before answering anything
        info!("Waiting for initial discovery cycle...");
        loop {
            if self.state.is_ready() {
                info!(
                    hosts = self.state.hosts_count(),
                    services = self.state.services_count(),
                    aliases = self.state.aliases_count(),
                    "Initial discovery complete"
                );
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested before initial discovery completed");
                    let _ = refresh_handle.await;
                    return Ok(());
                }
                _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
            }
        }

        let catalog = build_catalog(&self.config, self.state.clone())?;
        let mut server = ServerFuture::new(catalog);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!(domain = %self.config.domain, "DNS server ready to serve queries");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        refresh_cancel.cancel();
        info!("Waiting for refresh loop to stop...");
        if let Err(e) = refresh_handle.await {
            error!("Refresh task panicked: {}", e);
        }

        info!("DNS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveredInstance;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Empty;

    #[async_trait]
    impl DiscoveryProvider for Empty {
        async fn browse(
            &self,
            _service_type: &str,
            _domain: &str,
            _results: mpsc::Sender<DiscoveredInstance>,
            _timeout: Duration,
        ) -> Result<(), DnsError> {
            Ok(())
        }
    }

    fn test_config() -> DnsConfig {
        DnsConfig::new("127.0.0.1:0".parse().unwrap(), "example.com")
    }

    #[test]
    fn test_server_creation() {
        let server = DnsServer::new(test_config(), Arc::new(Empty));
        assert!(!server.state().is_ready());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_start() {
        let mut config = test_config();
        config.discovery.refresh_interval_secs = 0;
        let server = DnsServer::new(config, Arc::new(Empty));

        let result = server.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(DnsError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_returns_on_cancel() {
        let server = DnsServer::new(test_config(), Arc::new(Empty));
        let state = server.state().clone();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(server.run(cancel.clone()));
        while !state.is_ready() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
