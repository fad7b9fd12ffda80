//! Shared test infrastructure for catalog and refresh integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tokio::sync::mpsc;

use mdns_dns::config::DnsConfig;
use mdns_dns::discovery::{DiscoveredInstance, DiscoveryProvider};
use mdns_dns::error::DnsError;
use mdns_dns::refresh::Refresher;
use mdns_dns::state::DnsState;

// --- Constants ---

pub const DOMAIN: &str = "example.com";
pub const HOST_SERVICE: &str = "_workstation._tcp";
pub const ETCD_SERVICE: &str = "_etcd-server-ssl._tcp";
pub const ETCD_KEY: &str = "_etcd-server-ssl._tcp.example.com.";

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to `Catalog::handle_request()`.
/// The response is serialized via `MessageResponse::destructive_emit()` and stored
/// as raw wire-format bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- StaticProvider ---

/// Discovery provider serving canned instances per service type.
///
/// Contents can be swapped between refresh cycles, and individual service
/// types can be made to fail.
#[derive(Clone, Default)]
pub struct StaticProvider {
    instances: Arc<Mutex<HashMap<String, Vec<DiscoveredInstance>>>>,
    failing: Arc<Mutex<Vec<String>>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a host on the host service type with the given addresses.
    pub fn add_host(&self, name: &str, ips: &[&str]) {
        let mut ipv4 = Vec::new();
        let mut ipv6 = Vec::new();
        for ip in ips {
            match ip.parse::<IpAddr>().unwrap() {
                IpAddr::V4(v4) => ipv4.push(v4),
                IpAddr::V6(v6) => ipv6.push(v6),
            }
        }
        self.push(DiscoveredInstance {
            instance: name.to_string(),
            service_type: HOST_SERVICE.to_string(),
            hostname: format!("{name}.local."),
            port: 9,
            ipv4,
            ipv6,
        });
    }

    /// Advertise `name` as a member of `service_type` on `port`.
    pub fn add_member(&self, service_type: &str, name: &str, port: u16) {
        self.push(DiscoveredInstance {
            instance: name.to_string(),
            service_type: service_type.to_string(),
            hostname: format!("{name}.local."),
            port,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
        });
    }

    /// Forget everything previously advertised.
    pub fn clear(&self) {
        self.instances.lock().unwrap().clear();
    }

    /// Make browses of `service_type` fail.
    pub fn fail(&self, service_type: &str) {
        self.failing.lock().unwrap().push(service_type.to_string());
    }

    fn push(&self, instance: DiscoveredInstance) {
        self.instances
            .lock()
            .unwrap()
            .entry(instance.service_type.clone())
            .or_default()
            .push(instance);
    }
}

#[async_trait]
impl DiscoveryProvider for StaticProvider {
    async fn browse(
        &self,
        service_type: &str,
        _domain: &str,
        results: mpsc::Sender<DiscoveredInstance>,
        _timeout: Duration,
    ) -> Result<(), DnsError> {
        let instances = self
            .instances
            .lock()
            .unwrap()
            .get(service_type)
            .cloned()
            .unwrap_or_default();

        for instance in instances {
            results.send(instance).await.ok();
        }

        if self.failing.lock().unwrap().iter().any(|t| t == service_type) {
            return Err(DnsError::Discovery {
                service_type: service_type.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// A three-node etcd cluster: master-{0,1,2} on 10.0.0.{1,2,3}, port 2380.
pub fn three_node_cluster() -> StaticProvider {
    let provider = StaticProvider::new();
    for i in 0..3 {
        let name = format!("master-{i}");
        provider.add_host(&name, &[&format!("10.0.0.{}", i + 1), &format!("fd00::{}", i + 1)]);
        provider.add_member(ETCD_SERVICE, &name, 2380);
    }
    provider
}

// --- Config builders ---

pub fn test_dns_config() -> DnsConfig {
    let mut config = DnsConfig::new("127.0.0.1:5353".parse().unwrap(), DOMAIN);
    config.discovery.browse_timeout_ms = 100;
    config
}

pub fn test_dns_config_with_quorum(min_srv_records: usize) -> DnsConfig {
    let mut config = test_dns_config();
    config.discovery.min_srv_records = min_srv_records;
    config
}

/// Run one refresh cycle against `provider` and return the populated state.
pub async fn refreshed_state(config: &DnsConfig, provider: &StaticProvider) -> DnsState {
    let state = DnsState::new();
    Refresher::new(config, Arc::new(provider.clone()), state.clone())
        .refresh_once()
        .await;
    state
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from a loopback source.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog with an MdnsAuthority.
pub fn build_catalog(config: &DnsConfig, state: DnsState) -> Catalog {
    mdns_dns::server::build_catalog(config, state).expect("failed to build catalog")
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract AAAA addresses from a response.
pub fn extract_aaaa_ips(msg: &Message) -> Vec<Ipv6Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::AAAA(aaaa) => Some(Ipv6Addr::from(*aaaa)),
            _ => None,
        })
        .collect()
}

/// Extract CNAME targets from a response.
pub fn extract_cnames(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::CNAME(cname) => Some(cname.0.to_ascii()),
            _ => None,
        })
        .collect()
}

/// Extract (target, port) pairs from SRV answers.
pub fn extract_srv(msg: &Message) -> Vec<(String, u16)> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::SRV(srv) => Some((srv.target().to_ascii(), srv.port())),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
