//! Metrics instrumentation for mdns-dns.
//!
//! All metrics are prefixed with `mdns_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::NoData => "nodata",
        QueryResult::Declined => "declined",
    };

    counter!("mdns_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("mdns_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records.
    Answered,
    /// Name is ours but holds nothing of the requested type.
    NoData,
    /// Query was handed to the next authority.
    Declined,
}

/// Record the outcome and duration of one refresh cycle.
pub fn record_refresh(duration: std::time::Duration) {
    counter!("mdns_dns.refresh.count").increment(1);
    histogram!("mdns_dns.refresh.duration.seconds").record(duration.as_secs_f64());
}

/// Record how many instances one browse returned.
pub fn record_discovered(service_type: &str, count: usize) {
    gauge!("mdns_dns.discovery.instances", "service" => service_type.to_string())
        .set(count as f64);
}

/// Record a failed or abandoned browse.
pub fn record_discovery_failure(service_type: &str) {
    counter!("mdns_dns.discovery.failure.count", "service" => service_type.to_string())
        .increment(1);
}

/// Record a service whose member list was withheld by the quorum gate.
pub fn record_quorum_withheld(service_key: &str) {
    counter!("mdns_dns.quorum.withheld.count", "service" => service_key.to_string())
        .increment(1);
}

/// Record the contents of a freshly published snapshot.
pub fn record_snapshot(hosts: usize, services: usize, aliases: usize, generation: u64) {
    gauge!("mdns_dns.state.hosts.count").set(hosts as f64);
    gauge!("mdns_dns.state.services.count").set(services as f64);
    gauge!("mdns_dns.state.aliases.count").set(aliases as f64);
    gauge!("mdns_dns.state.generation").set(generation as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
