//! Quorum gating and CNAME synthesis for service members.
//!
//! Members of a service are addressed by ordinal: `etcd-0.example.com.` is
//! the lexicographically smallest member hostname, `etcd-1` the next, and so
//! on. The ordinal only changes when the membership set changes.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::metrics;
use crate::normalize::{fqdn, HostMap, ServiceMap};

/// alias name -> target hostname
pub type AliasMap = HashMap<String, String>;

/// Drop services with fewer than `min_members` members and sort the rest
/// by hostname.
///
/// A partial member list is worse than none for clients bootstrapping a
/// cluster from SRV records.
pub fn retain_quorum(mut services: ServiceMap, min_members: usize) -> ServiceMap {
    services.retain(|key, members| {
        if members.len() < min_members {
            debug!(
                service = %key,
                members = members.len(),
                min_members,
                "withholding service below quorum"
            );
            metrics::record_quorum_withheld(key);
            return false;
        }
        true
    });

    for members in services.values_mut() {
        members.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    }

    services
}

/// Build the alias name for ordinal `index`.
pub fn alias_name(prefix: &str, index: usize, domain: &str) -> String {
    format!("{}-{}.{}", prefix, index, fqdn(domain))
}

/// Assign `<prefix>-<n>.<domain>.` aliases to service members.
///
/// Members are numbered by hostname order. A member whose hostname is not in
/// `hosts` keeps its ordinal but gets no alias.
pub fn synthesize(services: &ServiceMap, hosts: &HostMap, domain: &str, prefix: &str) -> AliasMap {
    let mut aliases = AliasMap::new();

    let mut keys: Vec<&String> = services.keys().collect();
    keys.sort();

    for key in keys {
        let mut targets: Vec<&str> = services[key].iter().map(|m| m.hostname.as_str()).collect();
        targets.sort_unstable();

        for (index, target) in targets.into_iter().enumerate() {
            if !hosts.contains_key(target) {
                debug!(service = %key, hostname = target, index, "no host record for member, skipping alias");
                continue;
            }
            let alias = alias_name(prefix, index, domain);
            if let Some(existing) = aliases.get(&alias) {
                warn!(
                    alias = %alias,
                    existing = %existing,
                    dropped = target,
                    service = %key,
                    "alias already assigned by another service"
                );
                continue;
            }
            aliases.insert(alias, target.to_string());
        }
    }

    aliases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{HostRecord, ServiceRecord};

    const KEY: &str = "_etcd-server-ssl._tcp.example.com.";

    fn members(hosts: &[&str]) -> Vec<ServiceRecord> {
        hosts
            .iter()
            .map(|h| ServiceRecord {
                hostname: h.to_string(),
                port: 2380,
            })
            .collect()
    }

    fn host_map(hosts: &[&str]) -> HostMap {
        hosts
            .iter()
            .map(|h| {
                (
                    h.to_string(),
                    HostRecord {
                        hostname: h.to_string(),
                        ipv4: Some("10.0.0.1".parse().unwrap()),
                        ipv6: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_ordinals_follow_hostname_order() {
        let names = ["master-2.example.com.", "master-0.example.com.", "master-1.example.com."];
        let services = ServiceMap::from([(KEY.to_string(), members(&names))]);
        let hosts = host_map(&names);

        let aliases = synthesize(&services, &hosts, "example.com", "etcd");

        assert_eq!(aliases["etcd-0.example.com."], "master-0.example.com.");
        assert_eq!(aliases["etcd-1.example.com."], "master-1.example.com.");
        assert_eq!(aliases["etcd-2.example.com."], "master-2.example.com.");
    }

    #[test]
    fn test_ordinals_independent_of_arrival_order() {
        let forward = ["a.example.com.", "b.example.com.", "c.example.com.", "d.example.com."];
        let mut backward = forward;
        backward.reverse();
        let hosts = host_map(&forward);

        let first = synthesize(
            &ServiceMap::from([(KEY.to_string(), members(&forward))]),
            &hosts,
            "example.com",
            "etcd",
        );
        let second = synthesize(
            &ServiceMap::from([(KEY.to_string(), members(&backward))]),
            &hosts,
            "example.com",
            "etcd",
        );

        assert_eq!(first, second);
        assert_eq!(first["etcd-0.example.com."], "a.example.com.");
        assert_eq!(first["etcd-3.example.com."], "d.example.com.");
    }

    #[test]
    fn test_no_alias_without_host_record() {
        let names = ["master-0.example.com.", "master-1.example.com."];
        let services = ServiceMap::from([(KEY.to_string(), members(&names))]);
        let hosts = host_map(&["master-1.example.com."]);

        let aliases = synthesize(&services, &hosts, "example.com", "etcd");

        assert_eq!(aliases.len(), 1);
        assert!(!aliases.contains_key("etcd-0.example.com."));
        assert_eq!(aliases["etcd-1.example.com."], "master-1.example.com.");
        assert!(aliases.values().all(|target| hosts.contains_key(target)));
    }

    #[test]
    fn test_first_service_keeps_colliding_alias() {
        let services = ServiceMap::from([
            (KEY.to_string(), members(&["a.example.com."])),
            ("_other._tcp.example.com.".to_string(), members(&["z.example.com."])),
        ]);
        let hosts = host_map(&["a.example.com.", "z.example.com."]);

        let aliases = synthesize(&services, &hosts, "example.com", "etcd");

        // "_etcd..." sorts before "_other..."
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases["etcd-0.example.com."], "a.example.com.");
    }

    #[test]
    fn test_retain_quorum_drops_small_sets() {
        let services = ServiceMap::from([
            (KEY.to_string(), members(&["a.example.com.", "b.example.com."])),
            (
                "_big._tcp.example.com.".to_string(),
                members(&["c.example.com.", "b.example.com.", "a.example.com."]),
            ),
        ]);

        let kept = retain_quorum(services, 3);

        assert!(!kept.contains_key(KEY));
        let names: Vec<&str> = kept["_big._tcp.example.com."]
            .iter()
            .map(|m| m.hostname.as_str())
            .collect();
        assert_eq!(names, vec!["a.example.com.", "b.example.com.", "c.example.com."]);
    }

    #[test]
    fn test_retain_quorum_zero_keeps_everything() {
        let services = ServiceMap::from([(KEY.to_string(), members(&["a.example.com."]))]);
        assert_eq!(retain_quorum(services, 0).len(), 1);
    }
}
