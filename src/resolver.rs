//! Query resolution against a published [`Snapshot`].
//!
//! Resolution is a linear chain; the first step that recognises the name
//! answers:
//!
//! ```text
//! name outside domain        → Decline(OutOfDomain)
//! type not A/AAAA/CNAME/SRV  → Decline(UnsupportedType)
//! name is a host             → A / AAAA
//! name is an alias           → CNAME + A / AAAA of the target
//! name is a service key      → SRV per member, whatever the type
//! otherwise                  → Decline(NotFound)
//! ```
//!
//! A `Decline` hands the query to whoever is next in the resolution chain.
//! An `Answer` with no records means the name exists but holds nothing of
//! the requested type.

use hickory_proto::rr::rdata::{A, AAAA, CNAME, SRV};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use tracing::{debug, trace, warn};

use crate::error::DnsError;
use crate::normalize::{fqdn, HostRecord};
use crate::state::Snapshot;

/// TTL of synthesized CNAME records. Aliases only live as long as a cycle.
pub const CNAME_TTL: u32 = 0;

/// TTL of synthesized SRV records.
pub const SRV_TTL: u32 = 0;

/// Priority of every SRV record.
pub const SRV_PRIORITY: u16 = 0;

/// Weight of every SRV record.
pub const SRV_WEIGHT: u16 = 10;

/// Why a query was passed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decline {
    /// Name is not under the authoritative domain.
    OutOfDomain,
    /// Record type is not one we synthesize.
    UnsupportedType,
    /// Name is under the domain but unknown.
    NotFound,
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Authoritative answer; may be empty.
    Answer(Vec<Record>),
    /// Not ours to answer.
    Decline(Decline),
}

impl Resolution {
    /// Returns true for any `Decline`.
    pub fn is_decline(&self) -> bool {
        matches!(self, Resolution::Decline(_))
    }
}

/// Builds answers for queries under one authoritative domain.
#[derive(Debug, Clone)]
pub struct Resolver {
    domain: String,
    ttl: u32,
}

impl Resolver {
    /// Create a resolver for `domain`, stamping A/AAAA records with `ttl`.
    pub fn new(domain: &str, ttl: u32) -> Result<Self, DnsError> {
        let domain = fqdn(domain);
        Name::from_ascii(&domain).map_err(|e| DnsError::InvalidName(format!("{domain}: {e}")))?;
        Ok(Self { domain, ttl })
    }

    /// Fully-qualified authoritative domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether `name` (lowercase, fully qualified) is the domain or below it.
    pub fn in_domain(&self, name: &str) -> bool {
        name == self.domain
            || name
                .strip_suffix(self.domain.as_str())
                .is_some_and(|head| head.ends_with('.'))
    }

    /// Resolve `name`/`rtype` against `snapshot`.
    pub fn resolve(&self, snapshot: &Snapshot, name: &LowerName, rtype: RecordType) -> Resolution {
        let qname = fqdn(&name.to_string());

        if !self.in_domain(&qname) {
            trace!(name = %qname, domain = %self.domain, "query outside our domain");
            return Resolution::Decline(Decline::OutOfDomain);
        }

        if !matches!(
            rtype,
            RecordType::A | RecordType::AAAA | RecordType::CNAME | RecordType::SRV
        ) {
            trace!(name = %qname, rtype = ?rtype, "unsupported record type");
            return Resolution::Decline(Decline::UnsupportedType);
        }

        let owner = Name::from(name.clone());

        if let Some(host) = snapshot.host(&qname) {
            debug!(name = %qname, rtype = ?rtype, "host match");
            return Resolution::Answer(self.address_records(owner, host, rtype));
        }

        if let Some(target) = snapshot.alias(&qname) {
            debug!(name = %qname, alias_target = target, rtype = ?rtype, "alias match");
            let Some(target_name) = parse_name(target) else {
                return Resolution::Answer(Vec::new());
            };
            let mut records = vec![make_record(
                owner,
                CNAME_TTL,
                RData::CNAME(CNAME(target_name.clone())),
            )];
            if let Some(host) = snapshot.host(target) {
                records.extend(self.address_records(target_name, host, rtype));
            }
            return Resolution::Answer(records);
        }

        if let Some(members) = snapshot.service(&qname) {
            debug!(name = %qname, members = members.len(), rtype = ?rtype, "service match");
            let records = members
                .iter()
                .filter_map(|member| {
                    let target = parse_name(&member.hostname)?;
                    Some(make_record(
                        owner.clone(),
                        SRV_TTL,
                        RData::SRV(SRV::new(SRV_PRIORITY, SRV_WEIGHT, member.port, target)),
                    ))
                })
                .collect();
            return Resolution::Answer(records);
        }

        debug!(name = %qname, "no records found, declining");
        Resolution::Decline(Decline::NotFound)
    }

    /// A and/or AAAA records for `host`, owned by `owner`.
    ///
    /// A and AAAA queries get their own family only; any other query type
    /// gets both.
    fn address_records(&self, owner: Name, host: &HostRecord, rtype: RecordType) -> Vec<Record> {
        let mut records = Vec::with_capacity(2);
        if let Some(ipv4) = host.ipv4 {
            if rtype != RecordType::AAAA {
                records.push(make_record(owner.clone(), self.ttl, RData::A(A::from(ipv4))));
            }
        }
        if let Some(ipv6) = host.ipv6 {
            if rtype != RecordType::A {
                records.push(make_record(owner, self.ttl, RData::AAAA(AAAA::from(ipv6))));
            }
        }
        records
    }
}

fn make_record(name: Name, ttl: u32, rdata: RData) -> Record {
    let mut record = Record::from_rdata(name, ttl, rdata);
    record.set_dns_class(DNSClass::IN);
    record
}

fn parse_name(name: &str) -> Option<Name> {
    match Name::from_ascii(name) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!(hostname = name, "cannot encode hostname as a DNS name: {}", e);
            None
        }
    }
}
