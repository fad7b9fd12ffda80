//! Custom Hickory DNS authority backed by mDNS discovery state.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{LowerName, Name, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::{Resolution, Resolver};
use crate::state::DnsState;

/// Group answer records into one record set per (name, type), keeping order.
fn into_record_sets(records: Vec<Record>) -> Vec<Arc<RecordSet>> {
    let mut sets: Vec<RecordSet> = Vec::new();

    for record in records {
        let existing = sets
            .iter_mut()
            .find(|set| set.name() == record.name() && set.record_type() == record.record_type());
        match existing {
            Some(set) => {
                set.insert(record, 0);
            }
            None => {
                let mut set =
                    RecordSet::with_ttl(record.name().clone(), record.record_type(), record.ttl());
                set.insert(record, 0);
                sets.push(set);
            }
        }
    }

    sets.into_iter().map(Arc::new).collect()
}

/// Authority for the configured domain, answering from the published snapshot.
///
/// Names it does not know are skipped, so another authority registered for
/// the same zone gets a chance to answer.
pub struct MdnsAuthority {
    origin: LowerName,
    state: DnsState,
    resolver: Resolver,
}

impl MdnsAuthority {
    /// Create a new authority for the given configuration and state.
    pub fn new(config: &DnsConfig, state: DnsState) -> Result<Self, DnsError> {
        let resolver = Resolver::new(&config.domain, config.ttl)?;
        let origin = Name::from_ascii(resolver.domain())?.into();

        Ok(Self {
            origin,
            state,
            resolver,
        })
    }

    /// Resolve against the current snapshot, holding the read lock only for
    /// the duration of the call.
    fn resolve(&self, name: &LowerName, rtype: RecordType) -> Resolution {
        let snapshot = self.state.read();
        self.resolver.resolve(&snapshot, name, rtype)
    }
}

#[async_trait]
impl Authority for MdnsAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        trace!(name = %name, rtype = ?rtype, "DNS lookup");

        match self.resolve(name, rtype) {
            Resolution::Decline(reason) => {
                trace!(name = %name, reason = ?reason, "declining query");
                metrics::record_query(&rtype_str, QueryResult::Declined, timer.elapsed());
                LookupControlFlow::Skip
            }
            Resolution::Answer(records) if records.is_empty() => {
                metrics::record_query(&rtype_str, QueryResult::NoData, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
            Resolution::Answer(records) => {
                metrics::record_query(&rtype_str, QueryResult::Answered, timer.elapsed());
                let mut sets = into_record_sets(records);
                let lookup = if sets.len() == 1 {
                    LookupRecords::new(lookup_options, sets.remove(0))
                } else {
                    LookupRecords::ManyRecords(lookup_options, sets)
                };
                LookupControlFlow::Break(Ok(lookup))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}

/// Last authority of the zone chain: every query that reaches it was skipped
/// by the authorities before it and is answered with SERVFAIL.
///
/// Registered as an external zone because Hickory only puts SERVFAIL on the
/// wire for lookup errors from non-authoritative zones. Queries without the
/// RD bit are therefore answered REFUSED instead.
pub struct ServFailAuthority {
    origin: LowerName,
}

impl ServFailAuthority {
    pub fn new(origin: LowerName) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl Authority for ServFailAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::External
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        debug!(name = %name, rtype = ?rtype, "no authority answered, replying SERVFAIL");
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}
