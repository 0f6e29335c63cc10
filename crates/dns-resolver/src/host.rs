//! What `host` prints for a name: its aliases, addresses, and mail
//! exchanges.

use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::context::Context;
use crate::metrics::Metrics;
use crate::Resolver;

/// One link of a CNAME chain: `alias` is an alias for `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnameRecord {
    pub alias: DomainName,
    pub name: DomainName,
}

/// `name` has address `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord<A> {
    pub name: DomainName,
    pub address: A,
}

/// Mail for `name` is handled by `exchange`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub name: DomainName,
    pub preference: u16,
    pub exchange: DomainName,
}

/// Everything found for a name.  A list is empty if the lookup for
/// that type failed or found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRecords {
    /// The chain followed while looking up `A` records, in order.
    pub cnames: Vec<CnameRecord>,
    pub a: Vec<AddressRecord<Ipv4Addr>>,
    pub aaaa: Vec<AddressRecord<Ipv6Addr>>,
    pub mx: Vec<MxRecord>,
}

impl HostRecords {
    /// Pick the records out of the responses to the `A`, `AAAA`, and
    /// `MX` lookups for `name`.
    pub fn from_responses(
        name: &DomainName,
        a_response: &Message,
        aaaa_response: &Message,
        mx_response: &Message,
    ) -> Self {
        let mut records = Self::default();

        let mut alias = name.clone();
        for rr in &a_response.answers {
            match &rr.rtype_with_data {
                RecordTypeWithData::CNAME { cname } => {
                    records.cnames.push(CnameRecord {
                        alias: alias.clone(),
                        name: cname.clone(),
                    });
                    alias = cname.clone();
                }
                RecordTypeWithData::A { address } => records.a.push(AddressRecord {
                    name: rr.name.clone(),
                    address: *address,
                }),
                _ => (),
            }
        }

        for rr in &aaaa_response.answers {
            if let RecordTypeWithData::AAAA { address } = rr.rtype_with_data {
                records.aaaa.push(AddressRecord {
                    name: rr.name.clone(),
                    address,
                });
            }
        }

        for rr in &mx_response.answers {
            if let RecordTypeWithData::MX {
                preference,
                exchange,
            } = &rr.rtype_with_data
            {
                records.mx.push(MxRecord {
                    name: rr.name.clone(),
                    preference: *preference,
                    exchange: exchange.clone(),
                });
            }
        }

        records
    }
}

impl Resolver {
    /// Look up the `A`, `AAAA`, and `MX` records for a name, one after
    /// the other.
    pub async fn host_records(&self, name: &DomainName) -> HostRecords {
        self.host_records_with_metrics(name).await.1
    }

    /// Like `host_records`, but also return the metrics for all three
    /// lookups.
    pub async fn host_records_with_metrics(&self, name: &DomainName) -> (Metrics, HostRecords) {
        let mut ctx = Context::new();
        let records = self
            .collect_host_records(&mut ctx, name)
            .instrument(tracing::error_span!("host_records", %name))
            .await;
        (ctx.done(), records)
    }

    async fn collect_host_records(&self, ctx: &mut Context, name: &DomainName) -> HostRecords {
        let a_response = self.lookup_in_context(ctx, name, RecordType::A).await;
        let aaaa_response = self.lookup_in_context(ctx, name, RecordType::AAAA).await;
        let mx_response = self.lookup_in_context(ctx, name, RecordType::MX).await;

        let records = HostRecords::from_responses(name, &a_response, &aaaa_response, &mx_response);
        tracing::debug!(
            cnames = %records.cnames.len(),
            a = %records.a.len(),
            aaaa = %records.aaaa.len(),
            mx = %records.mx.len(),
            "collected host records"
        );
        records
    }
}
