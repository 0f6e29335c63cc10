use std::net::Ipv4Addr;

use dns_types::protocol::types::*;

/// What a nameserver's reply means for the question it was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// There is at least one record in the ANSWER section.
    Answer,

    /// An error rcode (such as NXDOMAIN), or no answers but an `SOA`
    /// in the AUTHORITY section (NODATA).
    Negative,

    /// No answers, but `NS` records saying who to ask instead.
    Referral(Referral),

    /// None of the above.  Nothing more can be learned from this
    /// server.
    DeadEnd,
}

/// Delegation data extracted from a referral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    /// Owner of the last `NS` record in the AUTHORITY section.
    pub zone: DomainName,

    /// Nameserver names, in order, duplicates included.
    pub nameservers: Vec<DomainName>,

    /// Every `A` record in the ADDITIONAL section, in order.
    pub glue: Vec<Ipv4Addr>,
}

impl Referral {
    /// Whether this referral, from a nameserver for `current`, is to a
    /// zone strictly below `current` which holds `name`.
    pub fn gets_closer(&self, current: &DomainName, name: &DomainName) -> bool {
        name.is_subdomain_of(&self.zone)
            && self.zone.is_subdomain_of(current)
            && self.zone.labels.len() > current.labels.len()
    }
}

/// Classify a nameserver reply.  The checks are made in this order:
///
/// 1. any answer at all is an answer
/// 2. an rcode other than `NoError` is negative
/// 3. an `SOA` in AUTHORITY is negative
/// 4. an `NS` in AUTHORITY is a referral
/// 5. anything else is a dead end
pub fn classify(response: &Message) -> Classification {
    if !response.answers.is_empty() {
        return Classification::Answer;
    }

    if response.header.rcode != Rcode::NoError {
        return Classification::Negative;
    }

    if response
        .authority
        .iter()
        .any(|rr| rr.rtype() == RecordType::SOA)
    {
        return Classification::Negative;
    }

    let mut zone = None;
    let mut nameservers = Vec::new();
    for rr in &response.authority {
        if let RecordTypeWithData::NS { nsdname } = &rr.rtype_with_data {
            zone = Some(rr.name.clone());
            nameservers.push(nsdname.clone());
        }
    }

    match zone {
        Some(zone) => Classification::Referral(Referral {
            zone,
            nameservers,
            glue: response
                .additional
                .iter()
                .filter_map(|rr| match rr.rtype_with_data {
                    RecordTypeWithData::A { address } => Some(address),
                    _ => None,
                })
                .collect(),
        }),
        None => Classification::DeadEnd,
    }
}
