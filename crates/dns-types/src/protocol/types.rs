//! The message format of RFC 1035 section 4, cut down to what an
//! iterative resolver sends and reads.

use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Maximum encoded length of a domain name: every label plus its
/// length octet.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Maximum length of a single label.
pub const LABEL_MAX_LEN: usize = 63;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const OPCODE_SHIFT: u16 = 11;
const FOUR_BITS: u16 = 0x000F;

/// A DNS message.  Queries and responses have the same shape.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    /// A query for one question.  RD is clear: the resolver walks the
    /// delegations itself.
    pub fn from_question(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Query,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// An empty `NoError` reply carrying this message's ID, opcode,
    /// and questions.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                is_response: true,
                is_authoritative: false,
                is_truncated: false,
                recursion_available: true,
                rcode: Rcode::NoError,
                ..self.header
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

/// The fixed part of a message, less the section counts (those are
/// worked out from the sections when encoding).
///
/// ```text
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    /// Set when the reply did not fit in a UDP datagram.
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
}

impl Header {
    /// The 16 bits which follow the ID on the wire.  Z is always zero.
    pub fn flags(&self) -> u16 {
        let mut flags = (u16::from(u8::from(self.opcode)) << OPCODE_SHIFT)
            | u16::from(u8::from(self.rcode));

        for (is_set, flag) in [
            (self.is_response, FLAG_QR),
            (self.is_authoritative, FLAG_AA),
            (self.is_truncated, FLAG_TC),
            (self.recursion_desired, FLAG_RD),
            (self.recursion_available, FLAG_RA),
        ] {
            if is_set {
                flags |= flag;
            }
        }

        flags
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn from_flags(id: u16, flags: u16) -> Self {
        Self {
            id,
            is_response: flags & FLAG_QR != 0,
            opcode: Opcode::from(((flags >> OPCODE_SHIFT) & FOUR_BITS) as u8),
            is_authoritative: flags & FLAG_AA != 0,
            is_truncated: flags & FLAG_TC != 0,
            recursion_desired: flags & FLAG_RD != 0,
            recursion_available: flags & FLAG_RA != 0,
            rcode: Rcode::from((flags & FOUR_BITS) as u8),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Question {
    pub name: DomainName,
    pub rtype: RecordType,
    pub rclass: RecordClass,
}

impl Question {
    /// An `IN` question.
    pub fn new(name: DomainName, rtype: RecordType) -> Self {
        Self {
            name,
            rtype,
            rclass: RecordClass::IN,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.rclass, self.rtype)
    }
}

/// One record from the answer, authority, or additional section.
/// Sections are kept flat, in wire order: a record set is a run of
/// records with the same owner and type.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct ResourceRecord {
    /// The owner name.
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,
    /// Carried through, never interpreted: cache entries do not
    /// expire.
    pub ttl: u32,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.rtype_with_data.rtype()
    }
}

/// The RDATA of a record, decoded for the types the resolver looks
/// inside.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeWithData {
    A {
        address: Ipv4Addr,
    },
    NS {
        nsdname: DomainName,
    },
    CNAME {
        cname: DomainName,
    },
    /// In a reply with no answers, an `SOA` in AUTHORITY makes it a
    /// negative answer.
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        preference: u16,
        exchange: DomainName,
    },
    AAAA {
        address: Ipv6Addr,
    },
    /// Anything else, RDATA untouched.
    Unknown {
        tag: RecordTypeUnknown,
        octets: Bytes,
    },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            Self::A { .. } => RecordType::A,
            Self::NS { .. } => RecordType::NS,
            Self::CNAME { .. } => RecordType::CNAME,
            Self::SOA { .. } => RecordType::SOA,
            Self::MX { .. } => RecordType::MX,
            Self::AAAA { .. } => RecordType::AAAA,
            Self::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordTypeWithData {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(match u.arbitrary::<RecordType>()? {
            RecordType::A => Self::A {
                address: u.arbitrary()?,
            },
            RecordType::NS => Self::NS {
                nsdname: u.arbitrary()?,
            },
            RecordType::CNAME => Self::CNAME {
                cname: u.arbitrary()?,
            },
            RecordType::SOA => Self::SOA {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            },
            RecordType::MX => Self::MX {
                preference: u.arbitrary()?,
                exchange: u.arbitrary()?,
            },
            RecordType::AAAA => Self::AAAA {
                address: u.arbitrary()?,
            },
            RecordType::Unknown(tag) => {
                // `Bytes` is not `Arbitrary`
                let len = u.int_in_range(0..=64)?;
                Self::Unknown {
                    tag,
                    octets: Bytes::copy_from_slice(u.bytes(len)?),
                }
            }
        })
    }
}

/// The kind of query.  Only standard queries are ever sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Query,
    Other(OpcodeOther),
}

/// A 4-bit opcode other than 0.  The field is private so it cannot
/// hold anything else.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OpcodeOther(u8);

impl From<u8> for Opcode {
    #[allow(clippy::cast_possible_truncation)]
    fn from(octet: u8) -> Self {
        match octet & FOUR_BITS as u8 {
            0 => Self::Query,
            n => Self::Other(OpcodeOther(n)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Query => 0,
            Opcode::Other(OpcodeOther(n)) => n,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Opcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        u.arbitrary::<u8>().map(Self::from)
    }
}

/// The outcome a server reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    /// NXDOMAIN: the name does not exist.
    NameError,
    NotImplemented,
    Refused,
    Other(RcodeOther),
}

/// A 4-bit rcode above 5.  The field is private so it cannot hold
/// anything else.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RcodeOther(u8);

impl From<u8> for Rcode {
    #[allow(clippy::cast_possible_truncation)]
    fn from(octet: u8) -> Self {
        match octet & FOUR_BITS as u8 {
            0 => Self::NoError,
            1 => Self::FormatError,
            2 => Self::ServerFailure,
            3 => Self::NameError,
            4 => Self::NotImplemented,
            5 => Self::Refused,
            n => Self::Other(RcodeOther(n)),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(rcode: Rcode) -> Self {
        match rcode {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Other(RcodeOther(n)) => n,
        }
    }
}

/// The mnemonics `dig` prints.
impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rcode::NoError => f.write_str("NOERROR"),
            Rcode::FormatError => f.write_str("FORMERR"),
            Rcode::ServerFailure => f.write_str("SERVFAIL"),
            Rcode::NameError => f.write_str("NXDOMAIN"),
            Rcode::NotImplemented => f.write_str("NOTIMP"),
            Rcode::Refused => f.write_str("REFUSED"),
            Rcode::Other(RcodeOther(n)) => write!(f, "RCODE{n}"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Rcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        u.arbitrary::<u8>().map(Self::from)
    }
}

/// A fully-qualified name.  The last label is always the empty root
/// label, and no other label is empty.
///
/// Labels are lower-cased when they are made, so the derived
/// equality and hashing ignore case.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct DomainName {
    pub labels: Vec<Label>,
    /// Encoded length: each label plus its length octet.
    pub len: usize,
}

impl DomainName {
    pub fn root_domain() -> Self {
        Self {
            labels: vec![Label::new()],
            len: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1
    }

    /// Drop the leftmost label.  The root has no parent.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Self::from_labels(self.labels[1..].to_vec())
        }
    }

    /// True if this name is `other` or somewhere below it.
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        self.labels.ends_with(&other.labels)
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.len);
        for label in &self.labels[..self.labels.len() - 1] {
            out.extend(label.octets.iter().map(|&octet| char::from(octet)));
            out.push('.');
        }
        out
    }

    /// Parse `www.example.com.` or `www.example.com`: a name is
    /// always taken to be relative to the root.
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let mut labels = s
            .strip_suffix('.')
            .unwrap_or(s)
            .split('.')
            .map(|chunk| {
                if chunk.is_empty() {
                    None
                } else {
                    Label::try_from(chunk.as_bytes()).ok()
                }
            })
            .collect::<Option<Vec<Label>>>()?;
        labels.push(Label::new());

        Self::from_labels(labels)
    }

    pub fn from_labels(labels: Vec<Label>) -> Option<Self> {
        let (root, rest) = labels.split_last()?;
        if !root.is_empty() || rest.iter().any(Label::is_empty) {
            return None;
        }

        let len = labels
            .iter()
            .map(|label| 1 + usize::from(label.len()))
            .sum();
        if len > DOMAINNAME_MAX_LEN {
            return None;
        }

        Some(Self { labels, len })
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DomainName")
            .field(&self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_dotted_string())
    }
}

impl FromStr for DomainName {
    type Err = DomainNameFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dotted_string(s).ok_or(DomainNameFromStr)
    }
}

/// The string is not a domain name: it has an empty label, a label
/// over 63 octets, or is over 255 octets in all.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DomainNameFromStr;

impl fmt::Display for DomainNameFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "not a valid domain name")
    }
}

impl std::error::Error for DomainNameFromStr {}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for DomainName {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        // at most 8 labels of at most 20 octets each, so always short
        // enough
        let mut labels = Vec::<Label>::new();
        for _ in 0..u.int_in_range(0..=8)? {
            labels.push(u.arbitrary()?);
        }
        labels.push(Label::new());
        Self::from_labels(labels).ok_or(arbitrary::Error::IncorrectFormat)
    }
}

/// Up to 63 octets, stored lower-cased.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Label {
    octets: Bytes,
}

impl Label {
    /// The empty (root) label.
    pub fn new() -> Self {
        Self {
            octets: Bytes::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> u8 {
        self.octets.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = LabelTooLong;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > LABEL_MAX_LEN {
            Err(LabelTooLong)
        } else {
            Ok(Self {
                octets: Bytes::from(octets.to_ascii_lowercase()),
            })
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LabelTooLong;

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Label {
    // 1 to 20 octets of printable ASCII other than '.'
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let len = u.int_in_range(1..=20)?;
        let octets = u
            .bytes(len)?
            .iter()
            .map(|b| match b % 94 + 33 {
                b'.' => b'-',
                c => c,
            })
            .collect::<Vec<u8>>();
        Self::try_from(octets.as_slice()).map_err(|_| arbitrary::Error::IncorrectFormat)
    }
}

/// Record types.  The ones the resolver looks inside get a variant of
/// their own.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    MX,
    AAAA,
    Unknown(RecordTypeUnknown),
}

/// A type number with no variant of its own.  The field is private so
/// it cannot hold one that has.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RecordTypeUnknown(u16);

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            15 => Self::MX,
            28 => Self::AAAA,
            _ => Self::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MX => 15,
            RecordType::AAAA => 28,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

/// Mnemonics, or `TYPE<n>` (RFC 3597) for the rest.
impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "TYPE{n}"),
            known => write!(f, "{known:?}"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        u.arbitrary::<u16>().map(Self::from)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClass {
    IN,
    Unknown(RecordClassUnknown),
}

/// A class number other than `IN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RecordClassUnknown(u16);

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        if value == 1 {
            Self::IN
        } else {
            Self::Unknown(RecordClassUnknown(value))
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(rclass: RecordClass) -> Self {
        match rclass {
            RecordClass::IN => 1,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => f.write_str("IN"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "CLASS{n}"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        u.arbitrary::<u16>().map(Self::from)
    }
}


#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use super::*;

    use arbitrary::{Arbitrary, Unstructured};
    use rand::Rng;

    pub fn arbitrary_message() -> Message {
        let mut rng = rand::rng();
        for size in [512, 2048, 8192] {
            let buf = (0..size).map(|_| rng.random()).collect::<Vec<u8>>();
            if let Ok(message) = Message::arbitrary(&mut Unstructured::new(&buf)) {
                return message;
            }
        }

        panic!("could not generate arbitrary message");
    }

    pub fn domain(name: &str) -> DomainName {
        DomainName::from_dotted_string(name).unwrap()
    }

    pub fn question(name: &str, rtype: RecordType) -> Question {
        Question::new(domain(name), rtype)
    }

    pub fn record(name: &str, rtype_with_data: RecordTypeWithData) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data,
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        record(name, RecordTypeWithData::A { address })
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        record(name, RecordTypeWithData::AAAA { address })
    }

    pub fn cname_record(name: &str, target: &str) -> ResourceRecord {
        record(
            name,
            RecordTypeWithData::CNAME {
                cname: domain(target),
            },
        )
    }

    pub fn ns_record(zone: &str, nameserver: &str) -> ResourceRecord {
        record(
            zone,
            RecordTypeWithData::NS {
                nsdname: domain(nameserver),
            },
        )
    }

    pub fn mx_record(name: &str, preference: u16, exchange: &str) -> ResourceRecord {
        record(
            name,
            RecordTypeWithData::MX {
                preference,
                exchange: domain(exchange),
            },
        )
    }

    pub fn soa_record(zone: &str) -> ResourceRecord {
        record(
            zone,
            RecordTypeWithData::SOA {
                mname: domain(&format!("ns.{zone}")),
                rname: domain(&format!("hostmaster.{zone}")),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 86400,
                minimum: 300,
            },
        )
    }

    pub fn unknown_record(name: &str, rtype: u16, octets: &[u8]) -> ResourceRecord {
        let RecordType::Unknown(tag) = RecordType::from(rtype) else {
            panic!("type {rtype} has its own variant");
        };
        record(
            name,
            RecordTypeWithData::Unknown {
                tag,
                octets: Bytes::copy_from_slice(octets),
            },
        )
    }
}
