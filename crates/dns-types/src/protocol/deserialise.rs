//! Decoding messages off the wire.  Compression pointers are followed
//! only backwards, so decoding always terminates.

use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the octets are not a well-formed message.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        ConsumableBuffer::new(octets).read_message()
    }
}

/// Why a datagram could not be decoded.  Every variant but
/// `CompletelyBusted` carries the message ID, so the reply can still
/// be matched to a query.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// Fewer than 2 octets: there is not even an ID.
    CompletelyBusted,
    HeaderTooShort(u16),
    QuestionTooShort(u16),
    ResourceRecordTooShort(u16),
    /// The RDATA is not RDLENGTH octets long.
    ResourceRecordInvalid(u16),
    DomainTooShort(u16),
    /// Over 255 octets once pointers are expanded.
    DomainTooLong(u16),
    /// A pointer to the name itself or to somewhere after it.
    DomainPointerInvalid(u16),
    /// A length octet with the reserved `01` or `10` top bits.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::ResourceRecordTooShort(id)
            | Error::ResourceRecordInvalid(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let problem = match self {
            Error::CompletelyBusted => return write!(f, "message has no ID"),
            Error::HeaderTooShort(_) => "header is truncated",
            Error::QuestionTooShort(_) => "question is truncated",
            Error::ResourceRecordTooShort(_) => "resource record is truncated",
            Error::ResourceRecordInvalid(_) => "RDATA does not match RDLENGTH",
            Error::DomainTooShort(_) => "domain name is truncated",
            Error::DomainTooLong(_) => "domain name is over 255 octets",
            Error::DomainPointerInvalid(_) => "domain name pointer does not point backwards",
            Error::DomainLabelInvalid(_) => "domain name has an invalid label",
        };
        match self.id() {
            Some(id) => write!(f, "{problem} (id {id})"),
            None => f.write_str(problem),
        }
    }
}

impl std::error::Error for Error {}

/// A read cursor over a datagram.  Once the ID has been read it is
/// attached to every error.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
    id: u16,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
            id: 0,
        }
    }

    /// # Errors
    ///
    /// If the octets are not a well-formed message.
    pub fn read_message(&mut self) -> Result<Message, Error> {
        self.id = self.next_u16().ok_or(Error::CompletelyBusted)?;
        let too_short = Error::HeaderTooShort(self.id);

        let flags = self.next_u16().ok_or(too_short)?;
        let header = Header::from_flags(self.id, flags);

        let mut counts = [0; 4];
        for count in &mut counts {
            *count = self.next_u16().ok_or(too_short)?;
        }
        let [qdcount, ancount, nscount, arcount] = counts;

        let questions = (0..qdcount)
            .map(|_| self.read_question())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Message {
            header,
            questions,
            answers: self.read_records(ancount)?,
            authority: self.read_records(nscount)?,
            additional: self.read_records(arcount)?,
        })
    }

    /// # Errors
    ///
    /// If the question is truncated or its name is invalid.
    pub fn read_question(&mut self) -> Result<Question, Error> {
        let too_short = Error::QuestionTooShort(self.id);

        Ok(Question {
            name: self.read_name()?,
            rtype: self.next_u16().map(RecordType::from).ok_or(too_short)?,
            rclass: self.next_u16().map(RecordClass::from).ok_or(too_short)?,
        })
    }

    fn read_records(&mut self, count: u16) -> Result<Vec<ResourceRecord>, Error> {
        (0..count).map(|_| self.read_record()).collect()
    }

    /// # Errors
    ///
    /// If the record is truncated, or its RDATA does not match its
    /// RDLENGTH.
    pub fn read_record(&mut self) -> Result<ResourceRecord, Error> {
        let too_short = Error::ResourceRecordTooShort(self.id);

        let name = self.read_name()?;
        let rtype = self.next_u16().map(RecordType::from).ok_or(too_short)?;
        let rclass = self.next_u16().map(RecordClass::from).ok_or(too_short)?;
        let ttl = self.next_u32().ok_or(too_short)?;
        let rdlength = usize::from(self.next_u16().ok_or(too_short)?);

        let rdata_end = self.position + rdlength;
        let rtype_with_data = self.read_rdata(rtype, rdlength)?;

        if self.position == rdata_end {
            Ok(ResourceRecord {
                name,
                rtype_with_data,
                rclass,
                ttl,
            })
        } else {
            Err(Error::ResourceRecordInvalid(self.id))
        }
    }

    // names inside RDATA are read in full here, so a cached record
    // never holds a pointer into some other datagram
    fn read_rdata(&mut self, rtype: RecordType, rdlength: usize) -> Result<RecordTypeWithData, Error> {
        let too_short = Error::ResourceRecordTooShort(self.id);

        Ok(match rtype {
            RecordType::A => RecordTypeWithData::A {
                address: self.next_u32().map(Ipv4Addr::from).ok_or(too_short)?,
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: self.read_name()?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: self.read_name()?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: self.read_name()?,
                rname: self.read_name()?,
                serial: self.next_u32().ok_or(too_short)?,
                refresh: self.next_u32().ok_or(too_short)?,
                retry: self.next_u32().ok_or(too_short)?,
                expire: self.next_u32().ok_or(too_short)?,
                minimum: self.next_u32().ok_or(too_short)?,
            },
            RecordType::MX => RecordTypeWithData::MX {
                preference: self.next_u16().ok_or(too_short)?,
                exchange: self.read_name()?,
            },
            RecordType::AAAA => RecordTypeWithData::AAAA {
                address: self
                    .take(16)
                    .and_then(|octets| <[u8; 16]>::try_from(octets).ok())
                    .map(Ipv6Addr::from)
                    .ok_or(too_short)?,
            },
            RecordType::Unknown(tag) => RecordTypeWithData::Unknown {
                tag,
                octets: self
                    .take(rdlength)
                    .map(Bytes::copy_from_slice)
                    .ok_or(too_short)?,
            },
        })
    }

    /// Read a name, expanding a compression pointer if it ends with
    /// one.
    ///
    /// # Errors
    ///
    /// If the name is truncated, too long, has an invalid label, or
    /// has a pointer which does not point backwards.
    pub fn read_name(&mut self) -> Result<DomainName, Error> {
        let start = self.position;
        let mut labels = Vec::new();
        let mut len = 0;

        loop {
            let size = self.next_u8().ok_or(Error::DomainTooShort(self.id))?;

            match size >> 6 {
                0b00 if size == 0 => {
                    labels.push(Label::new());
                    len += 1;
                    break;
                }
                0b00 => {
                    let label = self
                        .take(usize::from(size))
                        .and_then(|octets| Label::try_from(octets).ok())
                        .ok_or(Error::DomainTooShort(self.id))?;
                    labels.push(label);
                    len += 1 + usize::from(size);
                    if len > DOMAINNAME_MAX_LEN {
                        return Err(Error::DomainTooLong(self.id));
                    }
                }
                0b11 => {
                    let lo = self.next_u8().ok_or(Error::DomainTooShort(self.id))?;
                    let target = usize::from(u16::from_be_bytes([size & 0b0011_1111, lo]));
                    if target >= start {
                        return Err(Error::DomainPointerInvalid(self.id));
                    }

                    let suffix = self.at_offset(target).read_name()?;
                    len += suffix.len;
                    labels.extend(suffix.labels);
                    break;
                }
                _ => return Err(Error::DomainLabelInvalid(self.id)),
            }
        }

        if len > DOMAINNAME_MAX_LEN {
            return Err(Error::DomainTooLong(self.id));
        }
        DomainName::from_labels(labels).ok_or(Error::DomainLabelInvalid(self.id))
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        self.take(1).map(|octets| octets[0])
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        self.take(2).map(|octets| u16::from_be_bytes([octets[0], octets[1]]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|octets| u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]))
    }

    /// The next `size` octets, or `None` (consuming nothing) if there
    /// are not that many left.
    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let octets = self.octets.get(self.position..self.position + size)?;
        self.position += size;
        Some(octets)
    }

    fn at_offset(&self, position: usize) -> Self {
        Self {
            octets: self.octets,
            position,
            id: self.id,
        }
    }
}
