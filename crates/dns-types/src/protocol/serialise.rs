//! Encoding messages for the wire (RFC 1035 section 4.1).  Owner
//! names are compressed, names inside RDATA are written out in full.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use std::fmt;

use crate::protocol::types::*;

/// Compression pointers hold a 14-bit offset.
const POINTER_MAX_OFFSET: usize = 0x3FFF;

/// The top two bits of a compression pointer.
const POINTER_TAG: u16 = 0xC000;

impl Message {
    /// # Errors
    ///
    /// If a section or an RDATA field is too long to count in 16 bits.
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        buffer.write_message(self)?;
        Ok(buffer.octets)
    }
}

/// Something a `Message` allows but the wire format does not.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A count or RDLENGTH over 65535.
    CounterTooLarge(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CounterTooLarge(counter) => write!(f, "{counter} does not fit in 16 bits"),
        }
    }
}

impl std::error::Error for Error {}

/// The octets written so far, and where each name was written in
/// full, for compression.
pub struct WritableBuffer {
    pub octets: BytesMut,
    name_offsets: HashMap<DomainName, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_offsets: HashMap::new(),
        }
    }
}

impl WritableBuffer {
    /// # Errors
    ///
    /// If a section or an RDATA field is too long to count in 16 bits.
    pub fn write_message(&mut self, message: &Message) -> Result<(), Error> {
        let sections = [&message.answers, &message.authority, &message.additional];

        self.octets.put_u16(message.header.id);
        self.octets.put_u16(message.header.flags());
        self.octets.put_u16(to_u16(message.questions.len())?);
        for section in sections {
            self.octets.put_u16(to_u16(section.len())?);
        }

        for question in &message.questions {
            self.write_question(question);
        }
        for rr in sections.into_iter().flatten() {
            self.write_record(rr)?;
        }

        Ok(())
    }

    pub fn write_question(&mut self, question: &Question) {
        self.write_name(&question.name, true);
        self.octets.put_u16(question.rtype.into());
        self.octets.put_u16(question.rclass.into());
    }

    /// # Errors
    ///
    /// If the RDATA is over 65535 octets.
    pub fn write_record(&mut self, rr: &ResourceRecord) -> Result<(), Error> {
        self.write_name(&rr.name, true);
        self.octets.put_u16(rr.rtype().into());
        self.octets.put_u16(rr.rclass.into());
        self.octets.put_u32(rr.ttl);

        // RDLENGTH is patched in once the RDATA is written
        let rdlength_at = self.octets.len();
        self.octets.put_u16(0);
        self.write_rdata(&rr.rtype_with_data);

        let rdlength = to_u16(self.octets.len() - rdlength_at - 2)?;
        self.octets[rdlength_at..rdlength_at + 2].copy_from_slice(&rdlength.to_be_bytes());

        Ok(())
    }

    fn write_rdata(&mut self, rtype_with_data: &RecordTypeWithData) {
        match rtype_with_data {
            RecordTypeWithData::A { address } => self.octets.put_slice(&address.octets()),
            RecordTypeWithData::NS { nsdname } => self.write_name(nsdname, false),
            RecordTypeWithData::CNAME { cname } => self.write_name(cname, false),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                self.write_name(mname, false);
                self.write_name(rname, false);
                for field in [serial, refresh, retry, expire, minimum] {
                    self.octets.put_u32(*field);
                }
            }
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                self.octets.put_u16(*preference);
                self.write_name(exchange, false);
            }
            RecordTypeWithData::AAAA { address } => self.octets.put_slice(&address.octets()),
            RecordTypeWithData::Unknown { octets, .. } => self.octets.put_slice(octets),
        }
    }

    /// Write a name.  With `compress`, a name which has already been
    /// written in full becomes a pointer to that.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_name(&mut self, name: &DomainName, compress: bool) {
        if compress {
            if let Some(pointer) = self.name_offsets.get(name).copied() {
                self.octets.put_u16(pointer);
                return;
            }
        }

        let offset = self.octets.len();
        if !name.is_root() && offset <= POINTER_MAX_OFFSET {
            self.name_offsets
                .entry(name.clone())
                .or_insert(POINTER_TAG | offset as u16);
        }

        for label in &name.labels {
            self.octets.put_u8(label.len());
            self.octets.put_slice(label.octets());
        }
    }
}

fn to_u16(counter: usize) -> Result<u16, Error> {
    u16::try_from(counter).map_err(|_| Error::CounterTooLarge(counter))
}
