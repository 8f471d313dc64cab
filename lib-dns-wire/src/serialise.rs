//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.
//!
//! The section counts and each record's RDLENGTH are derived from the
//! message contents here, so a serialised message is always
//! self-consistent.  Names are written uncompressed: the deserialiser
//! accepts compression pointers, but this producer never emits them.

use bytes::{BufMut, BytesMut};

use crate::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets)
    }

    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2: the Z bits between RA and RCODE are zero on send
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & u8::from(self.rcode);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer);
        self.qtype.serialise(buffer);
        self.qclass.serialise(buffer);
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the RDATA is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer);
        self.rtype_with_data.rtype().serialise(buffer);
        self.rclass.serialise(buffer);
        buffer.write_u32(self.ttl);

        // filled in below, once the RDATA length is known
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer),
            RecordTypeWithData::MD { madname } => madname.serialise(buffer),
            RecordTypeWithData::MF { madname } => madname.serialise(buffer),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer);
                rname.serialise(buffer);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordTypeWithData::MB { madname } => madname.serialise(buffer),
            RecordTypeWithData::MG { mdmname } => mdmname.serialise(buffer),
            RecordTypeWithData::MR { newname } => newname.serialise(buffer),
            RecordTypeWithData::NULL { octets } => buffer.write_octets(octets),
            RecordTypeWithData::WKS {
                address,
                protocol,
                bitmap,
            } => {
                buffer.write_octets(&address.octets());
                buffer.write_u8(*protocol);
                buffer.write_octets(bitmap);
            }
            RecordTypeWithData::PTR { ptrdname } => ptrdname.serialise(buffer),
            RecordTypeWithData::HINFO { cpu, os } => {
                cpu.serialise(buffer);
                os.serialise(buffer);
            }
            RecordTypeWithData::MINFO { rmailbx, emailbx } => {
                rmailbx.serialise(buffer);
                emailbx.serialise(buffer);
            }
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer);
            }
            RecordTypeWithData::TXT { strings } => {
                for string in strings {
                    string.serialise(buffer);
                }
            }
            RecordTypeWithData::Unknown { octets, .. } => buffer.write_octets(octets),
        }

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl DomainName {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        for label in &self.labels {
            buffer.write_u8(label.len());
            buffer.write_octets(label.octets());
        }
    }
}

impl CharacterString {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        buffer.write_u8(self.len());
        buffer.write_octets(self.octets());
    }
}

impl QueryType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl QueryClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: BytesMut,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_util::*;

    #[test]
    fn test_header_is_12_octets() {
        let message = Message::from_question(
            0x0102,
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
        .make_truncated();

        let octets = message.to_octets().unwrap();
        assert_eq!(12, octets.len());
        // id, flags (TC set), four zero counts
        assert_eq!(
            vec![1, 2, 0b0000_0010, 0b0000_0000, 0, 0, 0, 0, 0, 0, 0, 0],
            octets.to_vec()
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_names_are_not_compressed() {
        let mut buf = WritableBuffer::default();
        domain("www.example.com.").serialise(&mut buf);
        domain("www.example.com.").serialise(&mut buf);

        assert_eq!(
            vec![
                // domain 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // domain 2, spelled out in full again
                3, 119, 119, 119,
                7, 101, 120, 97, 109, 112, 108, 101,
                3, 99, 111, 109, 0,
            ],
            buf.octets.to_vec(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_sets_rdlength() {
        let mut buf = WritableBuffer::default();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        buf.write_u8(4);

        let rr = ResourceRecord {
            name: domain("www.example.com."),
            rtype_with_data: RecordTypeWithData::MX {
                preference: 32,
                exchange: domain("mx.example.com."),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        rr.serialise(&mut buf).unwrap();

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // NAME
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // TYPE
                0b0000_0000, 0b0000_1111, // MX
                // CLASS
                0b0000_0000, 0b0000_0001, // IN
                // TTL
                0b0000_0000, 0b0000_0000, 0b0000_0001, 0b0010_1100, // 300
                // RDLENGTH
                0b0000_0000, 0b0001_0010, // 18 octets
                // RDATA
                0, 32, // preference
                2, 109, 120, // "mx"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            buf.octets.to_vec(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_txt_charstrings() {
        let mut buf = WritableBuffer::default();

        let rr = ResourceRecord {
            name: domain("example.com."),
            rtype_with_data: RecordTypeWithData::TXT {
                strings: vec![charstring(b"hello"), charstring(b""), charstring(b"world")],
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        rr.serialise(&mut buf).unwrap();

        assert_eq!(
            vec![
                // NAME
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // TYPE
                0, 16, // TXT
                // CLASS
                0, 1, // IN
                // TTL
                0, 0, 1, 0b0010_1100, // 300
                // RDLENGTH: 6 + 1 + 6
                0, 13,
                // RDATA
                5, 104, 101, 108, 108, 111, // "hello"
                0,                          // ""
                5, 119, 111, 114, 108, 100, // "world"
            ],
            buf.octets.to_vec(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_hinfo_charstrings() {
        let mut buf = WritableBuffer::default();

        let rr = ResourceRecord {
            name: domain("host.example.com."),
            rtype_with_data: RecordTypeWithData::HINFO {
                cpu: charstring(b"VAX-11"),
                os: charstring(b"UNIX"),
            },
            rclass: RecordClass::IN,
            ttl: 60,
        };
        rr.serialise(&mut buf).unwrap();

        let octets = buf.octets.to_vec();
        let rdata = &octets[octets.len() - 12..];
        assert_eq!(
            vec![
                6, 86, 65, 88, 45, 49, 49, // "VAX-11"
                4, 85, 78, 73, 88, // "UNIX"
            ],
            rdata.to_vec(),
        );
        // RDLENGTH sits just before the RDATA
        assert_eq!(&[0, 12], &octets[octets.len() - 14..octets.len() - 12]);
    }

    #[test]
    fn test_wks_layout() {
        let mut buf = WritableBuffer::default();

        let rr = ResourceRecord {
            name: domain("host.example.com."),
            rtype_with_data: RecordTypeWithData::WKS {
                address: std::net::Ipv4Addr::new(10, 0, 0, 1),
                protocol: 6,
                bitmap: bytes::Bytes::from_static(&[0b1000_0000, 0b0000_0001]),
            },
            rclass: RecordClass::IN,
            ttl: 60,
        };
        rr.serialise(&mut buf).unwrap();

        let octets = buf.octets.to_vec();
        let rdata = &octets[octets.len() - 7..];
        assert_eq!(vec![10, 0, 0, 1, 6, 0b1000_0000, 0b0000_0001], rdata.to_vec());
        assert_eq!(&[0, 7], &octets[octets.len() - 9..octets.len() - 7]);
    }
}
