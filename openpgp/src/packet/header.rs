//! OpenPGP packet headers.
//!
//! A packet starts with a cipher type byte (CTB) in either the old or
//! the new format, followed by a length field whose encoding depends
//! on the format (see [Section 4.2 of RFC 4880]).
//!
//!   [Section 4.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.2

use std::io::Write;

use buffered_reader::BufferedReader;

use crate::Error;
use crate::Result;
use crate::packet::Tag;
use crate::parse::Cookie;

/// A packet's cipher type byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CTB {
    /// Old (pre RFC 2440) format: the tag shares the octet with a
    /// two-bit length type.
    Old {
        /// The packet's tag.  At most four bits wide in this format.
        tag: Tag,
    },
    /// New format: the low six bits carry the tag.
    New {
        /// The packet's tag.
        tag: Tag,
    },
}

impl CTB {
    /// Returns the packet's tag.
    pub fn tag(&self) -> Tag {
        match self {
            CTB::Old { tag } => *tag,
            CTB::New { tag } => *tag,
        }
    }
}

/// The size of a packet's body.
///
/// Old format packets may leave the length indeterminate; new format
/// packets may split the body into partial-length chunks, in which
/// case the header carries the size of the first chunk only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyLength {
    /// The packet's size is known.
    Full(u32),
    /// The parameter is the size of the first chunk, which must be a
    /// power of two.
    Partial(u32),
    /// The packet extends to the end of the stream.
    Indeterminate,
}

impl BodyLength {
    /// Emits the length in the canonical new-format encoding.
    ///
    /// `Indeterminate` cannot be expressed in the new format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        match self {
            BodyLength::Full(l) => {
                let l = *l;
                if l <= 191 {
                    o.write_all(&[l as u8])?;
                } else if l <= 8383 {
                    let v = l - 192;
                    o.write_all(&[(v / 256) as u8 + 192, (v % 256) as u8])?;
                } else {
                    o.write_all(&[0xff])?;
                    o.write_all(&l.to_be_bytes())?;
                }
            }
            BodyLength::Partial(l) => {
                let l = *l;
                if !l.is_power_of_two() || !(512..=1 << 30).contains(&l) {
                    return Err(Error::InvalidArgument(
                        format!("Invalid partial body length: {}", l)).into());
                }
                o.write_all(&[224 + l.trailing_zeros() as u8])?;
            }
            BodyLength::Indeterminate =>
                return Err(Error::InvalidOperation(
                    "Indeterminate lengths are an old-format \
                     construction".into()).into()),
        }
        Ok(())
    }
}

/// An OpenPGP packet's header.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    ctb: CTB,
    length: BodyLength,
    raw: Vec<u8>,
}

impl Header {
    /// Returns the packet's CTB.
    pub fn ctb(&self) -> &CTB {
        &self.ctb
    }

    /// Returns the packet's tag.
    pub fn tag(&self) -> Tag {
        self.ctb.tag()
    }

    /// Returns the packet's length.
    pub fn length(&self) -> &BodyLength {
        &self.length
    }

    /// Returns the header's wire bytes as they appeared in the input.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Parses a packet header from `bio`.
    ///
    /// The consumed bytes are retained verbatim; signatures are
    /// computed over raw serializations, so the original encoding
    /// must survive the decode.
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let mut raw = Vec::with_capacity(6);
        let mut consume = |bio: &mut dyn BufferedReader<Cookie>, n: usize|
            -> Result<Vec<u8>>
        {
            let data = bio.data_consume_hard(n)?[..n].to_vec();
            raw.extend_from_slice(&data);
            Ok(data)
        };

        let ctb = consume(bio, 1)?[0];
        if ctb & 0x80 == 0 {
            return Err(Error::MalformedPacket(
                format!("Invalid CTB 0x{:02x}: bit 7 is clear", ctb)).into());
        }

        let (ctb, length) = if ctb & 0x40 != 0 {
            // New format.
            let tag = Tag::from(ctb & 0x3f);
            let o1 = consume(bio, 1)?[0] as u32;
            let length = match o1 {
                0..=191 => BodyLength::Full(o1),
                192..=223 => {
                    let o2 = consume(bio, 1)?[0] as u32;
                    BodyLength::Full(((o1 - 192) << 8) + o2 + 192)
                }
                224..=254 => BodyLength::Partial(1 << (o1 & 0x1f)),
                255 => {
                    let octets = consume(bio, 4)?;
                    BodyLength::Full(u32::from_be_bytes(
                        octets.try_into().expect("exactly four octets")))
                }
                _ => unreachable!("o1 is an octet"),
            };
            (CTB::New { tag }, length)
        } else {
            // Old format.
            let tag = Tag::from((ctb >> 2) & 0xf);
            let length = match ctb & 3 {
                0 => BodyLength::Full(consume(bio, 1)?[0] as u32),
                1 => {
                    let octets = consume(bio, 2)?;
                    BodyLength::Full(u16::from_be_bytes(
                        octets.try_into().expect("exactly two octets")) as u32)
                }
                2 => {
                    let octets = consume(bio, 4)?;
                    BodyLength::Full(u32::from_be_bytes(
                        octets.try_into().expect("exactly four octets")))
                }
                3 => BodyLength::Indeterminate,
                _ => unreachable!("masked to two bits"),
            };
            (CTB::Old { tag }, length)
        };

        Ok(Header { ctb, length, raw })
    }

    /// Syntax checks the header.
    ///
    /// A header is considered invalid if:
    ///
    ///   - The tag is `Tag::Reserved`.
    ///   - The length encoding is invalid for the packet: partial
    ///     body lengths and the indeterminate length are only
    ///     permitted for the data packets, and an initial partial
    ///     chunk must be at least 512 octets.
    ///   - The length is unreasonable for the packet type.
    ///
    /// This function does not check the packet's content.
    pub fn valid(&self) -> Result<()> {
        let tag = self.tag();

        if tag == Tag::Reserved {
            return Err(Error::UnsupportedPacketType(tag).into());
        }

        if tag.is_data_packet() {
            // An implementation MAY use Partial Body Lengths for data
            // packets.  The first partial length MUST be at least 512
            // octets long.
            //
            // https://tools.ietf.org/html/rfc4880#section-4.2.2.4
            if let BodyLength::Partial(l) = self.length {
                if l < 512 {
                    return Err(Error::MalformedPacket(
                        format!("Partial body length must be at least 512 \
                                 (got: {})", l)).into());
                }
            }
            return Ok(());
        }

        // Non-data packet.
        match self.length {
            BodyLength::Indeterminate =>
                Err(Error::MalformedPacket(
                    format!("Indeterminate length encoding not allowed \
                             for {} packets", tag)).into()),
            BodyLength::Partial(_) =>
                Err(Error::MalformedPacket(
                    format!("Partial body chunking not allowed for {} \
                             packets", tag)).into()),
            BodyLength::Full(l) => {
                let valid = match tag {
                    Tag::Signature =>
                        (7..(10 /* Fixed sized fields.  */
                             + 2 * 64 * 1024 /* Hashed & unhashed areas.  */
                             + 64 * 1024 /* MPIs.  */)).contains(&l),
                    Tag::OnePassSig => l == 13,
                    Tag::PublicKey | Tag::PublicSubkey
                    | Tag::SecretKey | Tag::SecretSubkey =>
                        (6..1024 * 1024).contains(&l),
                    Tag::Marker => l == 3,
                    Tag::MDC => l == 20,
                    Tag::UserID => l < 32 * 1024,
                    Tag::PKESK | Tag::SKESK => l < 10 * 1024,
                    // Zero-length bodies are fine here.
                    Tag::Trust | Tag::UserAttribute
                    | Tag::Unknown(_) | Tag::Private(_) => true,
                    _ => true,
                };

                if !valid {
                    return Err(Error::MalformedPacket(
                        format!("Invalid size ({} bytes) for a {} packet",
                                l, tag)).into());
                }
                Ok(())
            }
        }
    }
}

/// Writes a canonical new-format header for `tag` and `length`.
pub(crate) fn serialize_new_format(o: &mut dyn Write, tag: Tag,
                                   length: BodyLength)
                                   -> Result<()>
{
    o.write_all(&[0b1100_0000 | u8::from(tag)])?;
    length.serialize(o)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use buffered_reader::Memory;

    fn parse(data: &[u8]) -> Result<Header> {
        let mut bio = Memory::with_cookie(data, Cookie::default());
        Header::parse(&mut bio)
    }

    #[test]
    fn new_format_lengths() {
        // One-octet length.
        let h = parse(&[0xc2, 100]).unwrap();
        assert_eq!(h.tag(), Tag::Signature);
        assert_eq!(*h.length(), BodyLength::Full(100));
        assert_eq!(h.raw(), &[0xc2, 100]);

        // Two-octet length.
        let h = parse(&[0xc2, 192, 0]).unwrap();
        assert_eq!(*h.length(), BodyLength::Full(192));
        let h = parse(&[0xc2, 223, 255]).unwrap();
        assert_eq!(*h.length(), BodyLength::Full(8383));

        // Five-octet length.
        let h = parse(&[0xc2, 255, 0, 1, 0, 0]).unwrap();
        assert_eq!(*h.length(), BodyLength::Full(65536));

        // Partial length.
        let h = parse(&[0xcb, 224 + 9]).unwrap();
        assert_eq!(h.tag(), Tag::Literal);
        assert_eq!(*h.length(), BodyLength::Partial(512));
    }

    #[test]
    fn old_format_lengths() {
        // 0x99 = old format, tag 6, two-octet length.
        let h = parse(&[0x99, 0x01, 0x0d]).unwrap();
        assert_eq!(h.tag(), Tag::PublicKey);
        assert_eq!(*h.length(), BodyLength::Full(269));

        // Indeterminate.
        let h = parse(&[0xae]).unwrap();
        assert_eq!(h.tag(), Tag::Literal);
        assert_eq!(*h.length(), BodyLength::Indeterminate);
    }

    #[test]
    fn invalid_ctb() {
        assert!(parse(&[0x3f, 0]).is_err());
    }

    #[test]
    fn length_roundtrip() {
        for l in [0u32, 1, 190, 191, 192, 8382, 8383, 8384, 65536, 1 << 24] {
            let mut buf = Vec::new();
            BodyLength::Full(l).serialize(&mut buf).unwrap();

            let mut header = vec![0xc2];
            header.extend_from_slice(&buf);
            let h = parse(&header).unwrap();
            assert_eq!(*h.length(), BodyLength::Full(l));
        }
    }

    #[test]
    fn partial_below_512_is_invalid() {
        let h = parse(&[0xcb, 224 + 8]).unwrap();
        assert_eq!(*h.length(), BodyLength::Partial(256));
        assert!(h.valid().is_err());

        let h = parse(&[0xcb, 224 + 9]).unwrap();
        assert!(h.valid().is_ok());
    }

    #[test]
    fn partial_for_non_data_is_invalid() {
        let h = parse(&[0xc2, 224 + 10]).unwrap();
        assert_eq!(h.tag(), Tag::Signature);
        assert!(h.valid().is_err());
    }

    #[test]
    fn indeterminate_for_non_data_is_invalid() {
        // Old format, tag 13, indeterminate.
        let h = parse(&[0xb7]).unwrap();
        assert_eq!(h.tag(), Tag::UserID);
        assert!(h.valid().is_err());
    }
}
