//! Packet-related types.
//!
//! OpenPGP data is a sequence of packets, each classified by a
//! one-octet [`Tag`].  This module holds the tag registry, the packet
//! framing ([`header`]), and the decoded forms of the packets this
//! crate understands.

use std::fmt;

pub mod header;
pub use header::{BodyLength, CTB, Header};

pub mod key;
pub use key::{Key, SecretKey};

pub mod signature;
pub use signature::{Signature, SignatureBuilder};

use crate::KeyID;
use crate::types::{CompressionAlgorithm, HashAlgorithm, PublicKeyAlgorithm,
                   SignatureType};

/// The OpenPGP packet tags as defined in [Section 4.3 of RFC 4880].
///
///   [Section 4.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.3
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Tag {
    /// Reserved packet tag.
    Reserved,
    /// Public-Key Encrypted Session Key Packet.
    PKESK,
    /// Signature Packet.
    Signature,
    /// Symmetric-Key Encrypted Session Key Packet.
    SKESK,
    /// One-Pass Signature Packet.
    OnePassSig,
    /// Secret-Key Packet.
    SecretKey,
    /// Public-Key Packet.
    PublicKey,
    /// Secret-Subkey Packet.
    SecretSubkey,
    /// Compressed Data Packet.
    CompressedData,
    /// Symmetrically Encrypted Data Packet.
    SED,
    /// Marker Packet (Obsolete Literal Packet).
    Marker,
    /// Literal Data Packet.
    Literal,
    /// Trust Packet.
    Trust,
    /// User ID Packet.
    UserID,
    /// Public-Subkey Packet.
    PublicSubkey,
    /// User Attribute Packet.
    UserAttribute,
    /// Sym. Encrypted and Integrity Protected Data Packet.
    SEIP,
    /// Modification Detection Code Packet.
    MDC,
    /// Unassigned packets (as of RFC 4880).
    Unknown(u8),
    /// Experimental packets.
    Private(u8),
}

impl From<u8> for Tag {
    fn from(u: u8) -> Self {
        use self::Tag::*;
        match u {
            0 => Reserved,
            1 => PKESK,
            2 => Signature,
            3 => SKESK,
            4 => OnePassSig,
            5 => SecretKey,
            6 => PublicKey,
            7 => SecretSubkey,
            8 => CompressedData,
            9 => SED,
            10 => Marker,
            11 => Literal,
            12 => Trust,
            13 => UserID,
            14 => PublicSubkey,
            17 => UserAttribute,
            18 => SEIP,
            19 => MDC,
            60..=63 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<Tag> for u8 {
    fn from(t: Tag) -> u8 {
        use self::Tag::*;
        match t {
            Reserved => 0,
            PKESK => 1,
            Signature => 2,
            SKESK => 3,
            OnePassSig => 4,
            SecretKey => 5,
            PublicKey => 6,
            SecretSubkey => 7,
            CompressedData => 8,
            SED => 9,
            Marker => 10,
            Literal => 11,
            Trust => 12,
            UserID => 13,
            PublicSubkey => 14,
            UserAttribute => 17,
            SEIP => 18,
            MDC => 19,
            Unknown(u) => u,
            Private(u) => u,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Tag::*;
        match *self {
            Reserved =>
                f.write_str("Reserved - a packet tag MUST NOT have this value"),
            PKESK => f.write_str("Public-Key Encrypted Session Key Packet"),
            Signature => f.write_str("Signature Packet"),
            SKESK => f.write_str("Symmetric-Key Encrypted Session Key Packet"),
            OnePassSig => f.write_str("One-Pass Signature Packet"),
            SecretKey => f.write_str("Secret-Key Packet"),
            PublicKey => f.write_str("Public-Key Packet"),
            SecretSubkey => f.write_str("Secret-Subkey Packet"),
            CompressedData => f.write_str("Compressed Data Packet"),
            SED => f.write_str("Symmetrically Encrypted Data Packet"),
            Marker => f.write_str("Marker Packet"),
            Literal => f.write_str("Literal Data Packet"),
            Trust => f.write_str("Trust Packet"),
            UserID => f.write_str("User ID Packet"),
            PublicSubkey => f.write_str("Public-Subkey Packet"),
            UserAttribute => f.write_str("User Attribute Packet"),
            SEIP =>
                f.write_str("Sym. Encrypted and Integrity Protected Data Packet"),
            MDC => f.write_str("Modification Detection Code Packet"),
            Private(u) =>
                f.write_fmt(format_args!("Private/Experimental Packet {}", u)),
            Unknown(u) => f.write_fmt(format_args!("Unknown Packet {}", u)),
        }
    }
}

impl Tag {
    /// Whether this is one of the data packets that may use partial
    /// body lengths and the indeterminate old-format length.
    pub fn is_data_packet(&self) -> bool {
        matches!(self, Tag::Literal | Tag::CompressedData
                 | Tag::SED | Tag::SEIP)
    }
}

/// Holds a UserID packet.
///
/// The body is a free-form byte sequence, by convention a UTF-8
/// encoded RFC 2822 mailbox.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UserID {
    value: Vec<u8>,
}

impl From<Vec<u8>> for UserID {
    fn from(value: Vec<u8>) -> Self {
        UserID { value }
    }
}

impl From<&str> for UserID {
    fn from(value: &str) -> Self {
        UserID { value: value.as_bytes().to_vec() }
    }
}

impl UserID {
    /// Returns the raw value of the UserID packet.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for UserID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("UserID")
            .field(&String::from_utf8_lossy(&self.value))
            .finish()
    }
}

impl fmt::Display for UserID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.value))
    }
}

/// Holds a UserAttribute packet.
///
/// The body is kept as an opaque subpacket blob; image subpackets are
/// not interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserAttribute {
    value: Vec<u8>,
}

impl From<Vec<u8>> for UserAttribute {
    fn from(value: Vec<u8>) -> Self {
        UserAttribute { value }
    }
}

impl UserAttribute {
    /// Returns the raw value of the UserAttribute packet.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Holds a Marker packet.
///
/// The body is the constant `PGP`; the packet is ignored by everyone,
/// including this crate's keyring accumulator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Marker {
}

impl Marker {
    pub(crate) const BODY: &'static [u8] = b"PGP";
}

/// Holds a Trust packet.
///
/// Trust packets are implementation-private bookkeeping emitted into
/// keyrings by some OpenPGP implementations; they carry no
/// standardized meaning and are surfaced as opaque bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Trust {
    value: Vec<u8>,
}

impl From<Vec<u8>> for Trust {
    fn from(value: Vec<u8>) -> Self {
        Trust { value }
    }
}

impl Trust {
    /// Returns the raw value of the Trust packet.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for Trust {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Trust")
            .field(&format!("{} bytes", self.value.len()))
            .finish()
    }
}

/// The format octet of a Literal Data packet (see [Section 5.9 of RFC
/// 4880]).
///
///   [Section 5.9 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.9
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DataFormat {
    /// Binary data.
    Binary,
    /// Text data, line endings local to the producer.
    Text,
    /// Text data, UTF-8 encoded.
    Unicode,
    /// Any other format octet.
    Unknown(u8),
}

impl From<u8> for DataFormat {
    fn from(u: u8) -> Self {
        match u {
            b'b' => DataFormat::Binary,
            b't' => DataFormat::Text,
            b'u' => DataFormat::Unicode,
            u => DataFormat::Unknown(u),
        }
    }
}

impl From<DataFormat> for u8 {
    fn from(f: DataFormat) -> u8 {
        match f {
            DataFormat::Binary => b'b',
            DataFormat::Text => b't',
            DataFormat::Unicode => b'u',
            DataFormat::Unknown(u) => u,
        }
    }
}

/// Holds the metadata of a Literal Data packet.
///
/// The body itself is streamed to the visitor in chunks; this packet
/// only carries the header fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    format: DataFormat,
    filename: Vec<u8>,
    date: u32,
}

impl Literal {
    /// Creates a new literal data header.
    pub fn new(format: DataFormat) -> Self {
        Literal {
            format,
            filename: Vec::new(),
            date: 0,
        }
    }

    /// Returns the data format.
    pub fn format(&self) -> DataFormat {
        self.format
    }

    /// Returns the suggested file name, if any.
    pub fn filename(&self) -> Option<&[u8]> {
        if self.filename.is_empty() {
            None
        } else {
            Some(&self.filename)
        }
    }

    /// Sets the suggested file name.  At most 255 bytes.
    pub fn set_filename(&mut self, filename: &[u8]) -> crate::Result<()> {
        if filename.len() > 255 {
            return Err(crate::Error::InvalidArgument(
                "filename too long".into()).into());
        }
        self.filename = filename.to_vec();
        Ok(())
    }

    /// Returns the modification date, seconds since the epoch, 0 for
    /// unknown.
    pub fn date(&self) -> u32 {
        self.date
    }

    /// Sets the modification date.
    pub fn set_date(&mut self, date: u32) {
        self.date = date;
    }
}

/// Holds a One-Pass Signature packet (see [Section 5.4 of RFC 4880]).
///
/// It is emitted in front of the signed data so a verifier can start
/// hashing immediately; the matching Signature packet follows the
/// data.
///
///   [Section 5.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.4
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OnePassSig {
    typ: SignatureType,
    hash_algo: HashAlgorithm,
    pk_algo: PublicKeyAlgorithm,
    issuer: KeyID,
    last: bool,
}

impl OnePassSig {
    /// Creates a new one-pass-signature packet.
    pub fn new(typ: SignatureType, hash_algo: HashAlgorithm,
               pk_algo: PublicKeyAlgorithm, issuer: KeyID)
               -> Self
    {
        OnePassSig {
            typ,
            hash_algo,
            pk_algo,
            issuer,
            last: true,
        }
    }

    /// Returns the signature type.
    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    /// Returns the hash algorithm.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Returns the public key algorithm.
    pub fn pk_algo(&self) -> PublicKeyAlgorithm {
        self.pk_algo
    }

    /// Returns the issuer.
    pub fn issuer(&self) -> &KeyID {
        &self.issuer
    }

    /// Returns whether this is the last one-pass-signature packet in
    /// front of the data.
    pub fn last(&self) -> bool {
        self.last
    }

    /// Sets whether this is the last one-pass-signature packet.
    pub fn set_last(&mut self, last: bool) {
        self.last = last;
    }
}

/// Holds the header of a Compressed Data packet.
///
/// The compressed body is surfaced raw; decompression is outside
/// this crate's scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompressedData {
    algo: CompressionAlgorithm,
}

impl CompressedData {
    /// Creates a new compressed data header.
    pub fn new(algo: CompressionAlgorithm) -> Self {
        CompressedData { algo }
    }

    /// Returns the compression algorithm.
    pub fn algo(&self) -> CompressionAlgorithm {
        self.algo
    }
}

/// Holds an unknown packet.
///
/// Also used for packets that are understood but out of scope, like
/// the encryption containers.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Unknown {
    tag: Tag,
    body: Vec<u8>,
}

impl Unknown {
    /// Creates a new unknown packet.
    pub fn new(tag: Tag, body: Vec<u8>) -> Self {
        Unknown { tag, body }
    }

    /// Returns the tag the packet arrived with.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns the raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl fmt::Debug for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Unknown")
            .field("tag", &self.tag)
            .field("body", &format!("{} bytes", self.body.len()))
            .finish()
    }
}
