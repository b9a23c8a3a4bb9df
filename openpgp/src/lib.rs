//! OpenPGP packet parsing, keyrings, and signature verification.
//!
//! This crate implements the core of [RFC 4880]: a streaming parser
//! for binary OpenPGP packets with ASCII armor decoding, a keyring
//! model over the parsed packets, and a signature verification and
//! creation engine for RSA and DSA keys.
//!
//! Parsing is pull-based and visitor-driven: the [`parse::Parser`]
//! decodes one packet at a time and hands each typed content event to
//! a [`parse::Visitor`].  Events own their data; whatever the visitor
//! does not keep is dropped when the callback returns.  The
//! [`Keyring`] accumulator and the verification routines are
//! visitors like any other.
//!
//! Signatures are computed over exact wire bytes, not over decoded
//! structures.  The parser therefore hands every packet to the
//! visitor together with its raw serialization, and the reader stack
//! can tee consumed bytes into live hash contexts (see
//! [`parse::HashedReader`]).
//!
//! A non-goal of this crate is any sort of trust policy: whether a
//! key should be believed is up to the caller.  Message encryption
//! and decryption, key generation, and compression are also out of
//! scope.
//!
//! [RFC 4880]: https://tools.ietf.org/html/rfc4880

#![warn(missing_docs)]

pub mod armor;
pub mod cleartext;
pub mod crypto;

pub mod packet;
use crate::packet::Tag;

pub mod parse;
pub mod serialize;

mod keyring;
pub use keyring::{Entry, Keyring, RawPacket, SubkeyBinding, UserIDBinding,
                  Validation, Validity};

pub mod types;
use crate::types::{
    HashAlgorithm,
    PublicKeyAlgorithm,
    SignatureType,
    SymmetricAlgorithm,
};

mod fingerprint;
mod keyid;
pub mod s2k;

/// Crate result specialization.
pub type Result<T> = ::std::result::Result<T, anyhow::Error>;

#[derive(thiserror::Error, Debug, Clone)]
/// Errors returned by this crate.
///
/// Note: This enum cannot be exhaustively matched to allow future
/// extensions.
#[non_exhaustive]
pub enum Error {
    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A malformed packet.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// A malformed ASCII armor block.
    #[error("Malformed armor: {0}")]
    MalformedArmor(String),

    /// A malformed packet sequence.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A packet sequence that does not describe a keyring.
    #[error("Malformed keyring: {0}")]
    MalformedKeyring(String),

    /// Malformed MPI.
    #[error("Malformed MPI: {0}")]
    MalformedMPI(String),

    /// Data remained after the logical end of an object.
    #[error("Unconsumed data: {0}")]
    TrailingData(String),

    /// Unsupported packet type.
    #[error("Unsupported packet type.  Tag: {0}")]
    UnsupportedPacketType(Tag),

    /// Unsupported hash algorithm identifier.
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(HashAlgorithm),

    /// Unsupported public key algorithm identifier.
    #[error("Unsupported public key algorithm: {0}")]
    UnsupportedPublicKeyAlgorithm(PublicKeyAlgorithm),

    /// Unsupported symmetric key algorithm.
    #[error("Unsupported symmetric algorithm: {0}")]
    UnsupportedSymmetricAlgorithm(SymmetricAlgorithm),

    /// Unsupported signature type.
    #[error("Unsupported signature type: {0}")]
    UnsupportedSignatureType(SignatureType),

    /// A signature carries an unknown subpacket marked critical.
    ///
    /// Such a signature must not verify, whatever the cryptography
    /// says.
    #[error("Unknown critical subpacket: {0}")]
    UnsupportedCriticalSubpacket(u8),

    /// Bad signature.
    #[error("Bad signature: {0}")]
    BadSignature(String),

    /// The alleged signer is not present in the keyring.
    #[error("Unknown signer: {0}")]
    UnknownSigner(KeyID),

    /// Invalid password.
    #[error("Invalid password")]
    InvalidPassword,

    /// Index out of range.
    #[error("Index out of range")]
    IndexOutOfRange,
}

/// The OpenPGP packets this crate understands.
///
/// The different OpenPGP packets are detailed in [Section 5 of RFC 4880].
///
/// The `Unknown` packet allows the parser to deal with packets that
/// it doesn't understand.  It is a binary blob that includes the
/// packet's tag; encrypted-data packets, for instance, decode to
/// `Unknown`, since decryption is outside this crate's scope.
///
///   [Section 5 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5
#[derive(Debug, PartialEq, Clone)]
pub enum Packet {
    /// Unknown packet.
    Unknown(packet::Unknown),
    /// Signature packet.
    Signature(packet::Signature),
    /// One pass signature packet.
    OnePassSig(packet::OnePassSig),
    /// Public key packet.
    PublicKey(packet::Key),
    /// Public subkey packet.
    PublicSubkey(packet::Key),
    /// Secret key packet.
    SecretKey(packet::SecretKey),
    /// Secret subkey packet.
    SecretSubkey(packet::SecretKey),
    /// Marker packet.
    Marker(packet::Marker),
    /// Trust packet.
    Trust(packet::Trust),
    /// User ID packet.
    UserID(packet::UserID),
    /// User attribute packet.
    UserAttribute(packet::UserAttribute),
    /// Literal data packet.  Carries the metadata; the body is
    /// streamed separately.
    Literal(packet::Literal),
    /// Compressed data packet.  Carries the compression header; the
    /// body is surfaced raw.
    CompressedData(packet::CompressedData),
}

impl Packet {
    /// Returns the `Packet's` corresponding OpenPGP tag.
    ///
    /// Tags are explained in [Section 4.3 of RFC 4880].
    ///
    ///   [Section 4.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.3
    pub fn tag(&self) -> Tag {
        match self {
            Packet::Unknown(packet) => packet.tag(),
            Packet::Signature(_) => Tag::Signature,
            Packet::OnePassSig(_) => Tag::OnePassSig,
            Packet::PublicKey(_) => Tag::PublicKey,
            Packet::PublicSubkey(_) => Tag::PublicSubkey,
            Packet::SecretKey(_) => Tag::SecretKey,
            Packet::SecretSubkey(_) => Tag::SecretSubkey,
            Packet::Marker(_) => Tag::Marker,
            Packet::Trust(_) => Tag::Trust,
            Packet::UserID(_) => Tag::UserID,
            Packet::UserAttribute(_) => Tag::UserAttribute,
            Packet::Literal(_) => Tag::Literal,
            Packet::CompressedData(_) => Tag::CompressedData,
        }
    }

    /// Returns the parsed `Packet's` corresponding OpenPGP tag.
    ///
    /// Returns the packet's tag, but only if it was successfully
    /// parsed into the corresponding packet type.  If e.g. a packet
    /// uses some unsupported options, it is parsed into a
    /// `Packet::Unknown`.  `tag()` returns `Tag::Signature`, whereas
    /// `kind()` returns `None`.
    pub fn kind(&self) -> Option<Tag> {
        match self {
            Packet::Unknown(_) => None,
            _ => Some(self.tag()),
        }
    }
}

/// Holds a fingerprint.
///
/// A fingerprint uniquely identifies a public key.  For more details
/// about how a fingerprint is generated, see [Section 12.2 of RFC
/// 4880].
///
///   [Section 12.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-12.2
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub enum Fingerprint {
    /// 20 byte SHA-1 hash.
    V4([u8; 20]),
    /// 16 byte MD5 hash over the public key material (version 3
    /// keys).
    V3([u8; 16]),
    /// Used for holding fingerprints that we don't understand.
    Invalid(Box<[u8]>),
}

/// Holds a KeyID.
///
/// A KeyID is a fingerprint fragment.  It identifies a public key,
/// but is easy to forge.  For more details about how a KeyID is
/// generated, see [Section 12.2 of RFC 4880].
///
///   [Section 12.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-12.2
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub enum KeyID {
    /// Lower 8 bytes of either the SHA-1 fingerprint (v4) or the RSA
    /// modulus (v3).
    Long([u8; 8]),
    /// Used for holding key ids that we don't understand.
    Invalid(Box<[u8]>),
}
