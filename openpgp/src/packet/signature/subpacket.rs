//! Signature subpackets.
//!
//! OpenPGP signature packets include a set of key-value attributes
//! called subpackets: when a signature was created, who created it,
//! preferences, and so on.  The full details are in [Section 5.2.3.1
//! of RFC 4880].
//!
//! Subpackets live in two areas: the hashed area is protected by the
//! signature, the unhashed area is not.  Each subpacket carries a
//! critical bit; a verifier that encounters a critical subpacket it
//! does not understand is required to reject the signature.
//!
//!   [Section 5.2.3.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.3.1

use std::fmt;
use std::io::Write;

use buffered_reader::BufferedReader;

use crate::Error;
use crate::Fingerprint;
use crate::KeyID;
use crate::Result;
use crate::parse::Cookie;
use crate::types::{CompressionAlgorithm, HashAlgorithm, SymmetricAlgorithm};

/// The subpacket types specified by [Section 5.2.3.1 of RFC 4880].
///
///   [Section 5.2.3.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.3.1
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SubpacketTag {
    /// The time the signature was made.
    SignatureCreationTime,
    /// The validity period of the signature.
    SignatureExpirationTime,
    /// Whether the certification may be exported.
    ExportableCertification,
    /// Trust level and amount of a trust signature.
    TrustSignature,
    /// Regular expression limiting a trust signature.
    RegularExpression,
    /// Whether the signature may be revoked.
    Revocable,
    /// The validity period of the key.
    KeyExpirationTime,
    /// Symmetric algorithm preferences of the key holder.
    PreferredSymmetricAlgorithms,
    /// A key authorized to revoke this key.
    RevocationKey,
    /// The key id of the issuing key.
    Issuer,
    /// A user-defined notation.
    NotationData,
    /// Hash algorithm preferences of the key holder.
    PreferredHashAlgorithms,
    /// Compression algorithm preferences of the key holder.
    PreferredCompressionAlgorithms,
    /// Key server preferences of the key holder.
    KeyServerPreferences,
    /// Preferred key server of the key holder.
    PreferredKeyServer,
    /// Marks the user id as the primary one.
    PrimaryUserID,
    /// A policy URI.
    PolicyURI,
    /// Capabilities of the key.
    KeyFlags,
    /// The user id making the signature.
    SignersUserID,
    /// Why the signature was revoked.
    ReasonForRevocation,
    /// Features supported by the key holder.
    Features,
    /// The target of a third-party confirmation.
    SignatureTarget,
    /// A signature embedded in a signature, e.g. a back signature.
    EmbeddedSignature,
    /// The fingerprint of the issuing key (RFC 4880bis).
    IssuerFingerprint,
    /// Reserved subpacket identifier.
    Reserved(u8),
    /// Private or experimental subpacket identifier.
    Private(u8),
    /// Unknown subpacket identifier.
    Unknown(u8),
}

impl From<u8> for SubpacketTag {
    fn from(u: u8) -> Self {
        use self::SubpacketTag::*;
        match u {
            2 => SignatureCreationTime,
            3 => SignatureExpirationTime,
            4 => ExportableCertification,
            5 => TrustSignature,
            6 => RegularExpression,
            7 => Revocable,
            9 => KeyExpirationTime,
            11 => PreferredSymmetricAlgorithms,
            12 => RevocationKey,
            16 => Issuer,
            20 => NotationData,
            21 => PreferredHashAlgorithms,
            22 => PreferredCompressionAlgorithms,
            23 => KeyServerPreferences,
            24 => PreferredKeyServer,
            25 => PrimaryUserID,
            26 => PolicyURI,
            27 => KeyFlags,
            28 => SignersUserID,
            29 => ReasonForRevocation,
            30 => Features,
            31 => SignatureTarget,
            32 => EmbeddedSignature,
            33 => IssuerFingerprint,
            0 | 1 | 8 | 13..=15 | 17..=19 => Reserved(u),
            100..=110 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<SubpacketTag> for u8 {
    fn from(t: SubpacketTag) -> u8 {
        use self::SubpacketTag::*;
        match t {
            SignatureCreationTime => 2,
            SignatureExpirationTime => 3,
            ExportableCertification => 4,
            TrustSignature => 5,
            RegularExpression => 6,
            Revocable => 7,
            KeyExpirationTime => 9,
            PreferredSymmetricAlgorithms => 11,
            RevocationKey => 12,
            Issuer => 16,
            NotationData => 20,
            PreferredHashAlgorithms => 21,
            PreferredCompressionAlgorithms => 22,
            KeyServerPreferences => 23,
            PreferredKeyServer => 24,
            PrimaryUserID => 25,
            PolicyURI => 26,
            KeyFlags => 27,
            SignersUserID => 28,
            ReasonForRevocation => 29,
            Features => 30,
            SignatureTarget => 31,
            EmbeddedSignature => 32,
            IssuerFingerprint => 33,
            Reserved(u) => u,
            Private(u) => u,
            Unknown(u) => u,
        }
    }
}

/// The value of a subpacket.
///
/// Subpackets this crate does not interpret survive as `Unknown`
/// values; their bytes round trip unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SubpacketValue {
    /// The time the signature was made, seconds since the epoch.
    SignatureCreationTime(u32),
    /// Seconds after the creation time after which the signature
    /// expires.
    SignatureExpirationTime(u32),
    /// Seconds after the key creation time after which the key
    /// expires.
    KeyExpirationTime(u32),
    /// The key id of the issuing key.
    Issuer(KeyID),
    /// The fingerprint of the issuing key.
    IssuerFingerprint(Fingerprint),
    /// Whether the certification may be exported.
    ExportableCertification(bool),
    /// Whether the signature may be revoked.
    Revocable(bool),
    /// Marks the user id as the primary one.
    PrimaryUserID(bool),
    /// Symmetric algorithm preferences, most preferred first.
    PreferredSymmetricAlgorithms(Vec<SymmetricAlgorithm>),
    /// Hash algorithm preferences, most preferred first.
    PreferredHashAlgorithms(Vec<HashAlgorithm>),
    /// Compression algorithm preferences, most preferred first.
    PreferredCompressionAlgorithms(Vec<CompressionAlgorithm>),
    /// Capabilities of the key.
    KeyFlags(Vec<u8>),
    /// Features supported by the key holder.
    Features(Vec<u8>),
    /// The user id making the signature.
    SignersUserID(Vec<u8>),
    /// Why the signature was revoked.
    ReasonForRevocation {
        /// Machine readable revocation code.
        code: u8,
        /// Human readable explanation.
        reason: Vec<u8>,
    },
    /// An uninterpreted subpacket.
    Unknown {
        /// The subpacket's type octet, critical bit cleared.
        tag: u8,
        /// The raw value.
        body: Vec<u8>,
    },
}

impl SubpacketValue {
    /// Returns the tag this value serializes under.
    pub fn tag(&self) -> SubpacketTag {
        use self::SubpacketValue::*;
        match self {
            SignatureCreationTime(_) => SubpacketTag::SignatureCreationTime,
            SignatureExpirationTime(_) =>
                SubpacketTag::SignatureExpirationTime,
            KeyExpirationTime(_) => SubpacketTag::KeyExpirationTime,
            Issuer(_) => SubpacketTag::Issuer,
            IssuerFingerprint(_) => SubpacketTag::IssuerFingerprint,
            ExportableCertification(_) =>
                SubpacketTag::ExportableCertification,
            Revocable(_) => SubpacketTag::Revocable,
            PrimaryUserID(_) => SubpacketTag::PrimaryUserID,
            PreferredSymmetricAlgorithms(_) =>
                SubpacketTag::PreferredSymmetricAlgorithms,
            PreferredHashAlgorithms(_) =>
                SubpacketTag::PreferredHashAlgorithms,
            PreferredCompressionAlgorithms(_) =>
                SubpacketTag::PreferredCompressionAlgorithms,
            KeyFlags(_) => SubpacketTag::KeyFlags,
            Features(_) => SubpacketTag::Features,
            SignersUserID(_) => SubpacketTag::SignersUserID,
            ReasonForRevocation { .. } => SubpacketTag::ReasonForRevocation,
            Unknown { tag, .. } => SubpacketTag::from(*tag),
        }
    }

    fn body(&self) -> Vec<u8> {
        use self::SubpacketValue::*;
        match self {
            SignatureCreationTime(t) | SignatureExpirationTime(t)
            | KeyExpirationTime(t) => t.to_be_bytes().to_vec(),
            Issuer(id) => id.as_bytes().to_vec(),
            IssuerFingerprint(fp) => {
                let mut body = vec![4];
                body.extend_from_slice(fp.as_bytes());
                body
            }
            ExportableCertification(v) | Revocable(v) | PrimaryUserID(v) =>
                vec![if *v { 1 } else { 0 }],
            PreferredSymmetricAlgorithms(algos) =>
                algos.iter().map(|a| u8::from(*a)).collect(),
            PreferredHashAlgorithms(algos) =>
                algos.iter().map(|a| u8::from(*a)).collect(),
            PreferredCompressionAlgorithms(algos) =>
                algos.iter().map(|a| u8::from(*a)).collect(),
            KeyFlags(flags) => flags.clone(),
            Features(features) => features.clone(),
            SignersUserID(uid) => uid.clone(),
            ReasonForRevocation { code, reason } => {
                let mut body = vec![*code];
                body.extend_from_slice(reason);
                body
            }
            Unknown { body, .. } => body.clone(),
        }
    }

    fn parse(tag: u8, body: &[u8]) -> SubpacketValue {
        use self::SubpacketValue::*;

        fn be_u32(body: &[u8]) -> Option<u32> {
            Some(u32::from_be_bytes(body.try_into().ok()?))
        }

        let unknown = || Unknown { tag, body: body.to_vec() };

        match SubpacketTag::from(tag) {
            SubpacketTag::SignatureCreationTime =>
                be_u32(body).map(SignatureCreationTime)
                .unwrap_or_else(unknown),
            SubpacketTag::SignatureExpirationTime =>
                be_u32(body).map(SignatureExpirationTime)
                .unwrap_or_else(unknown),
            SubpacketTag::KeyExpirationTime =>
                be_u32(body).map(KeyExpirationTime)
                .unwrap_or_else(unknown),
            SubpacketTag::Issuer if body.len() == 8 =>
                Issuer(KeyID::from(body)),
            SubpacketTag::IssuerFingerprint
                if body.len() == 21 && body[0] == 4 =>
                IssuerFingerprint(Fingerprint::from(&body[1..])),
            SubpacketTag::ExportableCertification if body.len() == 1 =>
                ExportableCertification(body[0] != 0),
            SubpacketTag::Revocable if body.len() == 1 =>
                Revocable(body[0] != 0),
            SubpacketTag::PrimaryUserID if body.len() == 1 =>
                PrimaryUserID(body[0] != 0),
            SubpacketTag::PreferredSymmetricAlgorithms =>
                PreferredSymmetricAlgorithms(
                    body.iter().map(|&b| b.into()).collect()),
            SubpacketTag::PreferredHashAlgorithms =>
                PreferredHashAlgorithms(
                    body.iter().map(|&b| b.into()).collect()),
            SubpacketTag::PreferredCompressionAlgorithms =>
                PreferredCompressionAlgorithms(
                    body.iter().map(|&b| b.into()).collect()),
            SubpacketTag::KeyFlags => KeyFlags(body.to_vec()),
            SubpacketTag::Features => Features(body.to_vec()),
            SubpacketTag::SignersUserID => SignersUserID(body.to_vec()),
            SubpacketTag::ReasonForRevocation if !body.is_empty() =>
                ReasonForRevocation {
                    code: body[0],
                    reason: body[1..].to_vec(),
                },
            _ => unknown(),
        }
    }
}

/// A subpacket: a tagged value plus the critical bit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subpacket {
    critical: bool,
    value: SubpacketValue,
}

impl Subpacket {
    /// Creates a new subpacket.
    pub fn new(value: SubpacketValue, critical: bool) -> Self {
        Subpacket { critical, value }
    }

    /// Returns whether the critical bit is set.
    pub fn critical(&self) -> bool {
        self.critical
    }

    /// Returns the subpacket's tag.
    pub fn tag(&self) -> SubpacketTag {
        self.value.tag()
    }

    /// Returns the subpacket's value.
    pub fn value(&self) -> &SubpacketValue {
        &self.value
    }

    /// Whether this crate interpreted the value.
    pub fn recognized(&self) -> bool {
        !matches!(self.value, SubpacketValue::Unknown { .. })
    }

    /// Writes the subpacket in wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        let body = self.value.body();
        serialize_length(o, 1 + body.len())?;

        let mut tag = u8::from(self.value.tag());
        if self.critical {
            tag |= 0x80;
        }
        o.write_all(&[tag])?;
        o.write_all(&body)?;
        Ok(())
    }
}

/// Decodes a subpacket length as described in Section 5.2.3.1 of RFC
/// 4880.
fn parse_length(bio: &mut dyn BufferedReader<Cookie>) -> Result<u32> {
    let octet1 = bio.data_consume_hard(1)?[0];
    if octet1 < 192 {
        // One octet.
        return Ok(octet1 as u32);
    }
    if octet1 < 255 {
        // Two octets.
        let octet2 = bio.data_consume_hard(1)?[0];
        return Ok(((octet1 as u32 - 192) << 8) + octet2 as u32 + 192);
    }

    // Five octets.
    Ok(bio.read_be_u32()?)
}

fn serialize_length(o: &mut dyn Write, len: usize) -> Result<()> {
    if len < 192 {
        o.write_all(&[len as u8])?;
    } else if len < 16320 {
        let v = len - 192;
        o.write_all(&[(v / 256) as u8 + 192, (v % 256) as u8])?;
    } else {
        o.write_all(&[0xff])?;
        o.write_all(&(len as u32).to_be_bytes())?;
    }
    Ok(())
}

/// A hashed or unhashed subpacket area.
///
/// The wire bytes are kept verbatim next to the decoded subpackets:
/// the hashed area is covered by the signature exactly as it appeared
/// in the packet, and subpacket ordering is not determined by the
/// decoded form.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpacketArea {
    data: Vec<u8>,
    packets: Vec<Subpacket>,
}

impl fmt::Debug for SubpacketArea {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.packets.iter()).finish()
    }
}

impl SubpacketArea {
    /// Creates an empty area.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses a subpacket area from its wire bytes.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let mut bio = buffered_reader::Memory::with_cookie(
            &data, Cookie::default());
        let mut packets = Vec::new();

        while !bio.data(1)?.is_empty() {
            let len = parse_length(&mut bio)? as usize;
            if len == 0 {
                // A zero length subpacket has no header octet.
                continue;
            }

            let body = bio.data_consume_hard(len).map_err(|_| {
                Error::MalformedPacket(
                    "Subpacket extends beyond the end of its area".into())
            })?[..len].to_vec();

            let tag = body[0];
            let critical = tag & 0x80 != 0;
            let tag = tag & 0x7f;

            packets.push(Subpacket {
                critical,
                value: SubpacketValue::parse(tag, &body[1..]),
            });
        }

        Ok(SubpacketArea { data, packets })
    }

    /// Returns the area's wire bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Iterates over the subpackets.
    pub fn iter(&self) -> impl Iterator<Item = &Subpacket> {
        self.packets.iter()
    }

    /// Returns the last subpacket with the given tag.
    ///
    /// When a tag occurs more than once, later occurrences override
    /// earlier ones.
    pub fn lookup(&self, tag: SubpacketTag) -> Option<&Subpacket> {
        self.packets.iter().rev().find(|sp| sp.tag() == tag)
    }

    /// Returns the critical subpackets this crate does not
    /// understand.
    pub fn unknown_critical(&self) -> impl Iterator<Item = &Subpacket> {
        self.packets.iter().filter(|sp| sp.critical() && !sp.recognized())
    }

    /// Appends a subpacket, replacing any previous subpacket with the
    /// same tag.
    pub fn replace(&mut self, subpacket: Subpacket) -> Result<()> {
        self.packets.retain(|sp| sp.tag() != subpacket.tag());
        self.packets.push(subpacket);
        self.rebuild()
    }

    /// Appends a subpacket.
    pub fn add(&mut self, subpacket: Subpacket) -> Result<()> {
        self.packets.push(subpacket);
        self.rebuild()
    }

    // Re-serializes the wire image after a mutation.  The emitted
    // order is the insertion order.
    fn rebuild(&mut self) -> Result<()> {
        let mut data = Vec::new();
        for sp in &self.packets {
            sp.serialize(&mut data)?;
        }
        if data.len() > 0xffff {
            return Err(Error::InvalidArgument(
                "Subpacket area exceeds 64 KB".into()).into());
        }
        self.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn area_roundtrip() {
        let mut area = SubpacketArea::new();
        area.add(Subpacket::new(
            SubpacketValue::SignatureCreationTime(1136073600), false))
            .unwrap();
        area.add(Subpacket::new(
            SubpacketValue::Issuer(KeyID::from(0xaabbccdd00112233)), false))
            .unwrap();

        let parsed = SubpacketArea::parse(area.data().to_vec()).unwrap();
        assert_eq!(parsed, area);

        match parsed.lookup(SubpacketTag::SignatureCreationTime)
            .unwrap().value()
        {
            SubpacketValue::SignatureCreationTime(t) =>
                assert_eq!(*t, 1136073600),
            _ => panic!("wrong value"),
        }
    }

    #[test]
    fn last_occurrence_wins() {
        let mut area = SubpacketArea::new();
        area.add(Subpacket::new(
            SubpacketValue::SignatureCreationTime(1), false)).unwrap();
        area.add(Subpacket::new(
            SubpacketValue::SignatureCreationTime(2), false)).unwrap();

        let parsed = SubpacketArea::parse(area.data().to_vec()).unwrap();
        assert_eq!(parsed.lookup(SubpacketTag::SignatureCreationTime)
                   .unwrap().value(),
                   &SubpacketValue::SignatureCreationTime(2));
    }

    #[test]
    fn unknown_critical_is_flagged() {
        let mut area = SubpacketArea::new();
        area.add(Subpacket::new(SubpacketValue::Unknown {
            tag: 120,
            body: vec![1, 2, 3],
        }, true)).unwrap();

        let parsed = SubpacketArea::parse(area.data().to_vec()).unwrap();
        assert_eq!(parsed.unknown_critical().count(), 1);
    }

    #[test]
    fn unknown_noncritical_is_tolerated() {
        let mut area = SubpacketArea::new();
        area.add(Subpacket::new(SubpacketValue::Unknown {
            tag: 120,
            body: vec![],
        }, false)).unwrap();

        let parsed = SubpacketArea::parse(area.data().to_vec()).unwrap();
        assert_eq!(parsed.unknown_critical().count(), 0);
        assert_eq!(parsed.iter().count(), 1);
    }

    #[test]
    fn truncated_area_is_rejected() {
        // Claims a 10 byte subpacket, provides 2.
        let err = SubpacketArea::parse(vec![10, 16, 0]).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(),
                         Some(Error::MalformedPacket(_))));
    }

    #[test]
    fn two_octet_length() {
        let body = vec![0u8; 300];
        let mut area = SubpacketArea::new();
        area.add(Subpacket::new(SubpacketValue::Unknown {
            tag: 100,
            body,
        }, false)).unwrap();

        let parsed = SubpacketArea::parse(area.data().to_vec()).unwrap();
        match parsed.iter().next().unwrap().value() {
            SubpacketValue::Unknown { body, .. } =>
                assert_eq!(body.len(), 300),
            _ => panic!("wrong value"),
        }
    }
}
