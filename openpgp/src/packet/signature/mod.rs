//! Signature packets and the machinery to verify and create them.
//!
//! Every signature type has a well-defined signed entity: a
//! certification covers the primary key and a user id, a subkey
//! binding covers the primary key and the subkey, a document
//! signature covers the document bytes.  The functions here know, per
//! signature version and type, which byte ranges are mixed into the
//! hash in which order; the raw entity bytes come from the packets
//! captured at parse time.
//!
//! See [Section 5.2 of RFC 4880].
//!
//!   [Section 5.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2

use std::fmt;

use buffered_reader::BufferedReader;

use crate::Error;
use crate::KeyID;
use crate::Result;
use crate::crypto::asymmetric;
use crate::crypto::hash::{Context, Hash};
use crate::crypto::mpi;
use crate::packet::{Key, UserAttribute, UserID};
use crate::parse::Cookie;
use crate::types::{HashAlgorithm, PublicKeyAlgorithm, SignatureType};

pub mod subpacket;
pub use subpacket::{Subpacket, SubpacketArea, SubpacketTag, SubpacketValue};

/// Holds a signature packet, version 3 or 4.
///
/// v3 signatures carry their creation time and issuer inline; v4
/// signatures carry them as subpackets.  The accessors below
/// normalize over the difference.
#[derive(Clone)]
pub struct Signature {
    version: u8,
    typ: SignatureType,
    pk_algo: PublicKeyAlgorithm,
    hash_algo: HashAlgorithm,
    hashed_area: SubpacketArea,
    unhashed_area: SubpacketArea,
    /// Inline creation time of a v3 signature.
    v3_creation_time: Option<u32>,
    /// Inline issuer of a v3 signature.
    v3_issuer: Option<KeyID>,
    /// The leading 16 bits of the signed digest.
    hash_prefix: [u8; 2],
    mpis: mpi::Signature,
    /// The digest the parser computed over the signed data, if any
    /// (one-pass signatures, signed cleartext).
    computed_digest: Option<Vec<u8>>,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Signature")
            .field("version", &self.version)
            .field("typ", &self.typ)
            .field("pk_algo", &self.pk_algo)
            .field("hash_algo", &self.hash_algo)
            .field("hashed_area", &self.hashed_area)
            .field("unhashed_area", &self.unhashed_area)
            .field("hash_prefix",
                   &format!("{:02X}{:02X}",
                            self.hash_prefix[0], self.hash_prefix[1]))
            .finish()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Signature) -> bool {
        // The computed digest is parser state, not packet content.
        self.version == other.version
            && self.typ == other.typ
            && self.pk_algo == other.pk_algo
            && self.hash_algo == other.hash_algo
            && self.hashed_area == other.hashed_area
            && self.unhashed_area == other.unhashed_area
            && self.v3_creation_time == other.v3_creation_time
            && self.v3_issuer == other.v3_issuer
            && self.hash_prefix == other.hash_prefix
            && self.mpis == other.mpis
    }
}

impl Signature {
    /// Returns the signature's version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the signature's type.
    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    /// Returns the public key algorithm.
    pub fn pk_algo(&self) -> PublicKeyAlgorithm {
        self.pk_algo
    }

    /// Returns the hash algorithm.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Returns the hashed subpacket area.
    pub fn hashed_area(&self) -> &SubpacketArea {
        &self.hashed_area
    }

    /// Returns the unhashed subpacket area.
    pub fn unhashed_area(&self) -> &SubpacketArea {
        &self.unhashed_area
    }

    /// Returns the leading two bytes of the signed digest.
    pub fn hash_prefix(&self) -> &[u8; 2] {
        &self.hash_prefix
    }

    /// Returns the signature MPIs.
    pub fn mpis(&self) -> &mpi::Signature {
        &self.mpis
    }

    /// Returns the time the signature was made, in seconds since the
    /// epoch.
    pub fn signature_creation_time(&self) -> Option<u32> {
        if self.version == 3 {
            return self.v3_creation_time;
        }
        match self.hashed_area
            .lookup(SubpacketTag::SignatureCreationTime)
            .map(|sp| sp.value())
        {
            Some(SubpacketValue::SignatureCreationTime(t)) => Some(*t),
            _ => None,
        }
    }

    /// Returns the id of the alleged signer.
    ///
    /// For v4 signatures the hashed area takes precedence over the
    /// unhashed one; an issuer fingerprint stands in for a missing
    /// issuer subpacket.
    pub fn issuer(&self) -> Option<KeyID> {
        if self.version == 3 {
            return self.v3_issuer.clone();
        }

        for area in [&self.hashed_area, &self.unhashed_area] {
            match area.lookup(SubpacketTag::Issuer).map(|sp| sp.value()) {
                Some(SubpacketValue::Issuer(id)) => return Some(id.clone()),
                _ => (),
            }
        }
        for area in [&self.hashed_area, &self.unhashed_area] {
            match area.lookup(SubpacketTag::IssuerFingerprint)
                .map(|sp| sp.value())
            {
                Some(SubpacketValue::IssuerFingerprint(fp)) =>
                    return Some(fp.keyid()),
                _ => (),
            }
        }
        None
    }

    /// Returns the digest the parser computed over the signed data,
    /// if this signature followed a one-pass signature or a signed
    /// cleartext region.
    pub fn computed_digest(&self) -> Option<&[u8]> {
        self.computed_digest.as_deref()
    }

    pub(crate) fn set_computed_digest(&mut self, digest: Option<Vec<u8>>) {
        self.computed_digest = digest;
    }

    /// Parses a signature packet body.
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let version = bio.data_consume_hard(1)?[0];
        match version {
            3 => Self::parse_v3(bio),
            4 => Self::parse_v4(bio),
            _ => Err(Error::MalformedPacket(
                format!("Unsupported signature version {}", version)).into()),
        }
    }

    fn parse_v3(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let len = bio.data_consume_hard(1)?[0];
        if len != 5 {
            return Err(Error::MalformedPacket(
                format!("v3 signature: hashed length must be 5, got {}",
                        len)).into());
        }
        let typ = SignatureType::from(bio.data_consume_hard(1)?[0]);
        let creation_time = bio.read_be_u32()?;
        let issuer = KeyID::from(&bio.data_consume_hard(8)?[..8]);
        let pk_algo = PublicKeyAlgorithm::from(bio.data_consume_hard(1)?[0]);
        let hash_algo = HashAlgorithm::from(bio.data_consume_hard(1)?[0]);
        let mut hash_prefix = [0u8; 2];
        hash_prefix.copy_from_slice(&bio.data_consume_hard(2)?[..2]);
        let mpis = mpi::Signature::parse(pk_algo, bio)?;

        Ok(Signature {
            version: 3,
            typ,
            pk_algo,
            hash_algo,
            hashed_area: SubpacketArea::new(),
            unhashed_area: SubpacketArea::new(),
            v3_creation_time: Some(creation_time),
            v3_issuer: Some(issuer),
            hash_prefix,
            mpis,
            computed_digest: None,
        })
    }

    fn parse_v4(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let typ = SignatureType::from(bio.data_consume_hard(1)?[0]);
        let pk_algo = PublicKeyAlgorithm::from(bio.data_consume_hard(1)?[0]);
        let hash_algo = HashAlgorithm::from(bio.data_consume_hard(1)?[0]);

        let hashed_len = bio.read_be_u16()? as usize;
        let hashed_area = SubpacketArea::parse(
            bio.data_consume_hard(hashed_len)?[..hashed_len].to_vec())?;

        let unhashed_len = bio.read_be_u16()? as usize;
        let unhashed_area = SubpacketArea::parse(
            bio.data_consume_hard(unhashed_len)?[..unhashed_len].to_vec())?;

        let mut hash_prefix = [0u8; 2];
        hash_prefix.copy_from_slice(&bio.data_consume_hard(2)?[..2]);
        let mpis = mpi::Signature::parse(pk_algo, bio)?;

        Ok(Signature {
            version: 4,
            typ,
            pk_algo,
            hash_algo,
            hashed_area,
            unhashed_area,
            v3_creation_time: None,
            v3_issuer: None,
            hash_prefix,
            mpis,
            computed_digest: None,
        })
    }
}

/// Verification.
impl Signature {
    // A signature whose hashed area carries a critical subpacket we
    // do not understand must not verify, whatever the cryptography
    // says.
    fn reject_unknown_critical(&self) -> Result<()> {
        if let Some(sp) = self.hashed_area.unknown_critical().next() {
            return Err(Error::UnsupportedCriticalSubpacket(
                u8::from(sp.tag())).into());
        }
        Ok(())
    }

    /// Checks the signature against the digest of the canonical
    /// signed data, trailer included.
    ///
    /// Returns whether `signer` made the signature.  This function
    /// does not check whether `signer` should be trusted to make the
    /// signature; it answers the cryptographic question only.
    pub fn verify_digest(&self, signer: &Key, digest: &[u8]) -> Result<bool> {
        self.reject_unknown_critical()?;

        // The stored prefix gives a fast reject before the public key
        // operation.
        if digest.len() < 2 || digest[..2] != self.hash_prefix {
            return Ok(false);
        }

        asymmetric::verify_digest(self.pk_algo, signer.mpis(), &self.mpis,
                                  self.hash_algo, digest)
    }

    /// Finishes `hash` with this signature's trailer and checks the
    /// result.
    ///
    /// `hash` must already contain the signed data: the dash-escaped
    /// cleartext region, the document bytes, or the framed entities.
    pub fn verify_hash(&self, signer: &Key, mut hash: Context)
                       -> Result<bool>
    {
        if hash.algo() != self.hash_algo {
            return Err(Error::BadSignature(format!(
                "Hash context uses {}, signature needs {}",
                hash.algo(), self.hash_algo)).into());
        }
        self.hash(&mut hash);
        self.verify_digest(signer, &hash.into_digest())
    }

    /// Verifies a signature over a document.
    ///
    /// `Binary` documents are hashed as-is; `Text` documents are
    /// hashed with line endings normalized to CR-LF.
    pub fn verify_document(&self, signer: &Key, data: &[u8]) -> Result<bool> {
        let mut hash = self.hash_algo.context()?;
        match self.typ {
            SignatureType::Binary => hash.update(data),
            SignatureType::Text => hash_canonical_text(&mut hash, data),
            _ => return Err(Error::UnsupportedSignatureType(self.typ).into()),
        }
        self.verify_hash(signer, hash)
    }

    /// Verifies the signature using the digest computed by the
    /// parser.
    ///
    /// This is the path for one-pass signed messages, where the
    /// reader stack teed the literal data into a hash context.
    pub fn verify(&self, signer: &Key) -> Result<bool> {
        if !(self.typ == SignatureType::Binary
             || self.typ == SignatureType::Text
             || self.typ == SignatureType::Standalone) {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        match &self.computed_digest {
            Some(digest) => self.verify_digest(signer, digest),
            None => Err(Error::BadSignature(
                "Hash not computed".into()).into()),
        }
    }

    /// Verifies a standalone signature.
    pub fn verify_standalone(&self, signer: &Key) -> Result<bool> {
        if self.typ != SignatureType::Standalone {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.standalone_hash()?)
    }

    /// Verifies a timestamp signature.
    pub fn verify_timestamp(&self, signer: &Key) -> Result<bool> {
        if self.typ != SignatureType::Timestamp {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.standalone_hash()?)
    }

    /// Verifies a direct key signature.
    ///
    /// `signer` is the key that allegedly made the signature, `key`
    /// the key the signature sits on.  For a self-signature the two
    /// are the same.
    pub fn verify_direct_key(&self, signer: &Key, key: &Key) -> Result<bool> {
        if self.typ != SignatureType::DirectKey {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.direct_key_hash(key)?)
    }

    /// Verifies a key revocation.
    pub fn verify_key_revocation(&self, signer: &Key, key: &Key)
                                 -> Result<bool>
    {
        if self.typ != SignatureType::KeyRevocation {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.direct_key_hash(key)?)
    }

    /// Verifies a subkey binding.
    ///
    /// `signer` is the key that allegedly made the signature, `key`
    /// the primary key, `subkey` the subkey being bound.
    pub fn verify_subkey_binding(&self, signer: &Key, key: &Key,
                                 subkey: &Key)
                                 -> Result<bool>
    {
        if self.typ != SignatureType::SubkeyBinding {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.subkey_binding_hash(key, subkey)?)
    }

    /// Verifies a subkey revocation.
    pub fn verify_subkey_revocation(&self, signer: &Key, key: &Key,
                                    subkey: &Key)
                                    -> Result<bool>
    {
        if self.typ != SignatureType::SubkeyRevocation {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.subkey_binding_hash(key, subkey)?)
    }

    /// Verifies a primary key binding, i.e. a back signature.
    ///
    /// `subkey` is the signing-capable subkey that made it.
    pub fn verify_primary_key_binding(&self, key: &Key, subkey: &Key)
                                      -> Result<bool>
    {
        if self.typ != SignatureType::PrimaryKeyBinding {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(subkey, &self.subkey_binding_hash(key, subkey)?)
    }

    /// Verifies a certification over a user id.
    ///
    /// `signer` is the key that allegedly made the signature, `key`
    /// the primary key, `userid` the user id being certified.
    pub fn verify_userid_binding(&self, signer: &Key, key: &Key,
                                 userid: &UserID)
                                 -> Result<bool>
    {
        if !self.typ.is_certification() {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.userid_binding_hash(key, userid)?)
    }

    /// Verifies a certification revocation over a user id.
    pub fn verify_userid_revocation(&self, signer: &Key, key: &Key,
                                    userid: &UserID)
                                    -> Result<bool>
    {
        if self.typ != SignatureType::CertificationRevocation {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(signer, &self.userid_binding_hash(key, userid)?)
    }

    /// Verifies a certification over a user attribute.
    pub fn verify_user_attribute_binding(&self, signer: &Key, key: &Key,
                                         ua: &UserAttribute)
                                         -> Result<bool>
    {
        if !self.typ.is_certification() {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        self.verify_digest(
            signer, &self.user_attribute_binding_hash(key, ua)?)
    }
}

/// Builds a signature packet: the creation side of the engine.
///
/// The builder accumulates the signature type, hash algorithm, and
/// subpackets; the `sign_*` methods consume it together with a hash
/// context holding the signed entity, and emit a complete v4
/// signature packet.
#[derive(Clone, Debug)]
pub struct SignatureBuilder {
    typ: SignatureType,
    hash_algo: HashAlgorithm,
    hashed_area: SubpacketArea,
    unhashed_area: SubpacketArea,
}

impl SignatureBuilder {
    /// Creates a new builder for the given signature type.
    pub fn new(typ: SignatureType) -> Self {
        SignatureBuilder {
            typ,
            hash_algo: HashAlgorithm::SHA256,
            hashed_area: SubpacketArea::new(),
            unhashed_area: SubpacketArea::new(),
        }
    }

    /// Returns the hash algorithm the signature will use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Sets the hash algorithm.
    pub fn set_hash_algo(mut self, algo: HashAlgorithm) -> Self {
        self.hash_algo = algo;
        self
    }

    /// Sets the creation time subpacket.
    pub fn set_signature_creation_time(mut self, time: u32) -> Result<Self> {
        self.hashed_area.replace(Subpacket::new(
            SubpacketValue::SignatureCreationTime(time), false))?;
        Ok(self)
    }

    /// Sets the issuer subpacket.
    pub fn set_issuer(mut self, issuer: KeyID) -> Result<Self> {
        self.hashed_area.replace(Subpacket::new(
            SubpacketValue::Issuer(issuer), false))?;
        Ok(self)
    }

    /// Sets the primary user id subpacket.
    pub fn set_primary_userid(mut self, primary: bool) -> Result<Self> {
        self.hashed_area.replace(Subpacket::new(
            SubpacketValue::PrimaryUserID(primary), false))?;
        Ok(self)
    }

    /// Adds an arbitrary subpacket to the hashed area.
    pub fn add_subpacket(mut self, subpacket: Subpacket) -> Result<Self> {
        self.hashed_area.add(subpacket)?;
        Ok(self)
    }

    /// Signs the content of the hash context.
    ///
    /// `signer` is the public part of the signing key and `secret`
    /// its unlocked secret material.  The context must already hold
    /// the signed entity; this function mixes in the signature fields
    /// and trailer, signs the digest, and returns the finished
    /// packet.
    pub fn sign_hash(self, signer: &Key, secret: &mpi::SecretKeyMaterial,
                     mut hash: Context)
                     -> Result<Signature>
    {
        if hash.algo() != self.hash_algo {
            return Err(Error::InvalidArgument(format!(
                "Hash context uses {}, builder is set to {}",
                hash.algo(), self.hash_algo)).into());
        }
        if self.hashed_area
            .lookup(SubpacketTag::SignatureCreationTime).is_none()
        {
            return Err(Error::InvalidOperation(
                "Signature creation time not set".into()).into());
        }

        let mut unhashed_area = self.unhashed_area;
        if self.hashed_area.lookup(SubpacketTag::Issuer).is_none()
            && unhashed_area.lookup(SubpacketTag::Issuer).is_none()
        {
            unhashed_area.add(Subpacket::new(
                SubpacketValue::Issuer(signer.keyid()), false))?;
        }

        let mut sig = Signature {
            version: 4,
            typ: self.typ,
            pk_algo: signer.pk_algo(),
            hash_algo: self.hash_algo,
            hashed_area: self.hashed_area,
            unhashed_area,
            v3_creation_time: None,
            v3_issuer: None,
            hash_prefix: [0u8; 2],
            mpis: mpi::Signature::Unknown {
                mpis: Vec::new().into_boxed_slice(),
                rest: Vec::new().into_boxed_slice(),
            },
            computed_digest: None,
        };

        sig.hash(&mut hash);
        let digest = hash.into_digest();

        sig.hash_prefix = [digest[0], digest[1]];
        sig.mpis = asymmetric::sign_digest(signer.pk_algo(), signer.mpis(),
                                           secret, self.hash_algo, &digest)?;
        sig.computed_digest = Some(digest);

        Ok(sig)
    }

    /// Signs a document.
    pub fn sign_document(self, signer: &Key,
                         secret: &mpi::SecretKeyMaterial, data: &[u8])
                         -> Result<Signature>
    {
        let mut hash = self.hash_algo.context()?;
        match self.typ {
            SignatureType::Binary => hash.update(data),
            SignatureType::Text => hash_canonical_text(&mut hash, data),
            _ => return Err(Error::UnsupportedSignatureType(self.typ).into()),
        }
        self.sign_hash(signer, secret, hash)
    }

    /// Signs nothing but the signature's own fields: standalone and
    /// timestamp signatures.
    pub fn sign_standalone(self, signer: &Key,
                           secret: &mpi::SecretKeyMaterial)
                           -> Result<Signature>
    {
        if !(self.typ == SignatureType::Standalone
             || self.typ == SignatureType::Timestamp) {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        let hash = self.hash_algo.context()?;
        self.sign_hash(signer, secret, hash)
    }

    /// Signs a certification over `key` and `userid`.
    pub fn sign_userid_binding(self, signer: &Key,
                               secret: &mpi::SecretKeyMaterial,
                               key: &Key, userid: &UserID)
                               -> Result<Signature>
    {
        if !(self.typ.is_certification()
             || self.typ == SignatureType::CertificationRevocation) {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        let mut hash = self.hash_algo.context()?;
        key.hash(&mut hash);
        userid.hash(&mut hash);
        self.sign_hash(signer, secret, hash)
    }

    /// Signs a subkey binding or revocation over `key` and `subkey`.
    pub fn sign_subkey_binding(self, signer: &Key,
                               secret: &mpi::SecretKeyMaterial,
                               key: &Key, subkey: &Key)
                               -> Result<Signature>
    {
        if !(self.typ == SignatureType::SubkeyBinding
             || self.typ == SignatureType::SubkeyRevocation
             || self.typ == SignatureType::PrimaryKeyBinding) {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        let mut hash = self.hash_algo.context()?;
        key.hash(&mut hash);
        subkey.hash(&mut hash);
        self.sign_hash(signer, secret, hash)
    }

    /// Signs directly over `key`: direct key signatures and key
    /// revocations.
    pub fn sign_direct_key(self, signer: &Key,
                           secret: &mpi::SecretKeyMaterial, key: &Key)
                           -> Result<Signature>
    {
        if !(self.typ == SignatureType::DirectKey
             || self.typ == SignatureType::KeyRevocation) {
            return Err(Error::UnsupportedSignatureType(self.typ).into());
        }

        let mut hash = self.hash_algo.context()?;
        key.hash(&mut hash);
        self.sign_hash(signer, secret, hash)
    }
}

/// Feeds `data` into `hash` with line endings normalized to CR-LF,
/// as required for text-mode document signatures (see [Section 5.2.1
/// of RFC 4880]).
///
///   [Section 5.2.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.1
pub(crate) fn hash_canonical_text(hash: &mut Context, data: &[u8]) {
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => {
                hash.update(&data[start..i]);
                hash.update(b"\r\n");
                i += 1;
                start = i;
            }
            b'\r' => {
                hash.update(&data[start..i]);
                hash.update(b"\r\n");
                i += 1;
                if data.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    hash.update(&data[start..]);
}

#[cfg(test)]
mod test {
    use super::*;

    fn text_digest(data: &[u8]) -> Vec<u8> {
        let mut h = HashAlgorithm::SHA256.context().unwrap();
        hash_canonical_text(&mut h, data);
        h.into_digest()
    }

    #[test]
    fn canonical_text_normalizes_endings() {
        let crlf = text_digest(b"one\r\ntwo\r\n");
        assert_eq!(text_digest(b"one\ntwo\n"), crlf);
        assert_eq!(text_digest(b"one\rtwo\r"), crlf);
        assert_eq!(text_digest(b"one\r\ntwo\n"), crlf);
    }

    #[test]
    fn canonical_text_preserves_final_fragment() {
        assert_ne!(text_digest(b"one\ntwo"), text_digest(b"one\ntwo\n"));
    }
}
