//! Keyrings.
//!
//! A keyring is a serialized sequence of key entries, each a primary
//! key followed by user ids, subkeys, and their signatures (see
//! [Section 11.1 of RFC 4880]).  The accumulator visitor groups the
//! packet stream into [`Entry`] values, keeping every packet's raw
//! bytes: certification and binding signatures are computed over the
//! wire serialization, so the original bytes must survive the decode.
//!
//!   [Section 11.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-11.1

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::Error;
use crate::KeyID;
use crate::Packet;
use crate::Result;
use crate::packet::{Key, SecretKey, Signature, Tag, UserID};
use crate::parse::{Content, Flow, Parser, Visitor};
use crate::types::SignatureType;

/// A packet's original wire bytes.
#[derive(Clone, PartialEq)]
pub struct RawPacket {
    tag: Tag,
    bytes: Vec<u8>,
}

impl RawPacket {
    fn new(tag: Tag, bytes: Vec<u8>) -> Self {
        RawPacket { tag, bytes }
    }

    /// Returns the packet's tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns the packet's wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RawPacket")
            .field("tag", &self.tag)
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .finish()
    }
}

/// A user id and the signatures certifying it.
#[derive(Clone, Debug, PartialEq)]
pub struct UserIDBinding {
    userid: UserID,
    sigs: Vec<Signature>,
}

impl UserIDBinding {
    /// Returns the user id.
    pub fn userid(&self) -> &UserID {
        &self.userid
    }

    /// Returns the certifications and revocations on this user id.
    pub fn signatures(&self) -> &[Signature] {
        &self.sigs
    }
}

/// A subkey and the signatures binding it to the primary key.
#[derive(Clone, Debug, PartialEq)]
pub struct SubkeyBinding {
    subkey: Key,
    secret: Option<SecretKey>,
    sigs: Vec<Signature>,
}

impl SubkeyBinding {
    /// Returns the subkey.
    pub fn subkey(&self) -> &Key {
        &self.subkey
    }

    /// Returns the secret key packet, if the keyring carried one.
    pub fn secret(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    /// Returns the binding signatures and revocations on this subkey.
    pub fn signatures(&self) -> &[Signature] {
        &self.sigs
    }
}

/// One keyring entry: a primary key with its user ids, subkeys, and
/// signatures.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    primary: Key,
    primary_secret: Option<SecretKey>,
    direct_sigs: Vec<Signature>,
    userids: Vec<UserIDBinding>,
    subkeys: Vec<SubkeyBinding>,
    packets: Vec<RawPacket>,
}

impl Entry {
    /// Returns the primary key.
    pub fn primary(&self) -> &Key {
        &self.primary
    }

    /// Returns the primary secret key packet, if the keyring carried
    /// one.
    pub fn primary_secret(&self) -> Option<&SecretKey> {
        self.primary_secret.as_ref()
    }

    /// Returns the signatures sitting directly on the primary key.
    pub fn direct_signatures(&self) -> &[Signature] {
        &self.direct_sigs
    }

    /// Returns the user id bindings, in keyring order.
    pub fn userids(&self) -> &[UserIDBinding] {
        &self.userids
    }

    /// Returns the subkey bindings, in keyring order.
    pub fn subkeys(&self) -> &[SubkeyBinding] {
        &self.subkeys
    }

    /// Returns the entry's packets with their original wire bytes, in
    /// arrival order.
    pub fn packets(&self) -> &[RawPacket] {
        &self.packets
    }

    /// Returns the primary key's id.
    pub fn keyid(&self) -> KeyID {
        self.primary.keyid()
    }
}

/// An ordered collection of key entries with a key id index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyring {
    entries: Vec<Entry>,
    /// Primary and subkey ids, mapping to the entry position.
    index: HashMap<KeyID, usize>,
}

impl Keyring {
    /// Creates an empty keyring.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses a binary keyring from a buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_parser(&mut Parser::from_bytes(bytes))
    }

    /// Parses a binary keyring from a reader.
    pub fn from_reader<R: Read + Send + Sync>(reader: R) -> Result<Self> {
        Self::from_parser(&mut Parser::from_reader(reader))
    }

    /// Parses a binary keyring from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_parser(&mut Parser::from_file(path)?)
    }

    /// Accumulates all entries from `parser`.
    ///
    /// To read an armored keyring, push a dearmor layer first.
    pub fn from_parser(parser: &mut Parser) -> Result<Self> {
        let mut accumulator = Accumulator::new();
        parser.parse(&mut accumulator)?;
        accumulator.finish()
    }

    /// Returns the entries in keyring order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the keyring has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry holding the key with the given id, be it the
    /// primary key or a subkey.
    pub fn key_by_id(&self, keyid: &KeyID) -> Option<&Entry> {
        self.index.get(keyid).map(|&i| &self.entries[i])
    }

    /// Finds the actual key with the given id: the primary key or
    /// subkey itself.
    pub fn signing_key_by_id(&self, keyid: &KeyID) -> Option<&Key> {
        let entry = self.key_by_id(keyid)?;
        if &entry.primary.keyid() == keyid {
            return Some(&entry.primary);
        }
        entry.subkeys.iter()
            .map(|binding| &binding.subkey)
            .find(|subkey| &subkey.keyid() == keyid)
    }

    /// Checks every certification, binding, and revocation signature
    /// in the keyring against its signer.
    ///
    /// Signers are looked up in this keyring; a signature whose
    /// issuer is absent is reported as [`Validity::UnknownSigner`]
    /// and no verification is attempted.
    pub fn validate_all_signatures(&self) -> Vec<Validation> {
        let mut results = Vec::new();

        for entry in &self.entries {
            let primary = &entry.primary;

            for sig in &entry.direct_sigs {
                let validity = self.check(sig, |signer| match sig.typ() {
                    SignatureType::DirectKey =>
                        sig.verify_direct_key(signer, primary),
                    SignatureType::KeyRevocation =>
                        sig.verify_key_revocation(signer, primary),
                    t => Err(Error::UnsupportedSignatureType(t).into()),
                });
                results.push(Validation {
                    keyid: primary.keyid(),
                    target: format!("key {}", primary.keyid()),
                    typ: sig.typ(),
                    validity,
                });
            }

            for binding in &entry.userids {
                for sig in &binding.sigs {
                    let validity = self.check(sig, |signer| {
                        if sig.typ().is_certification() {
                            sig.verify_userid_binding(
                                signer, primary, &binding.userid)
                        } else if sig.typ()
                            == SignatureType::CertificationRevocation
                        {
                            sig.verify_userid_revocation(
                                signer, primary, &binding.userid)
                        } else {
                            Err(Error::UnsupportedSignatureType(
                                sig.typ()).into())
                        }
                    });
                    results.push(Validation {
                        keyid: primary.keyid(),
                        target: format!("uid {}", binding.userid),
                        typ: sig.typ(),
                        validity,
                    });
                }
            }

            for binding in &entry.subkeys {
                for sig in &binding.sigs {
                    let validity = self.check(sig, |signer| match sig.typ() {
                        SignatureType::SubkeyBinding =>
                            sig.verify_subkey_binding(
                                signer, primary, &binding.subkey),
                        SignatureType::SubkeyRevocation =>
                            sig.verify_subkey_revocation(
                                signer, primary, &binding.subkey),
                        t => Err(Error::UnsupportedSignatureType(t).into()),
                    });
                    results.push(Validation {
                        keyid: primary.keyid(),
                        target: format!("subkey {}", binding.subkey.keyid()),
                        typ: sig.typ(),
                        validity,
                    });
                }
            }
        }

        results
    }

    fn check<F>(&self, sig: &Signature, verify: F) -> Validity
    where
        F: FnOnce(&Key) -> Result<bool>,
    {
        let issuer = match sig.issuer() {
            Some(issuer) => issuer,
            None => return Validity::Error("No issuer".into()),
        };
        let signer = match self.signing_key_by_id(&issuer) {
            Some(signer) => signer,
            None => return Validity::UnknownSigner(issuer),
        };

        match verify(signer) {
            Ok(true) => Validity::Good,
            Ok(false) => Validity::Bad,
            Err(err) => Validity::Error(err.to_string()),
        }
    }

    fn push(&mut self, entry: Entry) {
        let i = self.entries.len();
        self.index.insert(entry.primary.keyid(), i);
        for binding in &entry.subkeys {
            self.index.insert(binding.subkey.keyid(), i);
        }
        self.entries.push(entry);
    }
}

/// The outcome of checking one signature.
#[derive(Clone, Debug, PartialEq)]
pub enum Validity {
    /// The signature checks out.
    Good,
    /// The cryptography rejected the signature.
    Bad,
    /// The alleged signer is not in the keyring; nothing was checked.
    UnknownSigner(KeyID),
    /// Verification could not be carried out.
    Error(String),
}

/// The result of checking one signature in a keyring.
#[derive(Clone, Debug, PartialEq)]
pub struct Validation {
    /// The primary key id of the entry holding the signature.
    pub keyid: KeyID,
    /// A human readable description of the signed entity.
    pub target: String,
    /// The signature's type.
    pub typ: SignatureType,
    /// The outcome.
    pub validity: Validity,
}

impl Validation {
    /// Returns whether the signature checked out.
    pub fn is_good(&self) -> bool {
        self.validity == Validity::Good
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.validity {
            Validity::Good =>
                write!(f, "{}: validated", self.target),
            Validity::Bad =>
                write!(f, "{}: BAD SIGNATURE", self.target),
            Validity::UnknownSigner(keyid) =>
                write!(f, "{}: unknown signer {}", self.target, keyid),
            Validity::Error(err) =>
                write!(f, "{}: {}", self.target, err),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Start,
    InPrimary,
    AfterUserID,
    AfterSubkey,
}

/// A visitor that accumulates packets into key entries.
///
/// The state machine follows the transferable key grammar: an entry
/// begins at a primary key packet, user ids and subkeys extend it,
/// and signatures attach to the most recent of primary, user id, or
/// subkey.  A new primary key closes the entry.
pub(crate) struct Accumulator {
    state: State,
    current: Option<Entry>,
    keyring: Keyring,
}

impl Accumulator {
    pub(crate) fn new() -> Self {
        Accumulator {
            state: State::Start,
            current: None,
            keyring: Keyring::new(),
        }
    }

    pub(crate) fn finish(mut self) -> Result<Keyring> {
        if let Some(entry) = self.current.take() {
            self.keyring.push(entry);
        }
        Ok(self.keyring)
    }

    fn begin_entry(&mut self, primary: Key, secret: Option<SecretKey>,
                   raw: RawPacket)
    {
        if let Some(entry) = self.current.take() {
            self.keyring.push(entry);
        }
        self.current = Some(Entry {
            primary,
            primary_secret: secret,
            direct_sigs: Vec::new(),
            userids: Vec::new(),
            subkeys: Vec::new(),
            packets: vec![raw],
        });
        self.state = State::InPrimary;
    }

    fn entry(&mut self) -> Result<&mut Entry> {
        self.current.as_mut().ok_or_else(|| {
            Error::MalformedKeyring(
                "Expected a primary key packet first".into()).into()
        })
    }

    fn packet(&mut self, packet: Packet, raw: Vec<u8>) -> Result<()> {
        let tag = packet.tag();
        let raw = RawPacket::new(tag, raw);

        match packet {
            Packet::PublicKey(key) =>
                self.begin_entry(key, None, raw),
            Packet::SecretKey(secret) =>
                self.begin_entry(secret.key().clone(), Some(secret), raw),

            Packet::UserID(userid) => {
                self.state = State::AfterUserID;
                let entry = self.entry()?;
                entry.userids.push(UserIDBinding {
                    userid,
                    sigs: Vec::new(),
                });
                entry.packets.push(raw);
            }

            Packet::PublicSubkey(subkey) => {
                self.state = State::AfterSubkey;
                let entry = self.entry()?;
                entry.subkeys.push(SubkeyBinding {
                    subkey,
                    secret: None,
                    sigs: Vec::new(),
                });
                entry.packets.push(raw);
            }
            Packet::SecretSubkey(secret) => {
                self.state = State::AfterSubkey;
                let entry = self.entry()?;
                entry.subkeys.push(SubkeyBinding {
                    subkey: secret.key().clone(),
                    secret: Some(secret),
                    sigs: Vec::new(),
                });
                entry.packets.push(raw);
            }

            Packet::Signature(sig) => {
                let state = self.state;
                let entry = self.entry()?;
                match state {
                    State::Start => unreachable!("entry() errors first"),
                    State::InPrimary => entry.direct_sigs.push(sig),
                    State::AfterUserID => entry.userids.last_mut()
                        .expect("state implies a user id")
                        .sigs.push(sig),
                    State::AfterSubkey => entry.subkeys.last_mut()
                        .expect("state implies a subkey")
                        .sigs.push(sig),
                }
                entry.packets.push(raw);
            }

            // GnuPG interleaves trust packets with the keyring
            // proper; marker packets are always skipped.
            Packet::Trust(_) | Packet::Marker(_) => (),

            // Unknown packets are tolerated between entries.
            Packet::Unknown(_) => (),

            packet => return Err(Error::MalformedKeyring(format!(
                "Unexpected {} in a keyring", packet.tag())).into()),
        }
        Ok(())
    }
}

impl Visitor for Accumulator {
    fn content(&mut self, content: Content) -> Result<Flow> {
        match content {
            Content::Packet { packet, raw } => {
                self.packet(packet, raw)?;
                Ok(Flow::Continue)
            }
            _ => Ok(Flow::Continue),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::mpi::{self, MPI};
    use crate::serialize::Serialize;
    use crate::types::PublicKeyAlgorithm;

    fn test_key(fill: u8) -> Key {
        Key::new(1136073600, PublicKeyAlgorithm::RSAEncryptSign,
                 mpi::PublicKey::RSA {
                     e: MPI::new(&[0x01, 0x00, 0x01]),
                     n: MPI::new(&[fill; 128]),
                 })
    }

    fn serialized_keyring() -> Vec<u8> {
        let mut buf = Vec::new();
        Packet::PublicKey(test_key(0xd1)).serialize(&mut buf).unwrap();
        Packet::UserID(UserID::from("Alpha <a@example>"))
            .serialize(&mut buf).unwrap();
        Packet::PublicSubkey(test_key(0xd2)).serialize(&mut buf).unwrap();
        Packet::PublicKey(test_key(0xd3)).serialize(&mut buf).unwrap();
        Packet::UserID(UserID::from("Bravo <b@example>"))
            .serialize(&mut buf).unwrap();
        buf
    }

    #[test]
    fn accumulate_entries() {
        let keyring = Keyring::from_bytes(&serialized_keyring()).unwrap();
        assert_eq!(keyring.len(), 2);

        let first = &keyring.entries()[0];
        assert_eq!(first.userids().len(), 1);
        assert_eq!(first.subkeys().len(), 1);
        assert_eq!(first.packets().len(), 3);

        let second = &keyring.entries()[1];
        assert_eq!(second.userids().len(), 1);
        assert_eq!(second.subkeys().len(), 0);
    }

    #[test]
    fn index_covers_primary_and_subkeys() {
        let keyring = Keyring::from_bytes(&serialized_keyring()).unwrap();

        let first = &keyring.entries()[0];
        let primary_id = first.keyid();
        let subkey_id = first.subkeys()[0].subkey().keyid();

        assert_eq!(keyring.key_by_id(&primary_id).unwrap(), first);
        assert_eq!(keyring.key_by_id(&subkey_id).unwrap(), first);
        assert!(keyring.key_by_id(&KeyID::from(0u64)).is_none());

        assert_eq!(keyring.signing_key_by_id(&subkey_id).unwrap().keyid(),
                   subkey_id);
    }

    #[test]
    fn keyring_roundtrips_byte_for_byte() {
        let serialized = serialized_keyring();
        let keyring = Keyring::from_bytes(&serialized).unwrap();

        let mut out = Vec::new();
        keyring.serialize(&mut out).unwrap();
        assert_eq!(out, serialized);
    }

    #[test]
    fn orphan_packet_is_rejected() {
        // A user id with no preceding primary key.
        let mut buf = Vec::new();
        Packet::UserID(UserID::from("nobody"))
            .serialize(&mut buf).unwrap();
        assert!(Keyring::from_bytes(&buf).is_err());
    }
}
