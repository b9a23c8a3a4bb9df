//! Packet serialization.
//!
//! The writing side of the crate: packets are emitted with canonical
//! new-format headers and length encodings.  Keyring entries are an
//! exception; they re-emit the exact wire bytes captured at parse
//! time, so a parsed keyring round trips byte for byte.

use std::io::Write;

use crate::Error;
use crate::Packet;
use crate::Result;
use crate::keyring::{Entry, Keyring};
use crate::packet::{self, BodyLength, CompressedData, Key, Literal,
                    OnePassSig, SecretKey, Signature, Tag};
use crate::packet::header::serialize_new_format;
use crate::packet::key::{checksum, Protection};

/// Serializes OpenPGP data structures.
pub trait Serialize {
    /// Writes the serialized form to `o`.
    fn serialize(&self, o: &mut dyn Write) -> Result<()>;

    /// Returns the serialized form in a fresh buffer.
    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(&mut buf)?;
        Ok(buf)
    }
}

impl Serialize for Packet {
    fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        let mut body = Vec::new();
        match self {
            Packet::PublicKey(key) | Packet::PublicSubkey(key) =>
                key_body(key, &mut body)?,
            Packet::SecretKey(key) | Packet::SecretSubkey(key) =>
                secret_key_body(key, &mut body)?,
            Packet::Signature(sig) =>
                signature_body(sig, &mut body)?,
            Packet::OnePassSig(ops) =>
                one_pass_sig_body(ops, &mut body)?,
            Packet::UserID(uid) =>
                body.extend_from_slice(uid.value()),
            Packet::UserAttribute(ua) =>
                body.extend_from_slice(ua.value()),
            Packet::Marker(_) =>
                body.extend_from_slice(packet::Marker::BODY),
            Packet::Trust(trust) =>
                body.extend_from_slice(trust.value()),
            // A literal packet on its own has an empty body; use
            // [`literal`] to emit one together with its data.
            Packet::Literal(lit) =>
                literal_metadata(lit, &mut body)?,
            Packet::CompressedData(c) =>
                compressed_data_body(c, &mut body)?,
            Packet::Unknown(unknown) =>
                body.extend_from_slice(unknown.body()),
        }

        serialize_new_format(o, self.tag(),
                             BodyLength::Full(body.len() as u32))?;
        o.write_all(&body)?;
        Ok(())
    }
}

impl Serialize for Signature {
    fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        let mut body = Vec::new();
        signature_body(self, &mut body)?;
        serialize_new_format(o, Tag::Signature,
                             BodyLength::Full(body.len() as u32))?;
        o.write_all(&body)?;
        Ok(())
    }
}

impl Serialize for Entry {
    /// Re-emits the exact bytes the entry was parsed from.
    fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        for packet in self.packets() {
            o.write_all(packet.as_bytes())?;
        }
        Ok(())
    }
}

impl Serialize for Keyring {
    fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        for entry in self.entries() {
            entry.serialize(o)?;
        }
        Ok(())
    }
}

/// Writes a literal data packet holding `data`.
pub fn literal(o: &mut dyn Write, lit: &Literal, data: &[u8]) -> Result<()> {
    let mut metadata = Vec::new();
    literal_metadata(lit, &mut metadata)?;

    serialize_new_format(
        o, Tag::Literal,
        BodyLength::Full((metadata.len() + data.len()) as u32))?;
    o.write_all(&metadata)?;
    o.write_all(data)?;
    Ok(())
}

fn key_body(key: &Key, o: &mut dyn Write) -> Result<()> {
    o.write_all(&[key.version()])?;
    o.write_all(&key.creation_time().to_be_bytes())?;
    if key.version() == 3 {
        o.write_all(&key.validity_days().to_be_bytes())?;
    }
    o.write_all(&[key.pk_algo().into()])?;
    key.mpis().serialize(o)?;
    Ok(())
}

fn secret_key_body(key: &SecretKey, o: &mut dyn Write) -> Result<()> {
    key_body(key.key(), o)?;

    match key.protection() {
        Protection::Unencrypted { mpis } => {
            o.write_all(&[0])?;
            let mut material = Vec::new();
            mpis.serialize(&mut material)?;
            o.write_all(&material)?;
            o.write_all(&checksum(&material).to_be_bytes())?;
        }
        Protection::Encrypted { s2k, algo, sha1_check, iv, ciphertext } => {
            o.write_all(&[if *sha1_check { 254 } else { 255 }])?;
            o.write_all(&[u8::from(*algo)])?;
            s2k.serialize(o)?;
            o.write_all(iv)?;
            o.write_all(ciphertext)?;
        }
    }
    Ok(())
}

fn signature_body(sig: &Signature, o: &mut dyn Write) -> Result<()> {
    match sig.version() {
        3 => {
            o.write_all(&[3, 5, sig.typ().into()])?;
            let time = sig.signature_creation_time().ok_or_else(|| {
                Error::InvalidOperation(
                    "v3 signature without creation time".into())
            })?;
            o.write_all(&time.to_be_bytes())?;
            let issuer = sig.issuer().ok_or_else(|| {
                Error::InvalidOperation(
                    "v3 signature without issuer".into())
            })?;
            o.write_all(issuer.as_bytes())?;
            o.write_all(&[sig.pk_algo().into(), sig.hash_algo().into()])?;
        }
        4 => {
            o.write_all(&[4, sig.typ().into(), sig.pk_algo().into(),
                          sig.hash_algo().into()])?;

            let hashed = sig.hashed_area().data();
            o.write_all(&(hashed.len() as u16).to_be_bytes())?;
            o.write_all(hashed)?;

            let unhashed = sig.unhashed_area().data();
            o.write_all(&(unhashed.len() as u16).to_be_bytes())?;
            o.write_all(unhashed)?;
        }
        v => return Err(Error::InvalidOperation(format!(
            "Cannot serialize a version {} signature", v)).into()),
    }

    o.write_all(sig.hash_prefix())?;
    sig.mpis().serialize(o)?;
    Ok(())
}

fn one_pass_sig_body(ops: &OnePassSig, o: &mut dyn Write) -> Result<()> {
    o.write_all(&[3, ops.typ().into(), ops.hash_algo().into(),
                  ops.pk_algo().into()])?;
    o.write_all(ops.issuer().as_bytes())?;
    o.write_all(&[if ops.last() { 1 } else { 0 }])?;
    Ok(())
}

fn literal_metadata(lit: &Literal, o: &mut dyn Write) -> Result<()> {
    o.write_all(&[lit.format().into()])?;
    let filename = lit.filename().unwrap_or(b"");
    o.write_all(&[filename.len() as u8])?;
    o.write_all(filename)?;
    o.write_all(&lit.date().to_be_bytes())?;
    Ok(())
}

fn compressed_data_body(c: &CompressedData, o: &mut dyn Write)
                        -> Result<()>
{
    o.write_all(&[c.algo().into()])?;
    Ok(())
}
