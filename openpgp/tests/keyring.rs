//! Keyring accumulation and signature validation, end to end: keys
//! are generated, certified, serialized, parsed back, and validated.

mod common;

use quill_openpgp::{Keyring, Packet, Validity};
use quill_openpgp::armor;
use quill_openpgp::packet::{SecretKey, Signature, SignatureBuilder, UserID};
use quill_openpgp::parse::Parser;
use quill_openpgp::s2k::S2K;
use quill_openpgp::serialize::Serialize;
use quill_openpgp::types::{HashAlgorithm, SignatureType, SymmetricAlgorithm};

use common::{CREATION_TIME, dsa_key, rsa_key};

struct TestKey {
    key: quill_openpgp::packet::Key,
    secret: quill_openpgp::crypto::mpi::SecretKeyMaterial,
}

impl TestKey {
    fn rsa(seed: u64) -> Self {
        let (key, secret) = rsa_key(seed);
        TestKey { key, secret }
    }

    fn dsa(seed: u64) -> Self {
        let (key, secret) = dsa_key(seed);
        TestKey { key, secret }
    }

    fn certify(&self, userid: &UserID) -> Signature {
        SignatureBuilder::new(SignatureType::PositiveCertification)
            .set_signature_creation_time(CREATION_TIME + 1).unwrap()
            .set_issuer(self.key.keyid()).unwrap()
            .set_primary_userid(true).unwrap()
            .sign_userid_binding(&self.key, &self.secret, &self.key, userid)
            .unwrap()
    }

    fn bind_subkey(&self, subkey: &quill_openpgp::packet::Key) -> Signature {
        SignatureBuilder::new(SignatureType::SubkeyBinding)
            .set_signature_creation_time(CREATION_TIME + 1).unwrap()
            .set_issuer(self.key.keyid()).unwrap()
            .sign_subkey_binding(&self.key, &self.secret, &self.key, subkey)
            .unwrap()
    }
}

/// One v4 RSA primary, a user id with a positive self certification,
/// and an RSA subkey with a binding signature.
fn alpha_keyring_bytes() -> Vec<u8> {
    let alpha = TestKey::rsa(1);
    let subkey = TestKey::rsa(2);
    let userid = UserID::from("Alpha <a@example>");

    let mut buf = Vec::new();
    Packet::PublicKey(alpha.key.clone()).serialize(&mut buf).unwrap();
    Packet::UserID(userid.clone()).serialize(&mut buf).unwrap();
    Packet::Signature(alpha.certify(&userid)).serialize(&mut buf).unwrap();
    Packet::PublicSubkey(subkey.key.clone()).serialize(&mut buf).unwrap();
    Packet::Signature(alpha.bind_subkey(&subkey.key))
        .serialize(&mut buf).unwrap();
    buf
}

#[test]
fn keyring_parse_and_validate() {
    let keyring = Keyring::from_bytes(&alpha_keyring_bytes()).unwrap();
    assert_eq!(keyring.len(), 1);

    let entry = &keyring.entries()[0];
    assert_eq!(entry.userids().len(), 1);
    assert_eq!(entry.userids()[0].signatures().len(), 1);
    assert_eq!(entry.subkeys().len(), 1);
    assert_eq!(entry.subkeys()[0].signatures().len(), 1);

    let validations = keyring.validate_all_signatures();
    assert_eq!(validations.len(), 2);
    for validation in &validations {
        assert!(validation.is_good(), "{}", validation);
        assert!(validation.to_string().ends_with("validated"));
    }
}

#[test]
fn keyring_roundtrips_byte_for_byte() {
    let serialized = alpha_keyring_bytes();
    let keyring = Keyring::from_bytes(&serialized).unwrap();
    assert_eq!(keyring.to_vec().unwrap(), serialized);
}

#[test]
fn find_key_by_id() {
    let keyring = Keyring::from_bytes(&alpha_keyring_bytes()).unwrap();
    let entry = &keyring.entries()[0];

    let primary_id = entry.keyid();
    let subkey_id = entry.subkeys()[0].subkey().keyid();

    assert_eq!(keyring.key_by_id(&primary_id).unwrap().keyid(), primary_id);
    assert_eq!(keyring.key_by_id(&subkey_id).unwrap().keyid(), primary_id);
    assert!(keyring.key_by_id(&quill_openpgp::KeyID::from(42u64)).is_none());
}

#[test]
fn tampered_userid_fails_validation() {
    let alpha = TestKey::rsa(1);
    let userid = UserID::from("Alpha <a@example>");
    let sig = alpha.certify(&userid);

    let mut buf = Vec::new();
    Packet::PublicKey(alpha.key.clone()).serialize(&mut buf).unwrap();
    // The signature certifies a different user id.
    Packet::UserID(UserID::from("Mallory <m@example>"))
        .serialize(&mut buf).unwrap();
    Packet::Signature(sig).serialize(&mut buf).unwrap();

    let keyring = Keyring::from_bytes(&buf).unwrap();
    let validations = keyring.validate_all_signatures();
    assert_eq!(validations.len(), 1);
    assert_eq!(validations[0].validity, Validity::Bad);
}

#[test]
fn tampered_signature_fails_validation() {
    let mut serialized = alpha_keyring_bytes();

    // Flip one bit in the last byte, which sits in the binding
    // signature's MPIs.
    let last = serialized.len() - 1;
    serialized[last] ^= 0x01;

    let keyring = Keyring::from_bytes(&serialized).unwrap();
    let validations = keyring.validate_all_signatures();
    assert!(validations.iter().any(|v| !v.is_good()));
}

#[test]
fn unknown_signer_is_reported() {
    let alpha = TestKey::rsa(1);
    let stranger = TestKey::rsa(3);
    let userid = UserID::from("Alpha <a@example>");

    // A certification by a key that is not part of the keyring.
    let foreign_sig = SignatureBuilder::new(
        SignatureType::GenericCertification)
        .set_signature_creation_time(CREATION_TIME + 1).unwrap()
        .set_issuer(stranger.key.keyid()).unwrap()
        .sign_userid_binding(&stranger.key, &stranger.secret,
                             &alpha.key, &userid)
        .unwrap();

    let mut buf = Vec::new();
    Packet::PublicKey(alpha.key.clone()).serialize(&mut buf).unwrap();
    Packet::UserID(userid).serialize(&mut buf).unwrap();
    Packet::Signature(foreign_sig).serialize(&mut buf).unwrap();

    let keyring = Keyring::from_bytes(&buf).unwrap();
    let validations = keyring.validate_all_signatures();
    assert_eq!(validations.len(), 1);
    assert_eq!(validations[0].validity,
               Validity::UnknownSigner(stranger.key.keyid()));
}

#[test]
fn dsa_self_signature_validates() {
    let bravo = TestKey::dsa(4);
    let userid = UserID::from("Bravo <b@example>");

    let sig = SignatureBuilder::new(SignatureType::PositiveCertification)
        .set_hash_algo(HashAlgorithm::SHA256)
        .set_signature_creation_time(CREATION_TIME + 1).unwrap()
        .set_issuer(bravo.key.keyid()).unwrap()
        .sign_userid_binding(&bravo.key, &bravo.secret, &bravo.key, &userid)
        .unwrap();

    let mut buf = Vec::new();
    Packet::PublicKey(bravo.key.clone()).serialize(&mut buf).unwrap();
    Packet::UserID(userid).serialize(&mut buf).unwrap();
    Packet::Signature(sig).serialize(&mut buf).unwrap();

    let keyring = Keyring::from_bytes(&buf).unwrap();
    let validations = keyring.validate_all_signatures();
    assert_eq!(validations.len(), 1);
    assert!(validations[0].is_good(), "{}", validations[0]);
}

#[test]
fn armored_keyring() {
    use std::io::Write;

    let serialized = alpha_keyring_bytes();

    let mut writer = armor::Writer::new(
        Vec::new(), armor::Kind::PublicKey).unwrap();
    writer.write_all(&serialized).unwrap();
    let armored = writer.finalize().unwrap();

    let mut parser = Parser::from_bytes(&armored);
    parser.push_dearmor(Some(armor::Kind::PublicKey)).unwrap();
    let keyring = Keyring::from_parser(&mut parser).unwrap();
    parser.pop_dearmor().unwrap();

    assert_eq!(keyring.len(), 1);
    assert!(keyring.validate_all_signatures().iter()
            .all(|v| v.is_good()));
}

#[test]
fn secret_keyring_signs_after_unlock() {
    let alpha = TestKey::rsa(1);
    let userid = UserID::from("Alpha <a@example>");

    let s2k = S2K::Iterated {
        hash: HashAlgorithm::SHA1,
        salt: [9; 8],
        iterations: 65536,
    };
    let secret_packet = SecretKey::new(alpha.key.clone(),
                                       alpha.secret.clone())
        .encrypt(b"correct horse", s2k, SymmetricAlgorithm::AES256,
                 vec![0x42; 16])
        .unwrap();

    let mut buf = Vec::new();
    Packet::SecretKey(secret_packet).serialize(&mut buf).unwrap();
    Packet::UserID(userid.clone()).serialize(&mut buf).unwrap();
    Packet::Signature(alpha.certify(&userid)).serialize(&mut buf).unwrap();

    let keyring = Keyring::from_bytes(&buf).unwrap();
    let entry = &keyring.entries()[0];
    let secret = entry.primary_secret().expect("a secret keyring");

    assert!(secret.unlock(b"wrong").is_err());
    let material = secret.unlock(b"correct horse").unwrap();
    assert_eq!(material, alpha.secret);

    // The unlocked material must be able to sign.
    let sig = SignatureBuilder::new(SignatureType::Binary)
        .set_signature_creation_time(CREATION_TIME + 2).unwrap()
        .set_issuer(entry.keyid()).unwrap()
        .sign_document(entry.primary(), &material, b"payload")
        .unwrap();
    assert!(sig.verify_document(entry.primary(), b"payload").unwrap());
}
