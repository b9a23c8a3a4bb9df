//! Document and cleartext signature round trips: sign with the
//! creation engine, serialize, parse back through the reader stack,
//! and verify.

mod common;

use std::io::Write;

use rand::RngCore;

use quill_openpgp::{Error, KeyID, Packet};
use quill_openpgp::armor;
use quill_openpgp::cleartext;
use quill_openpgp::packet::{DataFormat, Literal, OnePassSig, Signature,
                            SignatureBuilder};
use quill_openpgp::packet::signature::{Subpacket, SubpacketValue};
use quill_openpgp::parse::{Content, Flow, Parser, Visitor};
use quill_openpgp::serialize::{self, Serialize};
use quill_openpgp::types::{HashAlgorithm, SignatureType};

use common::{CREATION_TIME, rng, rsa_key};

fn builder(typ: SignatureType, issuer: KeyID) -> SignatureBuilder {
    SignatureBuilder::new(typ)
        .set_signature_creation_time(CREATION_TIME + 10).unwrap()
        .set_issuer(issuer).unwrap()
}

#[test]
fn binary_document_signature_over_random_megabyte() {
    let (key, secret) = rsa_key(10);

    let mut payload = vec![0u8; 1024 * 1024];
    rng(11).fill_bytes(&mut payload);

    let sig = builder(SignatureType::Binary, key.keyid())
        .set_hash_algo(HashAlgorithm::SHA256)
        .sign_document(&key, &secret, &payload)
        .unwrap();

    assert!(sig.verify_document(&key, &payload).unwrap());

    // Any bit flip must invalidate the signature.
    payload[512 * 1024] ^= 0x80;
    assert!(!sig.verify_document(&key, &payload).unwrap());
}

#[test]
fn text_document_signature_ignores_line_endings() {
    let (key, secret) = rsa_key(10);

    let sig = builder(SignatureType::Text, key.keyid())
        .sign_document(&key, &secret, b"one\ntwo\n")
        .unwrap();

    assert!(sig.verify_document(&key, b"one\ntwo\n").unwrap());
    assert!(sig.verify_document(&key, b"one\r\ntwo\r\n").unwrap());
    assert!(!sig.verify_document(&key, b"one\ntwo!\n").unwrap());
}

#[test]
fn standalone_signature() {
    let (key, secret) = rsa_key(10);

    let sig = builder(SignatureType::Standalone, key.keyid())
        .sign_standalone(&key, &secret)
        .unwrap();
    assert!(sig.verify_standalone(&key).unwrap());
}

#[test]
fn hash_prefix_matches_digest() {
    let (key, secret) = rsa_key(10);

    let sig = builder(SignatureType::Binary, key.keyid())
        .sign_document(&key, &secret, b"prefix check")
        .unwrap();

    let digest = sig.computed_digest().expect("set by the builder");
    assert_eq!(&digest[..2], sig.hash_prefix());
}

#[test]
fn detached_signature_through_armor() {
    let (key, secret) = rsa_key(10);
    let document = b"attack at dawn";

    let sig = builder(SignatureType::Binary, key.keyid())
        .sign_document(&key, &secret, document)
        .unwrap();

    let mut writer = armor::Writer::new(
        Vec::new(), armor::Kind::Signature).unwrap();
    sig.serialize(&mut writer).unwrap();
    let armored = writer.finalize().unwrap();

    let mut parser = Parser::from_bytes(&armored);
    parser.push_dearmor(Some(armor::Kind::Signature)).unwrap();

    let mut parsed: Option<Signature> = None;
    let mut saw_armor_header = false;
    let mut saw_armor_trailer = false;
    parser.parse(&mut |content: Content| {
        match content {
            Content::ArmorHeader { kind, .. } => {
                assert_eq!(kind, armor::Kind::Signature);
                saw_armor_header = true;
            }
            Content::ArmorTrailer { .. } => saw_armor_trailer = true,
            Content::Packet { packet: Packet::Signature(sig), .. } =>
                parsed = Some(sig),
            _ => (),
        }
        Ok(Flow::Continue)
    }).unwrap();
    parser.pop_dearmor().unwrap();

    assert!(saw_armor_header);
    assert!(saw_armor_trailer);

    let parsed = parsed.expect("one signature packet");
    assert_eq!(parsed, sig);
    assert!(parsed.verify_document(&key, document).unwrap());
}

#[test]
fn one_pass_signed_message() {
    let (key, secret) = rsa_key(10);
    let document = b"the payload of a native signed message";

    let sig = builder(SignatureType::Binary, key.keyid())
        .sign_document(&key, &secret, document)
        .unwrap();

    // One-pass framing: the one-pass packet, the literal data, the
    // signature.
    let mut message = Vec::new();
    Packet::OnePassSig(OnePassSig::new(
        SignatureType::Binary, HashAlgorithm::SHA256,
        key.pk_algo(), key.keyid()))
        .serialize(&mut message).unwrap();
    serialize::literal(&mut message, &Literal::new(DataFormat::Binary),
                       document).unwrap();
    Packet::Signature(sig).serialize(&mut message).unwrap();

    // The parser must reconstruct the digest from the streamed
    // literal body.
    let mut body = Vec::new();
    let mut parsed: Option<Signature> = None;
    Parser::from_bytes(&message).parse(&mut |content: Content| {
        match content {
            Content::LiteralBody(chunk) => body.extend_from_slice(&chunk),
            Content::Packet { packet: Packet::Signature(sig), .. } =>
                parsed = Some(sig),
            _ => (),
        }
        Ok(Flow::Continue)
    }).unwrap();

    assert_eq!(body, document);
    let parsed = parsed.expect("one signature packet");
    assert!(parsed.computed_digest().is_some());
    assert!(parsed.verify(&key).unwrap());
}

#[test]
fn critical_unknown_subpacket_poisons_verification() {
    let (key, secret) = rsa_key(10);

    let sig = builder(SignatureType::Binary, key.keyid())
        .add_subpacket(Subpacket::new(SubpacketValue::Unknown {
            tag: 200,
            body: vec![0xde, 0xad],
        }, true)).unwrap()
        .sign_document(&key, &secret, b"data")
        .unwrap();

    let err = sig.verify_document(&key, b"data").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(),
                     Some(Error::UnsupportedCriticalSubpacket(200))));
}

#[test]
fn noncritical_unknown_subpacket_is_ignored() {
    let (key, secret) = rsa_key(10);

    let sig = builder(SignatureType::Binary, key.keyid())
        .add_subpacket(Subpacket::new(SubpacketValue::Unknown {
            tag: 200,
            body: vec![0xde, 0xad],
        }, false)).unwrap()
        .sign_document(&key, &secret, b"data")
        .unwrap();

    assert!(sig.verify_document(&key, b"data").unwrap());
}

/// Produces a complete cleartext-signed message for `text`.
fn cleartext_sign(text: &[u8], seed: u64) -> (Vec<u8>,
                                              quill_openpgp::packet::Key)
{
    let (key, secret) = rsa_key(seed);

    let mut writer = cleartext::Writer::new(
        Vec::new(), HashAlgorithm::SHA256).unwrap();
    writer.write_all(text).unwrap();
    let (sink, hash) = writer.finalize().unwrap();

    let sig = builder(SignatureType::Text, key.keyid())
        .sign_hash(&key, &secret, hash)
        .unwrap();

    let mut armor_writer = armor::Writer::new(
        sink, armor::Kind::Signature).unwrap();
    sig.serialize(&mut armor_writer).unwrap();
    let output = armor_writer.finalize().unwrap();

    (output, key)
}

/// Replays the flow of a cleartext verifier: collect the body, take
/// the surrendered hash at the trailer, check the trailing signature.
struct CleartextVerifier {
    body: Vec<u8>,
    hashes: Vec<quill_openpgp::crypto::Context>,
    signature: Option<Signature>,
}

impl CleartextVerifier {
    fn new() -> Self {
        CleartextVerifier {
            body: Vec::new(),
            hashes: Vec::new(),
            signature: None,
        }
    }
}

impl Visitor for CleartextVerifier {
    fn content(&mut self, content: Content) -> quill_openpgp::Result<Flow> {
        match content {
            Content::CleartextBody(line) =>
                self.body.extend_from_slice(&line),
            Content::CleartextTrailer { hashes } =>
                self.hashes = hashes,
            Content::Packet { packet: Packet::Signature(sig), .. } =>
                self.signature = Some(sig),
            _ => (),
        }
        Ok(Flow::Continue)
    }
}

#[test]
fn cleartext_signature_verifies() {
    let (output, key) = cleartext_sign(b"Hello, world.\n", 20);

    let mut verifier = CleartextVerifier::new();
    Parser::from_bytes(&output)
        .parse_cleartext(&mut verifier).unwrap();

    assert_eq!(verifier.body, b"Hello, world.\n");

    let sig = verifier.signature.expect("a trailing signature");
    let hash = verifier.hashes.into_iter()
        .find(|h| h.algo() == sig.hash_algo())
        .expect("a context for the signature's algorithm");
    assert!(sig.verify_hash(&key, hash).unwrap());

    // The parser attached the digest to the signature as well.
    assert!(sig.verify(&key).unwrap());
}

#[test]
fn cleartext_with_dashes_roundtrips() {
    let text = b"-- begins with dashes\nplain\n- also escaped\n";
    let (output, key) = cleartext_sign(text, 20);

    // The escaped form is on the wire.
    assert!(String::from_utf8_lossy(&output).contains("- -- begins"));

    let mut verifier = CleartextVerifier::new();
    Parser::from_bytes(&output)
        .parse_cleartext(&mut verifier).unwrap();

    assert_eq!(verifier.body, text);
    let sig = verifier.signature.unwrap();
    assert!(sig.verify(&key).unwrap());
}

#[test]
fn tampered_cleartext_body_fails() {
    let (output, key) = cleartext_sign(b"Hello, world.\n", 20);

    // Flip one character of the body.
    let text = String::from_utf8(output).unwrap();
    let tampered = text.replacen("Hello", "Jello", 1);
    assert_ne!(text, tampered);

    let mut verifier = CleartextVerifier::new();
    Parser::from_bytes(tampered.as_bytes())
        .parse_cleartext(&mut verifier).unwrap();

    let sig = verifier.signature.unwrap();
    let hash = verifier.hashes.into_iter()
        .find(|h| h.algo() == sig.hash_algo())
        .unwrap();
    assert!(!sig.verify_hash(&key, hash).unwrap());
}

#[test]
fn cleartext_unknown_signer() {
    let (output, _key) = cleartext_sign(b"Hello, world.\n", 20);

    // A keyring that does not contain the signer.
    let (other_key, _) = rsa_key(21);
    let mut keyring_bytes = Vec::new();
    Packet::PublicKey(other_key).serialize(&mut keyring_bytes).unwrap();
    let keyring =
        quill_openpgp::Keyring::from_bytes(&keyring_bytes).unwrap();

    let mut verifier = CleartextVerifier::new();
    Parser::from_bytes(&output)
        .parse_cleartext(&mut verifier).unwrap();

    let sig = verifier.signature.unwrap();
    let issuer = sig.issuer().expect("the builder sets an issuer");
    assert!(keyring.signing_key_by_id(&issuer).is_none());
}
