//! Signature creation and verification primitives.
//!
//! This module is the only place that talks to the cryptographic
//! backends.  Keys and signatures arrive here as MPI bundles; the
//! dispatch follows the (algorithm, key, signature) triple, and a
//! shape mismatch between them is reported as an error, never as a
//! quietly failing verification.

use dsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use num_bigint_dig::BigUint;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use rsa::traits::PublicKeyParts;

use crate::Error;
use crate::Result;
use crate::crypto::mpi::{self, MPI};
use crate::types::{HashAlgorithm, PublicKeyAlgorithm};

fn biguint(m: &MPI) -> BigUint {
    BigUint::from_bytes_be(m.value())
}

/// Returns the PKCS#1 v1.5 signature scheme carrying the DigestInfo
/// prefix for `algo`.
fn pkcs1v15(algo: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    match algo {
        HashAlgorithm::MD5 =>
            Ok(Pkcs1v15Sign::new::<md5::Md5>()),
        HashAlgorithm::SHA1 =>
            Ok(Pkcs1v15Sign::new::<sha1collisiondetection::Sha1CD>()),
        HashAlgorithm::RipeMD =>
            Ok(Pkcs1v15Sign::new::<ripemd::Ripemd160>()),
        HashAlgorithm::SHA256 =>
            Ok(Pkcs1v15Sign::new::<sha2::Sha256>()),
        HashAlgorithm::SHA384 =>
            Ok(Pkcs1v15Sign::new::<sha2::Sha384>()),
        HashAlgorithm::SHA512 =>
            Ok(Pkcs1v15Sign::new::<sha2::Sha512>()),
        HashAlgorithm::SHA224 =>
            Ok(Pkcs1v15Sign::new::<sha2::Sha224>()),
        _ => Err(Error::UnsupportedHashAlgorithm(algo).into()),
    }
}

/// Checks `sig` over `digest` using the public key `key`.
///
/// Returns `Ok(false)` if the cryptography rejects the signature;
/// errors are reserved for unsupported algorithms and structural
/// problems.
pub(crate) fn verify_digest(pk_algo: PublicKeyAlgorithm,
                            key: &mpi::PublicKey,
                            sig: &mpi::Signature,
                            hash_algo: HashAlgorithm,
                            digest: &[u8])
                            -> Result<bool>
{
    use crate::types::PublicKeyAlgorithm::*;

    #[allow(deprecated)]
    match (pk_algo, key, sig) {
        (RSAEncryptSign, mpi::PublicKey::RSA { e, n }, mpi::Signature::RSA { s })
        | (RSASign, mpi::PublicKey::RSA { e, n }, mpi::Signature::RSA { s }) =>
        {
            let key = RsaPublicKey::new(biguint(n), biguint(e))?;

            // As described in Section 5.2.2 of RFC 4880, the
            // signature is a PKCS#1 v1.5 encoding of the DigestInfo
            // over the computed hash.
            let s = s.value_padded(key.size())?;
            Ok(key.verify(pkcs1v15(hash_algo)?, digest, &s).is_ok())
        }

        (DSA, mpi::PublicKey::DSA { p, q, g, y }, mpi::Signature::DSA { r, s }) => {
            let components = dsa::Components::from_components(
                biguint(p), biguint(q), biguint(g))
                .map_err(|_| Error::InvalidArgument(
                    "Invalid DSA domain parameters".into()))?;
            let key = dsa::VerifyingKey::from_components(components, biguint(y))
                .map_err(|_| Error::InvalidArgument(
                    "Invalid DSA public key".into()))?;
            let sig = match dsa::Signature::from_components(biguint(r),
                                                            biguint(s)) {
                Ok(sig) => sig,
                // r or s out of range; the signature cannot be valid.
                Err(_) => return Ok(false),
            };

            // The digest is truncated to the bit length of q by the
            // verifier.
            Ok(key.verify_prehash(digest, &sig).is_ok())
        }

        (ElGamalEncrypt, _, _) | (RSAEncrypt, _, _) =>
            Err(Error::UnsupportedPublicKeyAlgorithm(pk_algo).into()),
        (Private(_), _, _) | (Unknown(_), _, _) =>
            Err(Error::UnsupportedPublicKeyAlgorithm(pk_algo).into()),

        _ => Err(Error::BadSignature(format!(
            "Signature MPIs do not match the {} key", pk_algo)).into()),
    }
}

/// Creates a signature over `digest` using the secret key material.
pub(crate) fn sign_digest(pk_algo: PublicKeyAlgorithm,
                          key: &mpi::PublicKey,
                          secret: &mpi::SecretKeyMaterial,
                          hash_algo: HashAlgorithm,
                          digest: &[u8])
                          -> Result<mpi::Signature>
{
    use crate::types::PublicKeyAlgorithm::*;

    #[allow(deprecated)]
    match (pk_algo, key, secret) {
        (RSAEncryptSign,
         mpi::PublicKey::RSA { e, n },
         mpi::SecretKeyMaterial::RSA { d, p, q, .. })
        | (RSASign,
           mpi::PublicKey::RSA { e, n },
           mpi::SecretKeyMaterial::RSA { d, p, q, .. }) =>
        {
            let key = RsaPrivateKey::from_components(
                biguint(n), biguint(e), biguint(d),
                vec![biguint(p), biguint(q)])?;

            let s = key.sign(pkcs1v15(hash_algo)?, digest)?;
            Ok(mpi::Signature::RSA { s: MPI::new(&s) })
        }

        (DSA,
         mpi::PublicKey::DSA { p, q, g, y },
         mpi::SecretKeyMaterial::DSA { x }) =>
        {
            let components = dsa::Components::from_components(
                biguint(p), biguint(q), biguint(g))
                .map_err(|_| Error::InvalidArgument(
                    "Invalid DSA domain parameters".into()))?;
            let verifying = dsa::VerifyingKey::from_components(
                components, biguint(y))
                .map_err(|_| Error::InvalidArgument(
                    "Invalid DSA public key".into()))?;
            let key = dsa::SigningKey::from_components(verifying, biguint(x))
                .map_err(|_| Error::InvalidArgument(
                    "Invalid DSA secret key".into()))?;

            let sig = key.sign_prehash(digest)
                .map_err(|_| Error::InvalidOperation(
                    "DSA signing failed".into()))?;
            Ok(mpi::Signature::DSA {
                r: MPI::new(&sig.r().to_bytes_be()),
                s: MPI::new(&sig.s().to_bytes_be()),
            })
        }

        (ElGamalEncrypt, _, _) | (RSAEncrypt, _, _)
        | (Private(_), _, _) | (Unknown(_), _, _) =>
            Err(Error::UnsupportedPublicKeyAlgorithm(pk_algo).into()),

        _ => Err(Error::InvalidArgument(format!(
            "Secret key MPIs do not match the {} key", pk_algo)).into()),
    }
}
