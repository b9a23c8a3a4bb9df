//! Key packets.
//!
//! Covers the four key packet types: public and secret, primary and
//! subordinate.  The public part is the same in all four; secret key
//! packets append s2k-protected secret material (see [Section 5.5 of
//! RFC 4880]).
//!
//!   [Section 5.5 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.5

use std::fmt;

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use buffered_reader::BufferedReader;

use crate::Error;
use crate::Fingerprint;
use crate::KeyID;
use crate::Result;
use crate::crypto::hash::Hash;
use crate::crypto::mpi;
use crate::parse::Cookie;
use crate::s2k::S2K;
use crate::types::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm};

/// Holds a public key.
///
/// The same type backs primary keys and subkeys; the packet tag they
/// arrived under tells them apart.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    version: u8,
    creation_time: u32,
    /// v3 keys expire this many days after creation; 0 means never.
    validity_days: u16,
    pk_algo: PublicKeyAlgorithm,
    mpis: mpi::PublicKey,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Key")
            .field("version", &self.version)
            .field("creation_time", &self.creation_time)
            .field("pk_algo", &self.pk_algo)
            .field("keyid", &self.keyid())
            .finish()
    }
}

impl Key {
    /// Creates a new version 4 key.
    pub fn new(creation_time: u32, pk_algo: PublicKeyAlgorithm,
               mpis: mpi::PublicKey)
               -> Self
    {
        Key {
            version: 4,
            creation_time,
            validity_days: 0,
            pk_algo,
            mpis,
        }
    }

    /// Creates a new version 3 key.
    pub fn new_v3(creation_time: u32, validity_days: u16,
                  pk_algo: PublicKeyAlgorithm, mpis: mpi::PublicKey)
                  -> Self
    {
        Key {
            version: 3,
            creation_time,
            validity_days,
            pk_algo,
            mpis,
        }
    }

    /// Returns the key's version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the key's creation time in seconds since the epoch.
    pub fn creation_time(&self) -> u32 {
        self.creation_time
    }

    /// Returns the validity period of a v3 key in days, 0 meaning
    /// unlimited.
    pub fn validity_days(&self) -> u16 {
        self.validity_days
    }

    /// Returns the public key algorithm.
    pub fn pk_algo(&self) -> PublicKeyAlgorithm {
        self.pk_algo
    }

    /// Returns the public key MPIs.
    pub fn mpis(&self) -> &mpi::PublicKey {
        &self.mpis
    }

    /// The length of the packet body holding the public fields.
    pub(crate) fn public_body_len(&self) -> usize {
        if self.version == 3 {
            1 + 4 + 2 + 1 + self.mpis.serialized_len()
        } else {
            1 + 4 + 1 + self.mpis.serialized_len()
        }
    }

    /// Computes the key's fingerprint.
    ///
    /// A v4 fingerprint is `SHA1(0x99 || len16 || body)`; a v3
    /// fingerprint is the MD5 over the RSA public MPI values without
    /// their length prefixes (see [Section 12.2 of RFC 4880]).
    ///
    ///   [Section 12.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-12.2
    pub fn fingerprint(&self) -> Fingerprint {
        match self.version {
            4 => {
                let mut h = HashAlgorithm::SHA1.context()
                    .expect("SHA1 is supported");
                self.hash(&mut h);
                Fingerprint::from(&h.into_digest()[..])
            }
            3 => {
                if let mpi::PublicKey::RSA { e, n } = &self.mpis {
                    let mut h = HashAlgorithm::MD5.context()
                        .expect("MD5 is supported");
                    h.update(n.value());
                    h.update(e.value());
                    Fingerprint::from(&h.into_digest()[..])
                } else {
                    Fingerprint::Invalid(Vec::new().into_boxed_slice())
                }
            }
            _ => Fingerprint::Invalid(Vec::new().into_boxed_slice()),
        }
    }

    /// Computes the key's id.
    ///
    /// For v4 keys this is the low 64 bits of the fingerprint; for v3
    /// RSA keys it is the low 64 bits of the modulus.
    pub fn keyid(&self) -> KeyID {
        match self.version {
            4 => self.fingerprint().keyid(),
            3 => {
                if let mpi::PublicKey::RSA { n, .. } = &self.mpis {
                    let value = n.value();
                    let mut id = [0u8; 8];
                    let take = value.len().min(8);
                    id[8 - take..].copy_from_slice(&value[value.len() - take..]);
                    KeyID::Long(id)
                } else {
                    KeyID::Invalid(Vec::new().into_boxed_slice())
                }
            }
            _ => KeyID::Invalid(Vec::new().into_boxed_slice()),
        }
    }

    /// Parses the public fields of a key packet body.
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let version = bio.data_consume_hard(1)?[0];
        match version {
            4 => {
                let creation_time = bio.read_be_u32()?;
                let pk_algo = PublicKeyAlgorithm::from(
                    bio.data_consume_hard(1)?[0]);
                let mpis = mpi::PublicKey::parse(pk_algo, bio)?;

                Ok(Key {
                    version,
                    creation_time,
                    validity_days: 0,
                    pk_algo,
                    mpis,
                })
            }
            3 => {
                let creation_time = bio.read_be_u32()?;
                let validity_days = bio.read_be_u16()?;
                let pk_algo = PublicKeyAlgorithm::from(
                    bio.data_consume_hard(1)?[0]);
                let mpis = mpi::PublicKey::parse(pk_algo, bio)?;

                Ok(Key {
                    version,
                    creation_time,
                    validity_days,
                    pk_algo,
                    mpis,
                })
            }
            _ => Err(Error::MalformedPacket(
                format!("Unsupported key version {}", version)).into()),
        }
    }
}

/// How the secret key material is protected inside the packet.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Protection {
    /// Plaintext MPIs, integrity protected by a 16-bit checksum.
    Unencrypted {
        /// The secret MPIs.
        mpis: mpi::SecretKeyMaterial,
    },
    /// The MPIs and their integrity check are encrypted together.
    Encrypted {
        /// The string-to-key specifier deriving the symmetric key.
        s2k: S2K,
        /// The symmetric algorithm protecting the material.
        algo: SymmetricAlgorithm,
        /// Whether the plaintext carries a SHA-1 integrity tag
        /// (s2k usage 254) instead of a 16-bit checksum.
        sha1_check: bool,
        /// The CFB initialization vector.
        iv: Vec<u8>,
        /// The encrypted MPIs and integrity check.
        ciphertext: Vec<u8>,
    },
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protection::Unencrypted { .. } =>
                f.write_str("Unencrypted"),
            Protection::Encrypted { s2k, algo, .. } =>
                f.write_fmt(format_args!("Encrypted({}, {})", algo, s2k)),
        }
    }
}

/// Holds a secret key packet.
///
/// This is the public key plus the protected secret material.  The
/// decrypted view only exists as the return value of
/// [`SecretKey::unlock`]; the packet itself never stores it next to
/// the ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretKey {
    key: Key,
    protection: Protection,
}

impl SecretKey {
    /// Creates an unencrypted secret key packet.
    pub fn new(key: Key, mpis: mpi::SecretKeyMaterial) -> Self {
        SecretKey {
            key,
            protection: Protection::Unencrypted { mpis },
        }
    }

    /// Returns the public part.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the protection of the secret material.
    pub fn protection(&self) -> &Protection {
        &self.protection
    }

    /// Returns whether the secret material is encrypted.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.protection, Protection::Encrypted { .. })
    }

    /// Returns the secret MPIs.
    ///
    /// For an encrypted key, `password` is run through the packet's
    /// S2K and the material is decrypted and integrity checked; a
    /// failing check is an [`Error::InvalidPassword`].  For an
    /// unencrypted key the password is ignored.
    pub fn unlock(&self, password: &[u8]) -> Result<mpi::SecretKeyMaterial> {
        match &self.protection {
            Protection::Unencrypted { mpis } => Ok(mpis.clone()),
            Protection::Encrypted { s2k, algo, sha1_check, iv, ciphertext } => {
                let key = s2k.derive_key(password, algo.key_size()?)?;

                let mut plaintext = ciphertext.clone();
                cfb_decrypt(*algo, &key, iv, &mut plaintext)?;

                let check_len = if *sha1_check { 20 } else { 2 };
                if plaintext.len() < check_len {
                    return Err(Error::MalformedPacket(
                        "Secret material shorter than its integrity \
                         check".into()).into());
                }
                let (body, check) =
                    plaintext.split_at(plaintext.len() - check_len);

                let good = if *sha1_check {
                    let mut h = HashAlgorithm::SHA1.context()?;
                    h.update(body);
                    h.into_digest() == check
                } else {
                    checksum(body).to_be_bytes() == check
                };
                if !good {
                    return Err(Error::InvalidPassword.into());
                }

                let mut bio = buffered_reader::Memory::with_cookie(
                    body, Cookie::default());
                let mpis = mpi::SecretKeyMaterial::parse(
                    self.key.pk_algo(), &mut bio)?;
                if !bio.data(1)?.is_empty() {
                    return Err(Error::TrailingData(
                        "Secret material continues past the last \
                         MPI".into()).into());
                }
                Ok(mpis)
            }
        }
    }

    /// Encrypts the secret material under `password`.
    ///
    /// Uses s2k usage 254: the given S2K and a SHA-1 integrity tag.
    /// Fails if the material is already encrypted.
    pub fn encrypt(self, password: &[u8], s2k: S2K,
                   algo: SymmetricAlgorithm, iv: Vec<u8>)
                   -> Result<SecretKey>
    {
        let mpis = match self.protection {
            Protection::Unencrypted { ref mpis } => mpis,
            Protection::Encrypted { .. } =>
                return Err(Error::InvalidOperation(
                    "Secret material is already encrypted".into()).into()),
        };

        if iv.len() != algo.block_size()? {
            return Err(Error::InvalidArgument(
                format!("IV must be {} bytes", algo.block_size()?)).into());
        }

        let mut plaintext = Vec::new();
        mpis.serialize(&mut plaintext)?;
        let mut h = HashAlgorithm::SHA1.context()?;
        h.update(&plaintext);
        plaintext.extend_from_slice(&h.into_digest());

        let key = s2k.derive_key(password, algo.key_size()?)?;
        cfb_encrypt(algo, &key, &iv, &mut plaintext)?;

        Ok(SecretKey {
            key: self.key,
            protection: Protection::Encrypted {
                s2k,
                algo,
                sha1_check: true,
                iv,
                ciphertext: plaintext,
            },
        })
    }

    /// Parses a secret key packet body.
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let key = Key::parse(bio)?;
        if key.version() == 3 {
            // v3 secret keys encrypt each MPI separately; nobody
            // should be creating them anymore.
            return Err(Error::MalformedPacket(
                "Version 3 secret keys are not supported".into()).into());
        }

        let s2k_usage = bio.data_consume_hard(1)?[0];
        let protection = match s2k_usage {
            0 => {
                let mpis = mpi::SecretKeyMaterial::parse(key.pk_algo(), bio)?;
                let expected = bio.read_be_u16()?;

                let mut body = Vec::new();
                mpis.serialize(&mut body)?;
                if checksum(&body) != expected {
                    return Err(Error::MalformedPacket(
                        "Bad secret key checksum".into()).into());
                }

                Protection::Unencrypted { mpis }
            }
            254 | 255 => {
                let algo = SymmetricAlgorithm::from(
                    bio.data_consume_hard(1)?[0]);
                let s2k = S2K::parse(bio)?;
                let bs = algo.block_size()?;
                let iv = bio.data_consume_hard(bs)?[..bs].to_vec();
                let ciphertext = bio.steal_eof()?;

                Protection::Encrypted {
                    s2k,
                    algo,
                    sha1_check: s2k_usage == 254,
                    iv,
                    ciphertext,
                }
            }
            _ => {
                // Legacy: the usage octet is the symmetric algorithm
                // and the key is the MD5 of the password.
                let algo = SymmetricAlgorithm::from(s2k_usage);
                let bs = algo.block_size()?;
                let iv = bio.data_consume_hard(bs)?[..bs].to_vec();
                let ciphertext = bio.steal_eof()?;

                Protection::Encrypted {
                    s2k: S2K::Simple { hash: HashAlgorithm::MD5 },
                    algo,
                    sha1_check: false,
                    iv,
                    ciphertext,
                }
            }
        };

        Ok(SecretKey { key, protection })
    }
}

/// The 16-bit additive checksum protecting unencrypted secret
/// material.
pub(crate) fn checksum(body: &[u8]) -> u16 {
    body.iter().fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}

fn cfb_decrypt(algo: SymmetricAlgorithm, key: &[u8], iv: &[u8],
               buf: &mut [u8])
               -> Result<()>
{
    match algo {
        SymmetricAlgorithm::AES128 =>
            cfb_mode::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .decrypt(buf),
        SymmetricAlgorithm::AES192 =>
            cfb_mode::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .decrypt(buf),
        SymmetricAlgorithm::AES256 =>
            cfb_mode::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .decrypt(buf),
        _ => return Err(Error::UnsupportedSymmetricAlgorithm(algo).into()),
    }
    Ok(())
}

fn cfb_encrypt(algo: SymmetricAlgorithm, key: &[u8], iv: &[u8],
               buf: &mut [u8])
               -> Result<()>
{
    match algo {
        SymmetricAlgorithm::AES128 =>
            cfb_mode::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .encrypt(buf),
        SymmetricAlgorithm::AES192 =>
            cfb_mode::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .encrypt(buf),
        SymmetricAlgorithm::AES256 =>
            cfb_mode::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::InvalidArgument("Bad key or IV".into()))?
                .encrypt(buf),
        _ => return Err(Error::UnsupportedSymmetricAlgorithm(algo).into()),
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::mpi::MPI;

    fn rsa_key() -> Key {
        Key::new(1136073600, PublicKeyAlgorithm::RSAEncryptSign,
                 mpi::PublicKey::RSA {
                     e: MPI::new(&[0x01, 0x00, 0x01]),
                     n: MPI::new(&[0xd5; 256]),
                 })
    }

    #[test]
    fn v4_fingerprint_and_keyid_agree() {
        let key = rsa_key();
        let fp = key.fingerprint();
        assert_eq!(fp.as_bytes().len(), 20);
        assert_eq!(fp.keyid(), key.keyid());
    }

    #[test]
    fn v3_keyid_is_modulus_suffix() {
        let key = Key::new_v3(1136073600, 0,
                              PublicKeyAlgorithm::RSAEncryptSign,
                              mpi::PublicKey::RSA {
                                  e: MPI::new(&[0x01, 0x00, 0x01]),
                                  n: MPI::new(&[0xd5; 256]),
                              });
        assert_eq!(key.keyid(), KeyID::Long([0xd5; 8]));
    }

    #[test]
    fn checksum_is_additive() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xff; 300]), (300u32 * 0xff) as u16);
    }

    #[test]
    fn encrypt_then_unlock() {
        let material = mpi::SecretKeyMaterial::RSA {
            d: MPI::new(&[0x44; 256]),
            p: MPI::new(&[0x45; 128]),
            q: MPI::new(&[0x46; 128]),
            u: MPI::new(&[0x47; 128]),
        };
        let secret = SecretKey::new(rsa_key(), material.clone());

        let s2k = S2K::Iterated {
            hash: HashAlgorithm::SHA1,
            salt: [7; 8],
            iterations: 65536,
        };
        let encrypted = secret.clone()
            .encrypt(b"hunter2", s2k, SymmetricAlgorithm::AES128,
                     vec![0x17; 16])
            .unwrap();
        assert!(encrypted.is_encrypted());

        let mpis = encrypted.unlock(b"hunter2").unwrap();
        assert_eq!(mpis, material);

        let err = encrypted.unlock(b"wrong").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(),
                         Some(Error::InvalidPassword)));
    }
}
