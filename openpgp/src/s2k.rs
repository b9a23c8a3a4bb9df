//! String-to-Key (S2K) specifiers.
//!
//! String-to-key specifiers are used to convert passphrase strings
//! into symmetric-key encryption/decryption keys; in this crate they
//! appear only as the protection of secret key material.
//!
//! See [Section 3.7 of RFC 4880].
//!
//!   [Section 3.7 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-3.7

use std::fmt;
use std::io::Write;

use buffered_reader::BufferedReader;

use crate::Error;
use crate::Result;
use crate::parse::Cookie;
use crate::types::HashAlgorithm;

/// String-to-Key (S2K) specifiers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[non_exhaustive]
pub enum S2K {
    /// Simply hashes the password.
    Simple {
        /// Hash used for key generation.
        hash: HashAlgorithm,
    },
    /// Hashes the password with a public `salt` value.
    Salted {
        /// Hash used for key generation.
        hash: HashAlgorithm,
        /// Public salt value mixed into the password.
        salt: [u8; 8],
    },
    /// Repeatedly hashes the password with a public `salt` value.
    Iterated {
        /// Hash used for key generation.
        hash: HashAlgorithm,
        /// Public salt value mixed into the password.
        salt: [u8; 8],
        /// Number of bytes to hash.
        iterations: u32,
    },
    /// Private S2K algorithm.
    Private(u8),
    /// Unknown S2K algorithm.
    Unknown(u8),
}

impl S2K {
    /// Parses an S2K specifier.
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let typ = bio.data_consume_hard(1)?[0];
        match typ {
            0 => {
                let hash = HashAlgorithm::from(bio.data_consume_hard(1)?[0]);
                Ok(S2K::Simple { hash })
            }
            1 => {
                let hash = HashAlgorithm::from(bio.data_consume_hard(1)?[0]);
                let mut salt = [0u8; 8];
                salt.copy_from_slice(&bio.data_consume_hard(8)?[..8]);
                Ok(S2K::Salted { hash, salt })
            }
            3 => {
                let hash = HashAlgorithm::from(bio.data_consume_hard(1)?[0]);
                let mut salt = [0u8; 8];
                salt.copy_from_slice(&bio.data_consume_hard(8)?[..8]);
                let iterations =
                    S2K::decode_count(bio.data_consume_hard(1)?[0]);
                Ok(S2K::Iterated { hash, salt, iterations })
            }
            100..=110 => Ok(S2K::Private(typ)),
            u => Ok(S2K::Unknown(u)),
        }
    }

    /// Writes the specifier in wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        match self {
            S2K::Simple { hash } => {
                o.write_all(&[0, u8::from(*hash)])?;
            }
            S2K::Salted { hash, salt } => {
                o.write_all(&[1, u8::from(*hash)])?;
                o.write_all(salt)?;
            }
            S2K::Iterated { hash, salt, iterations } => {
                o.write_all(&[3, u8::from(*hash)])?;
                o.write_all(salt)?;
                o.write_all(&[S2K::encode_count(*iterations)?])?;
            }
            S2K::Private(u) | S2K::Unknown(u) => {
                o.write_all(&[*u])?;
            }
        }
        Ok(())
    }

    /// Converts the password to a key using the S2K's parameters.
    pub fn derive_key(&self, password: &[u8], key_size: usize)
                      -> Result<Vec<u8>>
    {
        match self {
            S2K::Simple { hash } | S2K::Salted { hash, .. }
            | S2K::Iterated { hash, .. } => {
                let mut hash = hash.context()?;

                // If the digest length is shorter than the key
                // length, we need to concatenate multiple digests,
                // each preloaded with one more zero octet than the
                // previous one.
                let hash_sz = hash.digest_size();
                let num_contexts = (key_size + hash_sz - 1) / hash_sz;
                let mut zeros = Vec::with_capacity(num_contexts + 1);
                let mut ret = vec![0u8; key_size];

                for chunk in ret.chunks_mut(hash_sz) {
                    hash.update(&zeros[..]);

                    match self {
                        S2K::Simple { .. } => {
                            hash.update(password);
                        }
                        S2K::Salted { salt, .. } => {
                            hash.update(salt);
                            hash.update(password);
                        }
                        S2K::Iterated { salt, iterations, .. } => {
                            // Independent of the iteration count, the
                            // whole salt and password are hashed at
                            // least once.  The count is in bytes.
                            let mut data =
                                Vec::with_capacity(salt.len() + password.len());
                            data.extend_from_slice(salt);
                            data.extend_from_slice(password);

                            let octs_per_iter = data.len();
                            let full = *iterations as usize / octs_per_iter;
                            let tail = *iterations as usize
                                - full * octs_per_iter;

                            for _ in 0..full.max(1) {
                                hash.update(&data);
                            }
                            if full > 0 && tail != 0 {
                                hash.update(&data[0..tail]);
                            }
                        }
                        S2K::Unknown(_) | S2K::Private(_) => unreachable!(),
                    }

                    let mut digest = vec![0u8; hash_sz];
                    hash.digest(&mut digest);
                    chunk.copy_from_slice(&digest[..chunk.len()]);
                    zeros.push(0);
                }

                Ok(ret)
            }
            S2K::Unknown(u) | S2K::Private(u) =>
                Err(Error::MalformedPacket(
                    format!("Unknown S2K type {:#x}", u)).into()),
        }
    }

    /// Decodes the OpenPGP coded iteration count.
    pub fn decode_count(coded: u8) -> u32 {
        let expbias = 6u32;
        (16 + (coded as u32 & 15)) << ((coded as u32 >> 4) + expbias)
    }

    /// Encodes an iteration count.
    ///
    /// Not all iteration counts are encodable; this fails rather than
    /// rounding.  The largest encodable count is 0x3e00000.
    pub fn encode_count(iters: u32) -> Result<u8> {
        for coded in 0..=255u8 {
            if S2K::decode_count(coded) == iters {
                return Ok(coded);
            }
        }

        Err(Error::InvalidArgument(
            format!("Iteration count {} is not encodable", iters)).into())
    }
}

impl fmt::Display for S2K {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            S2K::Simple { hash } =>
                f.write_fmt(format_args!("Simple S2K with {}", hash)),
            S2K::Salted { hash, .. } =>
                f.write_fmt(format_args!("Salted S2K with {}", hash)),
            S2K::Iterated { hash, iterations, .. } =>
                f.write_fmt(format_args!(
                    "Iterated and salted S2K with {} ({} iterations)",
                    hash, iterations)),
            S2K::Private(u) =>
                f.write_fmt(format_args!("Private/Experimental S2K {}", u)),
            S2K::Unknown(u) =>
                f.write_fmt(format_args!("Unknown S2K {:#x}", u)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use buffered_reader::Memory;

    #[test]
    fn coded_count_roundtrip() {
        for coded in 0..=255u8 {
            let count = S2K::decode_count(coded);
            assert_eq!(S2K::encode_count(count).unwrap(), coded);
        }
    }

    #[test]
    fn coded_count_values() {
        // Fixed points from RFC 4880.
        assert_eq!(S2K::decode_count(0), 1024);
        assert_eq!(S2K::decode_count(255), 0x3e00000);
        assert_eq!(S2K::decode_count(96), 65536);
    }

    #[test]
    fn parse_roundtrip() {
        let specs = [
            S2K::Simple { hash: HashAlgorithm::SHA1 },
            S2K::Salted {
                hash: HashAlgorithm::SHA256,
                salt: [1, 2, 3, 4, 5, 6, 7, 8],
            },
            S2K::Iterated {
                hash: HashAlgorithm::SHA512,
                salt: [8, 7, 6, 5, 4, 3, 2, 1],
                iterations: 65536,
            },
        ];

        for s2k in specs {
            let mut buf = Vec::new();
            s2k.serialize(&mut buf).unwrap();
            let mut bio = Memory::with_cookie(&buf, Cookie::default());
            assert_eq!(S2K::parse(&mut bio).unwrap(), s2k);
        }
    }

    #[test]
    fn simple_derive_matches_plain_hash() {
        // A simple S2K with a key no longer than the digest is just
        // the hash of the password.
        let s2k = S2K::Simple { hash: HashAlgorithm::SHA1 };
        let key = s2k.derive_key(b"password", 16).unwrap();

        let mut ctx = HashAlgorithm::SHA1.context().unwrap();
        ctx.update(b"password");
        assert_eq!(&key[..], &ctx.into_digest()[..16]);
    }

    #[test]
    fn iterated_hashes_at_least_once() {
        let s2k = S2K::Iterated {
            hash: HashAlgorithm::SHA1,
            salt: [0; 8],
            iterations: 1024,
        };
        // 8 bytes salt + 100 bytes password > 1024/16; still must
        // not panic and must produce a full-size key.
        let key = s2k.derive_key(&[0x61; 100], 32).unwrap();
        assert_eq!(key.len(), 32);
    }
}
