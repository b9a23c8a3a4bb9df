//! Multiprecision integers.
//!
//! An MPI is encoded on the wire as a two-octet big-endian bit count
//! followed by the magnitude, most significant octet first.  The bit
//! count refers to the position of the most significant set bit, so
//! canonical encodings carry no leading zero octets (see [Section 3.2
//! of RFC 4880]).
//!
//!   [Section 3.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-3.2

use std::fmt;
use std::io::Write;

use buffered_reader::BufferedReader;

use crate::Error;
use crate::Result;
use crate::crypto::hash::{self, Hash};
use crate::parse::Cookie;
use crate::types::PublicKeyAlgorithm;

/// Holds a single MPI.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MPI {
    /// Integer value as big-endian.
    value: Box<[u8]>,
}

impl From<Vec<u8>> for MPI {
    fn from(v: Vec<u8>) -> Self {
        Self::new(&v)
    }
}

impl MPI {
    /// Creates a new MPI.
    ///
    /// This function takes care of leading zeros.
    pub fn new(value: &[u8]) -> Self {
        let offset = value.iter().take_while(|&&b| b == 0).count();
        MPI {
            value: Vec::from(&value[offset..]).into_boxed_slice(),
        }
    }

    /// Returns the length of the MPI in bits.
    pub fn bits(&self) -> usize {
        self.value.len() * 8
            - self.value.get(0).map(|&b| b.leading_zeros() as usize)
                  .unwrap_or(0)
    }

    /// Returns the value of this MPI.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns the value, left-padded with zeros to `to` bytes.
    ///
    /// Useful for signature schemes that expect fixed-width octet
    /// strings where the MPI encoding dropped the leading zeros.
    /// Fails if the value does not fit.
    pub fn value_padded(&self, to: usize) -> Result<Vec<u8>> {
        if self.value.len() > to {
            return Err(Error::InvalidArgument(
                format!("MPI is {} bytes, expected at most {}",
                        self.value.len(), to)).into());
        }

        let mut v = vec![0u8; to];
        v[to - self.value.len()..].copy_from_slice(&self.value);
        Ok(v)
    }

    /// Parses an OpenPGP MPI.
    ///
    /// A bit count that does not match the magnitude, or that runs
    /// past the end of the enclosing region, is an
    /// [`Error::MalformedMPI`].
    pub fn parse(bio: &mut dyn BufferedReader<Cookie>) -> Result<Self> {
        let bits = bio.read_be_u16().map_err(|_| Error::MalformedMPI(
            "Truncated MPI length prefix".into()))? as usize;
        if bits == 0 {
            return Ok(MPI { value: Vec::new().into_boxed_slice() });
        }

        let bytes = (bits + 7) / 8;
        let value = bio.data_consume_hard(bytes).map_err(|_| {
            Error::MalformedMPI(
                format!("MPI claims {} bits, but the data ran out", bits))
        })?[..bytes].to_vec();

        let unused_bits = bytes * 8 - bits;
        debug_assert!(unused_bits <= 7);

        // The top bit of the leading octet must be the declared most
        // significant bit.
        if value[0] >> (7 - unused_bits) != 1 {
            return Err(Error::MalformedMPI(
                format!("MPI claims {} bits, but the high bit disagrees",
                        bits)).into());
        }

        Ok(MPI { value: value.into_boxed_slice() })
    }

    /// Writes the MPI in OpenPGP wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        o.write_all(&(self.bits() as u16).to_be_bytes())?;
        o.write_all(&self.value)?;
        Ok(())
    }

    /// The length of the wire encoding.
    pub fn serialized_len(&self) -> usize {
        2 + self.value.len()
    }
}

impl fmt::Debug for MPI {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!(
            "{} bits: {}", self.bits(),
            self.value.iter().map(|b| format!("{:02X}", b))
                .collect::<String>()))
    }
}

impl Hash for MPI {
    fn hash(&self, hash: &mut hash::Context) {
        let len = self.bits() as u16;

        hash.update(&len.to_be_bytes());
        hash.update(&self.value);
    }
}

/// Holds the public MPIs of a key.
///
/// Provides a typed and structured way of storing multiple MPIs in
/// key packets.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum PublicKey {
    /// RSA public key.
    RSA {
        /// Public exponent.
        e: MPI,
        /// Public modulo N = pq.
        n: MPI,
    },

    /// NIST DSA public key.
    DSA {
        /// Prime of the ring Zp.
        p: MPI,
        /// Order of `g` in Zp.
        q: MPI,
        /// Public generator of Zp.
        g: MPI,
        /// Public key g^x mod p.
        y: MPI,
    },

    /// ElGamal public key.
    ElGamal {
        /// Prime of the ring Zp.
        p: MPI,
        /// Generator of Zp.
        g: MPI,
        /// Public key g^x mod p.
        y: MPI,
    },

    /// Unknown number of MPIs for an unknown algorithm.
    Unknown {
        /// The successfully parsed MPIs.
        mpis: Box<[MPI]>,
        /// Any data that failed to parse.
        rest: Box<[u8]>,
    },
}

impl PublicKey {
    /// Returns the length of the public key in bits.
    ///
    /// For finite field crypto this returns the size of the field we
    /// operate in.  Returns `None` for unknown keys.
    pub fn bits(&self) -> Option<usize> {
        use self::PublicKey::*;
        match self {
            RSA { n, .. } => Some(n.bits()),
            DSA { p, .. } => Some(p.bits()),
            ElGamal { p, .. } => Some(p.bits()),
            Unknown { .. } => None,
        }
    }

    /// Parses the MPIs belonging to `algo`.
    ///
    /// See [Section 5.5.2 of RFC 4880] for the layout per algorithm.
    ///
    ///   [Section 5.5.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.5.2
    pub fn parse(algo: PublicKeyAlgorithm,
                 bio: &mut dyn BufferedReader<Cookie>)
                 -> Result<Self>
    {
        use crate::types::PublicKeyAlgorithm::*;

        #[allow(deprecated)]
        match algo {
            RSAEncryptSign | RSAEncrypt | RSASign => {
                let n = MPI::parse(bio)?;
                let e = MPI::parse(bio)?;

                Ok(PublicKey::RSA { e, n })
            }

            DSA => {
                let p = MPI::parse(bio)?;
                let q = MPI::parse(bio)?;
                let g = MPI::parse(bio)?;
                let y = MPI::parse(bio)?;

                Ok(PublicKey::DSA { p, q, g, y })
            }

            ElGamalEncrypt => {
                let p = MPI::parse(bio)?;
                let g = MPI::parse(bio)?;
                let y = MPI::parse(bio)?;

                Ok(PublicKey::ElGamal { p, g, y })
            }

            Private(_) | Unknown(_) => {
                let (mpis, rest) = parse_unknown(bio)?;
                Ok(PublicKey::Unknown {
                    mpis: mpis.into_boxed_slice(),
                    rest: rest.into_boxed_slice(),
                })
            }
        }
    }

    /// Writes the MPIs in OpenPGP wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        use self::PublicKey::*;
        match self {
            RSA { e, n } => {
                n.serialize(o)?;
                e.serialize(o)?;
            }
            DSA { p, q, g, y } => {
                p.serialize(o)?;
                q.serialize(o)?;
                g.serialize(o)?;
                y.serialize(o)?;
            }
            ElGamal { p, g, y } => {
                p.serialize(o)?;
                g.serialize(o)?;
                y.serialize(o)?;
            }
            Unknown { mpis, rest } => {
                for mpi in mpis.iter() {
                    mpi.serialize(o)?;
                }
                o.write_all(rest)?;
            }
        }
        Ok(())
    }

    /// The length of the wire encoding.
    pub fn serialized_len(&self) -> usize {
        use self::PublicKey::*;
        match self {
            RSA { e, n } =>
                n.serialized_len() + e.serialized_len(),
            DSA { p, q, g, y } =>
                p.serialized_len() + q.serialized_len()
                + g.serialized_len() + y.serialized_len(),
            ElGamal { p, g, y } =>
                p.serialized_len() + g.serialized_len() + y.serialized_len(),
            Unknown { mpis, rest } =>
                mpis.iter().map(|m| m.serialized_len()).sum::<usize>()
                + rest.len(),
        }
    }
}

impl Hash for PublicKey {
    fn hash(&self, hash: &mut hash::Context) {
        use self::PublicKey::*;
        match self {
            RSA { e, n } => {
                n.hash(hash);
                e.hash(hash);
            }
            DSA { p, q, g, y } => {
                p.hash(hash);
                q.hash(hash);
                g.hash(hash);
                y.hash(hash);
            }
            ElGamal { p, g, y } => {
                p.hash(hash);
                g.hash(hash);
                y.hash(hash);
            }
            Unknown { mpis, rest } => {
                for mpi in mpis.iter() {
                    mpi.hash(hash);
                }
                hash.update(rest);
            }
        }
    }
}

/// Holds the MPIs of a signature.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum Signature {
    /// RSA signature.
    RSA {
        /// Signature m^d mod N.
        s: MPI,
    },

    /// NIST DSA signature.
    DSA {
        /// `r` value.
        r: MPI,
        /// `s` value.
        s: MPI,
    },

    /// Unknown number of MPIs for an unknown algorithm.
    Unknown {
        /// The successfully parsed MPIs.
        mpis: Box<[MPI]>,
        /// Any data that failed to parse.
        rest: Box<[u8]>,
    },
}

impl Signature {
    /// Parses the MPIs belonging to a signature made with `algo`.
    pub fn parse(algo: PublicKeyAlgorithm,
                 bio: &mut dyn BufferedReader<Cookie>)
                 -> Result<Self>
    {
        use crate::types::PublicKeyAlgorithm::*;

        #[allow(deprecated)]
        match algo {
            RSAEncryptSign | RSAEncrypt | RSASign => {
                let s = MPI::parse(bio)?;
                Ok(Signature::RSA { s })
            }

            DSA => {
                let r = MPI::parse(bio)?;
                let s = MPI::parse(bio)?;
                Ok(Signature::DSA { r, s })
            }

            ElGamalEncrypt | Private(_) | Unknown(_) => {
                let (mpis, rest) = parse_unknown(bio)?;
                Ok(Signature::Unknown {
                    mpis: mpis.into_boxed_slice(),
                    rest: rest.into_boxed_slice(),
                })
            }
        }
    }

    /// Writes the MPIs in OpenPGP wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        use self::Signature::*;
        match self {
            RSA { s } => s.serialize(o)?,
            DSA { r, s } => {
                r.serialize(o)?;
                s.serialize(o)?;
            }
            Unknown { mpis, rest } => {
                for mpi in mpis.iter() {
                    mpi.serialize(o)?;
                }
                o.write_all(rest)?;
            }
        }
        Ok(())
    }

    /// The length of the wire encoding.
    pub fn serialized_len(&self) -> usize {
        use self::Signature::*;
        match self {
            RSA { s } => s.serialized_len(),
            DSA { r, s } => r.serialized_len() + s.serialized_len(),
            Unknown { mpis, rest } =>
                mpis.iter().map(|m| m.serialized_len()).sum::<usize>()
                + rest.len(),
        }
    }
}

/// Holds the secret MPIs of a key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub enum SecretKeyMaterial {
    /// RSA secret key.
    RSA {
        /// Secret exponent, inverse of e in Phi(N).
        d: MPI,
        /// Smaller secret prime.
        p: MPI,
        /// Larger secret prime.
        q: MPI,
        /// Inverse of p mod q.
        u: MPI,
    },

    /// NIST DSA secret key.
    DSA {
        /// Secret key log_g(y) in Zp.
        x: MPI,
    },

    /// ElGamal secret key.
    ElGamal {
        /// Secret key log_g(y) in Zp.
        x: MPI,
    },

    /// Unknown number of MPIs for an unknown algorithm.
    Unknown {
        /// The successfully parsed MPIs.
        mpis: Box<[MPI]>,
        /// Any data that failed to parse.
        rest: Box<[u8]>,
    },
}

impl SecretKeyMaterial {
    /// Parses secret key MPIs belonging to `algo`.
    ///
    /// See [Section 5.5.3 of RFC 4880] for the layout per algorithm.
    ///
    ///   [Section 5.5.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.5.3
    pub fn parse(algo: PublicKeyAlgorithm,
                 bio: &mut dyn BufferedReader<Cookie>)
                 -> Result<Self>
    {
        use crate::types::PublicKeyAlgorithm::*;

        #[allow(deprecated)]
        match algo {
            RSAEncryptSign | RSAEncrypt | RSASign => {
                let d = MPI::parse(bio)?;
                let p = MPI::parse(bio)?;
                let q = MPI::parse(bio)?;
                let u = MPI::parse(bio)?;

                Ok(SecretKeyMaterial::RSA { d, p, q, u })
            }

            DSA => {
                let x = MPI::parse(bio)?;
                Ok(SecretKeyMaterial::DSA { x })
            }

            ElGamalEncrypt => {
                let x = MPI::parse(bio)?;
                Ok(SecretKeyMaterial::ElGamal { x })
            }

            Private(_) | Unknown(_) => {
                let (mpis, rest) = parse_unknown(bio)?;
                Ok(SecretKeyMaterial::Unknown {
                    mpis: mpis.into_boxed_slice(),
                    rest: rest.into_boxed_slice(),
                })
            }
        }
    }

    /// Writes the MPIs in OpenPGP wire format.
    pub fn serialize(&self, o: &mut dyn Write) -> Result<()> {
        use self::SecretKeyMaterial::*;
        match self {
            RSA { d, p, q, u } => {
                d.serialize(o)?;
                p.serialize(o)?;
                q.serialize(o)?;
                u.serialize(o)?;
            }
            DSA { x } => x.serialize(o)?,
            ElGamal { x } => x.serialize(o)?,
            Unknown { mpis, rest } => {
                for mpi in mpis.iter() {
                    mpi.serialize(o)?;
                }
                o.write_all(rest)?;
            }
        }
        Ok(())
    }

    /// The length of the wire encoding.
    pub fn serialized_len(&self) -> usize {
        use self::SecretKeyMaterial::*;
        match self {
            RSA { d, p, q, u } =>
                d.serialized_len() + p.serialized_len()
                + q.serialized_len() + u.serialized_len(),
            DSA { x } => x.serialized_len(),
            ElGamal { x } => x.serialized_len(),
            Unknown { mpis, rest } =>
                mpis.iter().map(|m| m.serialized_len()).sum::<usize>()
                + rest.len(),
        }
    }
}

// Reads MPIs until one fails to parse, then keeps the rest raw.
fn parse_unknown(bio: &mut dyn BufferedReader<Cookie>)
                 -> Result<(Vec<MPI>, Vec<u8>)>
{
    let mut mpis = Vec::new();
    loop {
        if bio.data(1)?.is_empty() {
            return Ok((mpis, Vec::new()));
        }

        // Only consume the MPI if it parses.
        let lookahead = bio.data(2)?;
        if lookahead.len() < 2 {
            return Ok((mpis, bio.steal_eof()?));
        }
        let bits = u16::from_be_bytes([lookahead[0], lookahead[1]]) as usize;
        let total = 2 + (bits + 7) / 8;
        if bio.data(total)?.len() < total {
            return Ok((mpis, bio.steal_eof()?));
        }

        match MPI::parse(bio) {
            Ok(mpi) => mpis.push(mpi),
            Err(_) => return Ok((mpis, bio.steal_eof()?)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use buffered_reader::Memory;

    fn reader(data: &[u8]) -> Memory<'_, Cookie> {
        Memory::with_cookie(data, Cookie::default())
    }

    #[test]
    fn mpi_roundtrip() {
        let mpi = MPI::new(&[0x01, 0xfe, 0xff]);
        assert_eq!(mpi.bits(), 17);

        let mut buf = Vec::new();
        mpi.serialize(&mut buf).unwrap();
        assert_eq!(&buf, &[0x00, 0x11, 0x01, 0xfe, 0xff]);

        let mut bio = reader(&buf);
        assert_eq!(MPI::parse(&mut bio).unwrap(), mpi);
    }

    #[test]
    fn mpi_strips_leading_zeros() {
        let mpi = MPI::new(&[0x00, 0x00, 0x17]);
        assert_eq!(mpi.value(), &[0x17]);
        assert_eq!(mpi.bits(), 5);
    }

    #[test]
    fn mpi_length_exceeds_data() {
        // Claims 65535 bits, provides two octets.
        let mut bio = reader(&[0xff, 0xff, 0x80, 0x01]);
        let err = MPI::parse(&mut bio).unwrap_err();
        assert!(matches!(err.downcast_ref::<crate::Error>(),
                         Some(crate::Error::MalformedMPI(_))));
    }

    #[test]
    fn mpi_high_bit_disagrees() {
        // Claims 16 bits, but the top bit of the leading octet is
        // clear.
        let mut bio = reader(&[0x00, 0x10, 0x7f, 0xff]);
        let err = MPI::parse(&mut bio).unwrap_err();
        assert!(matches!(err.downcast_ref::<crate::Error>(),
                         Some(crate::Error::MalformedMPI(_))));
    }

    #[test]
    fn mpi_zero() {
        let mut bio = reader(&[0x00, 0x00]);
        let mpi = MPI::parse(&mut bio).unwrap();
        assert_eq!(mpi.bits(), 0);
        assert_eq!(mpi.value(), b"");
    }

    #[test]
    fn value_padded() {
        let mpi = MPI::new(&[0x01, 0x02]);
        assert_eq!(mpi.value_padded(4).unwrap(), vec![0, 0, 1, 2]);
        assert!(mpi.value_padded(1).is_err());
    }

    #[test]
    fn rsa_public_roundtrip() {
        let pk = PublicKey::RSA {
            e: MPI::new(&[0x01, 0x00, 0x01]),
            n: MPI::new(&[0xab; 256]),
        };

        let mut buf = Vec::new();
        pk.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), pk.serialized_len());

        let mut bio = reader(&buf);
        let parsed = PublicKey::parse(
            PublicKeyAlgorithm::RSAEncryptSign, &mut bio).unwrap();
        assert_eq!(parsed, pk);
    }
}
