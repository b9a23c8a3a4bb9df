//! Functionality to hash packets, and generate hashes.
//!
//! Signatures are not computed over decoded structures but over
//! canonical byte streams: key bodies framed with `0x99` and a
//! two-octet length, user ids framed with `0xB4` and a four-octet
//! length, and so on (see [Section 5.2.4 of RFC 4880]).  The [`Hash`]
//! trait implementations below produce exactly those streams.
//!
//!   [Section 5.2.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.4

use std::io;

use dyn_clone::DynClone;

use crate::Error;
use crate::Result;
use crate::packet::{Key, Signature, UserAttribute, UserID};
use crate::types::HashAlgorithm;

/// Hasher interface the digest implementations are used through.
pub(crate) trait Backend: DynClone + Send + Sync {
    /// Writes data into the hash function.
    fn update(&mut self, data: &[u8]);

    /// Finalizes the hash function and writes the digest into
    /// `digest`, resetting the context.
    fn digest(&mut self, digest: &mut [u8]);

    /// Size of the digest in bytes.
    fn digest_size(&self) -> usize;
}

impl<D> Backend for D
where
    D: digest::Digest + digest::FixedOutputReset + Clone + Send + Sync,
{
    fn update(&mut self, data: &[u8]) {
        digest::Digest::update(self, data);
    }

    fn digest(&mut self, digest: &mut [u8]) {
        let d = digest::Digest::finalize_reset(self);
        let n = d.len().min(digest.len());
        digest[..n].copy_from_slice(&d[..n]);
    }

    fn digest_size(&self) -> usize {
        <D as digest::Digest>::output_size()
    }
}

/// State of a hash function.
pub struct Context {
    algo: HashAlgorithm,
    ctx: Box<dyn Backend>,
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Context {
            algo: self.algo,
            ctx: dyn_clone::clone_box(&*self.ctx),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Context").field("algo", &self.algo).finish()
    }
}

impl Context {
    /// Returns the algorithm.
    pub fn algo(&self) -> HashAlgorithm {
        self.algo
    }

    /// Size of the digest in bytes.
    pub fn digest_size(&self) -> usize {
        self.ctx.digest_size()
    }

    /// Writes data into the hash function.
    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        self.ctx.update(data.as_ref());
    }

    /// Finalizes the hash function and writes the digest into the
    /// provided slice.
    ///
    /// Resets the hash function context.  `digest` must be at least
    /// `self.digest_size()` bytes large, otherwise the digest will be
    /// truncated.
    pub fn digest<D: AsMut<[u8]>>(&mut self, mut digest: D) {
        self.ctx.digest(digest.as_mut());
    }

    /// Finalizes the hash function and returns the digest.
    pub fn into_digest(mut self) -> Vec<u8> {
        let mut digest = vec![0u8; self.ctx.digest_size()];
        self.ctx.digest(&mut digest);
        digest
    }
}

impl io::Write for Context {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HashAlgorithm {
    /// Whether this crate supports this algorithm.
    pub fn is_supported(self) -> bool {
        match self {
            HashAlgorithm::MD5 => true,
            HashAlgorithm::SHA1 => true,
            HashAlgorithm::RipeMD => true,
            HashAlgorithm::SHA256 => true,
            HashAlgorithm::SHA384 => true,
            HashAlgorithm::SHA512 => true,
            HashAlgorithm::SHA224 => true,
            HashAlgorithm::Private(_) => false,
            HashAlgorithm::Unknown(_) => false,
        }
    }

    /// Creates a new hash context for this algorithm.
    ///
    /// # Errors
    ///
    /// Fails with `Error::UnsupportedHashAlgorithm` for algorithms
    /// where [`HashAlgorithm::is_supported`] is false.
    pub fn context(self) -> Result<Context> {
        let ctx: Box<dyn Backend> = match self {
            HashAlgorithm::MD5 =>
                Box::new(md5::Md5::default()),
            HashAlgorithm::SHA1 =>
                Box::new(sha1collisiondetection::Sha1CD::default()),
            HashAlgorithm::RipeMD =>
                Box::new(ripemd::Ripemd160::default()),
            HashAlgorithm::SHA256 =>
                Box::new(sha2::Sha256::default()),
            HashAlgorithm::SHA384 =>
                Box::new(sha2::Sha384::default()),
            HashAlgorithm::SHA512 =>
                Box::new(sha2::Sha512::default()),
            HashAlgorithm::SHA224 =>
                Box::new(sha2::Sha224::default()),
            HashAlgorithm::Private(_) | HashAlgorithm::Unknown(_) =>
                return Err(Error::UnsupportedHashAlgorithm(self).into()),
        };

        Ok(Context { algo: self, ctx })
    }
}

/// Hashes OpenPGP packets and related types.
pub trait Hash {
    /// Updates the given hash with this object.
    fn hash(&self, hash: &mut Context);
}

impl Hash for UserID {
    /// Updates the hash with the v4 framing of the user id.
    fn hash(&self, hash: &mut Context) {
        let mut header = [0; 5];

        header[0] = 0xB4;
        let len = self.value().len() as u32;
        header[1..5].copy_from_slice(&len.to_be_bytes());

        hash.update(&header[..]);
        hash.update(self.value());
    }
}

impl Hash for UserAttribute {
    /// Updates the hash with the v4 framing of the user attribute.
    fn hash(&self, hash: &mut Context) {
        let mut header = [0; 5];

        header[0] = 0xD1;
        let len = self.value().len() as u32;
        header[1..5].copy_from_slice(&len.to_be_bytes());

        hash.update(&header[..]);
        hash.update(self.value());
    }
}

impl Hash for Key {
    /// Updates the hash with the key body framed by `0x99` and a
    /// two-octet length.
    ///
    /// This framing is used both for fingerprints and whenever a
    /// signature is made over a key.
    fn hash(&self, hash: &mut Context) {
        let len = self.public_body_len();

        let mut header: Vec<u8> = Vec::with_capacity(3 + len);

        header.push(0x99);
        header.push(((len >> 8) & 0xFF) as u8);
        header.push((len & 0xFF) as u8);

        header.push(self.version());
        header.extend_from_slice(&self.creation_time().to_be_bytes());
        if self.version() == 3 {
            header.extend_from_slice(&self.validity_days().to_be_bytes());
        }
        header.push(self.pk_algo().into());

        hash.update(&header[..]);

        self.mpis().hash(hash);
    }
}

impl Hash for Signature {
    /// Mixes in the signature's own contribution: the hashed fields
    /// and the version-specific trailer.
    ///
    /// For v4 signatures this is the five fixed octets, the hashed
    /// subpacket area, and the `version || 0xFF || len32` trailer;
    /// for v3 signatures it is the one-octet type followed by the
    /// four-octet creation time.
    fn hash(&self, hash: &mut Context) {
        if self.version() == 3 {
            let mut trailer = [0u8; 5];
            trailer[0] = self.typ().into();
            trailer[1..5].copy_from_slice(
                &self.signature_creation_time().unwrap_or(0).to_be_bytes());
            hash.update(&trailer[..]);
        } else {
            let mut header = [0u8; 6];

            header[0] = self.version();
            header[1] = self.typ().into();
            header[2] = self.pk_algo().into();
            header[3] = self.hash_algo().into();

            let hashed = self.hashed_area().data();
            let len = hashed.len();
            header[4] = (len >> 8) as u8;
            header[5] = len as u8;

            hash.update(&header[..]);
            hash.update(hashed);

            // The amount hashed from this packet, excluding the
            // trailer itself.
            let mut trailer = [0u8; 6];
            trailer[0] = self.version();
            trailer[1] = 0xff;
            let len = (header.len() + hashed.len()) as u32;
            trailer[2..6].copy_from_slice(&len.to_be_bytes());

            hash.update(&trailer[..]);
        }
    }
}

/// Hashing-related functionality.
impl Signature {
    /// Computes the message digest of standalone and timestamp
    /// signatures.
    pub fn standalone_hash(&self) -> Result<Vec<u8>> {
        let mut h = self.hash_algo().context()?;
        self.hash(&mut h);
        Ok(h.into_digest())
    }

    /// Returns the message digest of a direct key signature or key
    /// revocation over `key`.
    pub fn direct_key_hash(&self, key: &Key) -> Result<Vec<u8>> {
        let mut h = self.hash_algo().context()?;

        key.hash(&mut h);
        self.hash(&mut h);

        Ok(h.into_digest())
    }

    /// Returns the message digest of a subkey binding or revocation
    /// over the primary key and subkey.
    pub fn subkey_binding_hash(&self, key: &Key, subkey: &Key)
                               -> Result<Vec<u8>>
    {
        let mut h = self.hash_algo().context()?;

        key.hash(&mut h);
        subkey.hash(&mut h);
        self.hash(&mut h);

        Ok(h.into_digest())
    }

    /// Returns the message digest of a certification over the primary
    /// key and user id.
    ///
    /// A v3 certification hashes the user id bytes without the v4
    /// framing octets (see [Section 5.2.2 of RFC 4880]).
    ///
    ///   [Section 5.2.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.2
    pub fn userid_binding_hash(&self, key: &Key, userid: &UserID)
                               -> Result<Vec<u8>>
    {
        let mut h = self.hash_algo().context()?;

        key.hash(&mut h);
        if self.version() == 3 {
            h.update(userid.value());
        } else {
            userid.hash(&mut h);
        }
        self.hash(&mut h);

        Ok(h.into_digest())
    }

    /// Returns the message digest of a certification over the primary
    /// key and user attribute.
    pub fn user_attribute_binding_hash(&self, key: &Key, ua: &UserAttribute)
                                       -> Result<Vec<u8>>
    {
        let mut h = self.hash_algo().context()?;

        key.hash(&mut h);
        if self.version() == 3 {
            h.update(ua.value());
        } else {
            ua.hash(&mut h);
        }
        self.hash(&mut h);

        Ok(h.into_digest())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sha1_abc() {
        let mut ctx = HashAlgorithm::SHA1.context().unwrap();
        ctx.update(b"abc");
        assert_eq!(ctx.into_digest(), [
            0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e,
            0x25, 0x71, 0x78, 0x50, 0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d,
        ]);
    }

    #[test]
    fn sha256_empty() {
        let ctx = HashAlgorithm::SHA256.context().unwrap();
        assert_eq!(ctx.digest_size(), 32);
        assert_eq!(ctx.into_digest(), [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14,
            0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
            0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c,
            0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
        ]);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = HashAlgorithm::SHA256.context().unwrap();
        a.update(b"common");
        let mut b = a.clone();

        a.update(b"left");
        b.update(b"right");
        assert_ne!(a.into_digest(), b.into_digest());
    }

    #[test]
    fn unsupported() {
        assert!(HashAlgorithm::Unknown(42).context().is_err());
        assert!(!HashAlgorithm::Private(100).is_supported());
    }
}
