//! A reader layer that tees consumed bytes into hash contexts.
//!
//! Signatures over documents are computed while the data streams by:
//! the parser pushes a `HashedReader` over the region whose bytes are
//! signed, reads through it, and pops it again.  Every byte is fed to
//! the attached digests in exactly the order it is consumed by the
//! layer above.
//!
//! The contexts live in the layer's [`Cookie`], so the popper can
//! take them back out through `cookie_mut()` without knowing the
//! reader's concrete type.

use std::fmt;
use std::io;

use buffered_reader::BufferedReader;

use crate::crypto::hash::Context;
use crate::parse::Cookie;

/// A transparent reader that hashes all data it passes through.
pub struct HashedReader<'a> {
    reader: Box<dyn BufferedReader<Cookie> + 'a>,
    cookie: Cookie,
}

impl<'a> HashedReader<'a> {
    /// Creates a new hashed reader feeding `hashers`.
    pub fn new(reader: Box<dyn BufferedReader<Cookie> + 'a>,
               hashers: Vec<Context>)
               -> Self
    {
        HashedReader {
            reader,
            cookie: Cookie { hashers },
        }
    }

    fn hash(&mut self, data: &[u8]) {
        for hasher in &mut self.cookie.hashers {
            hasher.update(data);
        }
    }
}

impl<'a> fmt::Debug for HashedReader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HashedReader")
            .field("cookie", &self.cookie)
            .finish()
    }
}

impl<'a> fmt::Display for HashedReader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HashedReader")
    }
}

impl<'a> io::Read for HashedReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buffered_reader::buffered_reader_generic_read_impl(self, buf)
    }
}

impl<'a> BufferedReader<Cookie> for HashedReader<'a> {
    fn buffer(&self) -> &[u8] {
        self.reader.buffer()
    }

    fn data(&mut self, amount: usize) -> io::Result<&[u8]> {
        self.reader.data(amount)
    }

    fn consume(&mut self, amount: usize) -> &[u8] {
        // The caller must have seen the data before consuming it.
        assert!(self.reader.buffer().len() >= amount);

        let chunk = &self.reader.buffer()[..amount];
        for hasher in &mut self.cookie.hashers {
            hasher.update(chunk);
        }

        self.reader.consume(amount)
    }

    fn data_consume(&mut self, amount: usize) -> io::Result<&[u8]> {
        let got = self.reader.data(amount)?.len();
        let n = amount.min(got);
        {
            let chunk = &self.reader.buffer()[..n];
            for hasher in &mut self.cookie.hashers {
                hasher.update(chunk);
            }
        }
        self.reader.data_consume(amount)
    }

    fn data_consume_hard(&mut self, amount: usize) -> io::Result<&[u8]> {
        self.reader.data_hard(amount)?;
        {
            let chunk = &self.reader.buffer()[..amount];
            for hasher in &mut self.cookie.hashers {
                hasher.update(chunk);
            }
        }
        self.reader.data_consume_hard(amount)
    }

    fn get_mut(&mut self) -> Option<&mut dyn BufferedReader<Cookie>> {
        Some(&mut self.reader)
    }

    fn get_ref(&self) -> Option<&dyn BufferedReader<Cookie>> {
        Some(&self.reader)
    }

    fn into_inner<'b>(self: Box<Self>)
                      -> Option<Box<dyn BufferedReader<Cookie> + 'b>>
    where
        Self: 'b,
    {
        Some(self.reader)
    }

    fn cookie_set(&mut self, cookie: Cookie) -> Cookie {
        std::mem::replace(&mut self.cookie, cookie)
    }

    fn cookie_ref(&self) -> &Cookie {
        &self.cookie
    }

    fn cookie_mut(&mut self) -> &mut Cookie {
        &mut self.cookie
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::HashAlgorithm;

    fn digest_of(data: &[u8]) -> Vec<u8> {
        let mut ctx = HashAlgorithm::SHA256.context().unwrap();
        ctx.update(data);
        ctx.into_digest()
    }

    #[test]
    fn hashes_consumed_bytes() {
        let data = b"0123456789abcdef";
        let inner = Box::new(buffered_reader::Memory::with_cookie(
            data, Cookie::default()));
        let mut reader = HashedReader::new(
            inner, vec![HashAlgorithm::SHA256.context().unwrap()]);

        reader.data_consume_hard(4).unwrap();
        reader.data_consume_hard(12).unwrap();

        let hashers =
            std::mem::take(&mut reader.cookie_mut().hashers);
        assert_eq!(hashers.into_iter().next().unwrap().into_digest(),
                   digest_of(data));
    }

    #[test]
    fn lookahead_is_not_hashed() {
        let data = b"0123456789";
        let inner = Box::new(buffered_reader::Memory::with_cookie(
            data, Cookie::default()));
        let mut reader = HashedReader::new(
            inner, vec![HashAlgorithm::SHA256.context().unwrap()]);

        // Peek at everything, consume half.
        assert_eq!(reader.data(10).unwrap().len(), 10);
        reader.consume(5);

        let hashers =
            std::mem::take(&mut reader.cookie_mut().hashers);
        assert_eq!(hashers.into_iter().next().unwrap().into_digest(),
                   digest_of(b"01234"));
    }

    #[test]
    fn multiple_contexts_see_the_same_bytes() {
        let data = b"payload";
        let inner = Box::new(buffered_reader::Memory::with_cookie(
            data, Cookie::default()));
        let mut reader = HashedReader::new(
            inner,
            vec![HashAlgorithm::SHA256.context().unwrap(),
                 HashAlgorithm::SHA1.context().unwrap()]);

        reader.data_consume_hard(data.len()).unwrap();

        let hashers = std::mem::take(&mut reader.cookie_mut().hashers);
        assert_eq!(hashers.len(), 2);
        for ctx in hashers {
            let algo = ctx.algo();
            let mut expected = algo.context().unwrap();
            expected.update(data);
            assert_eq!(ctx.into_digest(), expected.into_digest());
        }
    }
}
