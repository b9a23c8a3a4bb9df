//! Partial body length decoding.
//!
//! New-format packets may split their body into chunks, each preceded
//! by a partial length octet, terminated by a chunk with a regular
//! length (see [Section 4.2.2.4 of RFC 4880]).  The [`Decoder`] is a
//! reader-stack layer that splices the chunks back together; the
//! layer above sees one contiguous body ending at the final chunk.
//!
//!   [Section 4.2.2.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.2.2.4

use std::fmt;
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

use buffered_reader::BufferedReader;

use crate::parse::Cookie;

/// A reader over the chunked body of a partial-length packet.
pub struct Decoder<'a> {
    reader: buffered_reader::Generic<Chunker<'a>, Cookie>,
}

#[derive(Debug)]
struct Chunker<'a> {
    source: Box<dyn BufferedReader<Cookie> + 'a>,
    /// Bytes left in the current chunk.
    chunk_remaining: u32,
    /// Whether the current chunk is the final, fixed-length one.
    last_chunk: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `source`.
    ///
    /// `first_chunk` is the length from the packet header; the
    /// header's length octets have already been consumed.
    pub fn new(source: Box<dyn BufferedReader<Cookie> + 'a>,
               first_chunk: u32)
               -> Self
    {
        Decoder {
            reader: buffered_reader::Generic::with_cookie(
                Chunker {
                    source,
                    chunk_remaining: first_chunk,
                    last_chunk: false,
                },
                None, Cookie::default()),
        }
    }
}

impl<'a> Chunker<'a> {
    /// Reads the length header of the next chunk.
    ///
    /// Partial length octets continue the chunking; the one-, two-,
    /// and five-octet encodings terminate it.
    fn next_chunk(&mut self) -> IoResult<()> {
        let o1 = self.source.data_consume_hard(1)?[0] as u32;
        match o1 {
            0..=191 => {
                self.chunk_remaining = o1;
                self.last_chunk = true;
            }
            192..=223 => {
                let o2 = self.source.data_consume_hard(1)?[0] as u32;
                self.chunk_remaining = ((o1 - 192) << 8) + o2 + 192;
                self.last_chunk = true;
            }
            224..=254 => {
                self.chunk_remaining = 1 << (o1 & 0x1f);
            }
            255 => {
                self.chunk_remaining = self.source.read_be_u32()?;
                self.last_chunk = true;
            }
            _ => unreachable!("o1 is an octet"),
        }
        Ok(())
    }
}

impl<'a> Read for Chunker<'a> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        while self.chunk_remaining == 0 {
            if self.last_chunk {
                return Ok(0);
            }
            self.next_chunk()?;
        }

        let want = buf.len().min(self.chunk_remaining as usize);
        let data = self.source.data(want)?;
        if data.is_empty() {
            return Err(IoError::new(
                ErrorKind::UnexpectedEof,
                "Stream ended inside a partial body chunk"));
        }

        let n = want.min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
        self.source.consume(n);
        self.chunk_remaining -= n as u32;
        Ok(n)
    }
}

impl<'a> fmt::Debug for Decoder<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let chunker = self.reader.reader_ref();
        f.debug_struct("partial_body::Decoder")
            .field("chunk_remaining", &chunker.chunk_remaining)
            .field("last_chunk", &chunker.last_chunk)
            .finish()
    }
}

impl<'a> fmt::Display for Decoder<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "partial_body::Decoder")
    }
}

impl<'a> Read for Decoder<'a> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.reader.read(buf)
    }
}

impl<'a> BufferedReader<Cookie> for Decoder<'a> {
    fn buffer(&self) -> &[u8] {
        self.reader.buffer()
    }

    fn data(&mut self, amount: usize) -> IoResult<&[u8]> {
        self.reader.data(amount)
    }

    fn consume(&mut self, amount: usize) -> &[u8] {
        self.reader.consume(amount)
    }

    fn data_consume(&mut self, amount: usize) -> IoResult<&[u8]> {
        self.reader.data_consume(amount)
    }

    fn data_consume_hard(&mut self, amount: usize) -> IoResult<&[u8]> {
        self.reader.data_consume_hard(amount)
    }

    fn get_mut(&mut self) -> Option<&mut dyn BufferedReader<Cookie>> {
        Some(&mut self.reader.reader_mut().source)
    }

    fn get_ref(&self) -> Option<&dyn BufferedReader<Cookie>> {
        Some(&self.reader.reader_ref().source)
    }

    fn into_inner<'b>(self: Box<Self>)
                      -> Option<Box<dyn BufferedReader<Cookie> + 'b>>
    where
        Self: 'b,
    {
        Some(self.reader.into_reader().source)
    }

    fn cookie_set(&mut self, cookie: Cookie) -> Cookie {
        self.reader.cookie_set(cookie)
    }

    fn cookie_ref(&self) -> &Cookie {
        self.reader.cookie_ref()
    }

    fn cookie_mut(&mut self) -> &mut Cookie {
        self.reader.cookie_mut()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source(data: Vec<u8>) -> Box<dyn BufferedReader<Cookie>> {
        Box::new(buffered_reader::Memory::with_cookie(
            data.leak(), Cookie::default()))
    }

    #[test]
    fn single_final_chunk() {
        // First chunk from the header is 512 bytes, then a final
        // five-byte chunk.
        let mut data = vec![0xaa; 512];
        data.push(5);
        data.extend_from_slice(b"hello");

        let mut decoder = Decoder::new(source(data), 512);
        let body = decoder.steal_eof().unwrap();
        assert_eq!(body.len(), 517);
        assert_eq!(&body[512..], b"hello");
    }

    #[test]
    fn chained_partial_chunks() {
        // 512 byte header chunk, a 1024 byte partial chunk, a zero
        // length final chunk.
        let mut data = vec![0x11; 512];
        data.push(224 + 10);
        data.extend_from_slice(&[0x22; 1024]);
        data.push(0);

        let mut decoder = Decoder::new(source(data), 512);
        let body = decoder.steal_eof().unwrap();
        assert_eq!(body.len(), 512 + 1024);
        assert_eq!(body[511], 0x11);
        assert_eq!(body[512], 0x22);
    }

    #[test]
    fn truncated_chunk_is_an_error() {
        // Claims 512 bytes, provides 100.
        let data = vec![0x33; 100];
        let mut decoder = Decoder::new(source(data), 512);
        assert!(decoder.steal_eof().is_err());
    }

    #[test]
    fn does_not_read_past_the_final_chunk() {
        let mut data = vec![0xaa; 512];
        data.push(0);
        data.extend_from_slice(b"next packet");

        let mut decoder = Decoder::new(source(data), 512);
        let body = decoder.steal_eof().unwrap();
        assert_eq!(body.len(), 512);

        let mut rest = Box::new(decoder).into_inner().unwrap();
        assert_eq!(&rest.steal_eof().unwrap(), b"next packet");
    }
}
