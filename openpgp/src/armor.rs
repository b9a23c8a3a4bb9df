//! ASCII Armor.
//!
//! This module deals with ASCII Armored data (see [Section 6 of RFC
//! 4880]): a `-----BEGIN PGP …-----` line, `Key: Value` headers, a
//! base64 body, an optional `=`-prefixed CRC-24 line, and the
//! matching `-----END PGP …-----` line.
//!
//! The [`Reader`] strips armor from a stream and is itself a
//! [`BufferedReader`], so it can be pushed onto and popped off the
//! parser's reader stack mid-stream.  The [`Writer`] applies armor to
//! data written to it.
//!
//!   [Section 6 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-6

use std::fmt;
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use buffered_reader::BufferedReader;

use crate::parse::Cookie;

/// The encoded output stream must be represented in lines of no more
/// than 76 characters each (see [RFC 4880, section 6.3]).  GnuPG uses
/// 64.
///
/// [RFC 4880, section 6.3]: https://tools.ietf.org/html/rfc4880#section-6.3
pub(crate) const LINE_LENGTH: usize = 64;

/// Specifies the type of data (see [RFC 4880, section 6.2]).
///
/// [RFC 4880, section 6.2]: https://tools.ietf.org/html/rfc4880#section-6.2
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A generic OpenPGP message: a sequence of packets.
    Message,
    /// A transferable public key, i.e. a keyring entry.
    PublicKey,
    /// A transferable secret key.
    SecretKey,
    /// A detached signature.
    Signature,
    /// A generic file.  This is a GnuPG extension.
    File,
}

impl Kind {
    fn blurb(&self) -> &str {
        match self {
            Kind::Message => "MESSAGE",
            Kind::PublicKey => "PUBLIC KEY BLOCK",
            Kind::SecretKey => "PRIVATE KEY BLOCK",
            Kind::Signature => "SIGNATURE",
            Kind::File => "ARMORED FILE",
        }
    }

    fn begin(&self) -> String {
        format!("-----BEGIN PGP {}-----", self.blurb())
    }

    fn end(&self) -> String {
        format!("-----END PGP {}-----", self.blurb())
    }

    /// Detects the kind from a header line.
    fn detect_header(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("-----BEGIN PGP ")?;
        let blurb = rest.strip_suffix("-----")?;
        [Kind::Message, Kind::PublicKey, Kind::SecretKey, Kind::Signature,
         Kind::File]
            .into_iter()
            .find(|kind| kind.blurb() == blurb)
    }

    /// Detects the matching footer line.
    fn detect_footer(&self, line: &str) -> bool {
        line == self.end()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.blurb())
    }
}

/// A filter that strips ASCII Armor from a stream of data.
pub struct Reader<'a> {
    reader: buffered_reader::Generic<IoReader<'a>, Cookie>,
}

impl<'a> fmt::Debug for Reader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("armor::Reader")
            .field("kind", &self.reader.reader_ref().kind)
            .finish()
    }
}

impl<'a> fmt::Display for Reader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "armor::Reader")
    }
}

#[derive(Debug)]
struct IoReader<'a> {
    source: Box<dyn BufferedReader<Cookie> + 'a>,
    expected: Option<Kind>,
    kind: Option<Kind>,
    buffer: Vec<u8>,
    crc: CRC,
    headers: Vec<(String, String)>,
    initialized: bool,
    finalized: bool,
}

impl<'a> Reader<'a> {
    /// Constructs a new filter for the given type of data.
    ///
    /// The reader ignores data in front of the armor header line; if
    /// `kind` is given, only an armor block of that kind is accepted.
    pub fn new<R>(inner: R, kind: Option<Kind>) -> Self
    where
        R: 'a + Read + Send + Sync,
    {
        Self::from_buffered_reader(
            Box::new(buffered_reader::Generic::with_cookie(
                inner, None, Cookie::default())),
            kind)
    }

    /// Creates a `Reader` from a buffer.
    pub fn from_bytes(bytes: &'a [u8], kind: Option<Kind>) -> Self {
        Self::from_buffered_reader(
            Box::new(buffered_reader::Memory::with_cookie(
                bytes, Cookie::default())),
            kind)
    }

    /// Creates a `Reader` from the reader stack.
    pub fn from_buffered_reader(
        inner: Box<dyn BufferedReader<Cookie> + 'a>, kind: Option<Kind>)
        -> Self
    {
        Reader {
            reader: buffered_reader::Generic::with_cookie(
                IoReader {
                    source: inner,
                    expected: kind,
                    kind: None,
                    buffer: Vec::with_capacity(1024),
                    crc: CRC::new(),
                    headers: Vec::new(),
                    initialized: false,
                    finalized: false,
                },
                None, Cookie::default()),
        }
    }

    /// Returns the kind of data this reader is for.
    ///
    /// If the header has not been encountered yet (try reading some
    /// data first!), this function returns None.
    pub fn kind(&self) -> Option<Kind> {
        self.reader.reader_ref().kind
    }

    /// Returns the armor headers, consuming the armor header lines if
    /// necessary.
    ///
    /// The tuples contain a key and a value.  If a key occurs
    /// multiple times, there are multiple entries in the vector.
    pub fn headers(&mut self) -> IoResult<&[(String, String)]> {
        self.reader.reader_mut().initialize()?;
        Ok(&self.reader.reader_ref().headers[..])
    }
}

impl<'a> IoReader<'a> {
    /// Reads the next line, stripping the line ending.
    fn read_line(&mut self) -> IoResult<Option<String>> {
        let line = self.source.read_to(b'\n')?.to_vec();
        if line.is_empty() {
            return Ok(None);
        }
        self.source.consume(line.len());

        let mut line = String::from_utf8(line).map_err(|_| {
            IoError::new(ErrorKind::InvalidData, "Armor is not ASCII")
        })?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Consumes the armor header and the armor headers if not
    /// already done.
    fn initialize(&mut self) -> IoResult<()> {
        if self.initialized {
            return Ok(());
        }

        // Look for the armor header line, skipping any preceding
        // text.
        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => return Err(IoError::new(
                    ErrorKind::InvalidInput, "No armor header found")),
            };

            if let Some(kind) = Kind::detect_header(line.trim()) {
                if let Some(expected) = self.expected {
                    if kind != expected {
                        return Err(IoError::new(
                            ErrorKind::InvalidInput,
                            format!("Expected {}, got {}", expected, kind)));
                    }
                }
                self.kind = Some(kind);
                break;
            }
        }

        // The armor headers, up to the empty line.  A body line
        // without preceding empty line is tolerated.
        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => return Err(IoError::new(
                    ErrorKind::UnexpectedEof,
                    "Armor ended inside the headers")),
            };

            if line.trim().is_empty() {
                break;
            }

            match line.split_once(": ") {
                Some((key, value)) => self.headers.push(
                    (key.trim().to_string(), value.trim().to_string())),
                None => return Err(IoError::new(
                    ErrorKind::InvalidData,
                    format!("Malformed armor header: {:?}", line))),
            }
        }

        self.initialized = true;
        Ok(())
    }

    /// Decodes body lines until at least one byte is buffered, or the
    /// tail of the armor block has been consumed.
    fn decode(&mut self) -> IoResult<()> {
        while self.buffer.is_empty() && !self.finalized {
            let line = match self.read_line()? {
                Some(line) => line,
                None => return Err(IoError::new(
                    ErrorKind::UnexpectedEof,
                    "Armor ended without a tail line")),
            };
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(crc) = line.strip_prefix('=') {
                // The CRC line, followed by the tail line.
                self.check_crc(crc)?;
                let tail = match self.read_line()? {
                    Some(line) => line,
                    None => return Err(IoError::new(
                        ErrorKind::UnexpectedEof,
                        "Armor ended without a tail line")),
                };
                self.check_footer(tail.trim())?;
                self.finalized = true;
            } else if line.starts_with("-----") {
                // A tail line without CRC.  The CRC is optional.
                self.check_footer(line)?;
                self.finalized = true;
            } else {
                let decoded = BASE64.decode(line).map_err(|e| {
                    IoError::new(ErrorKind::InvalidData, e)
                })?;
                self.crc.update(&decoded);
                self.buffer.extend_from_slice(&decoded);
            }
        }
        Ok(())
    }

    fn check_crc(&self, line: &str) -> IoResult<()> {
        let crc = BASE64.decode(line).map_err(|e| {
            IoError::new(ErrorKind::InvalidData, e)
        })?;
        if crc.len() != 3 {
            return Err(IoError::new(
                ErrorKind::InvalidData, "Bad CRC line"));
        }

        let crc = (crc[0] as u32) << 16 | (crc[1] as u32) << 8 | crc[2] as u32;
        if self.crc.finalize() != crc {
            return Err(IoError::new(ErrorKind::InvalidData, "Bad CRC sum"));
        }
        Ok(())
    }

    fn check_footer(&self, line: &str) -> IoResult<()> {
        let kind = self.kind.expect("initialized");
        if !kind.detect_footer(line) {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                format!("Invalid armor footer: {:?}", line)));
        }
        Ok(())
    }
}

impl<'a> Read for IoReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if !self.initialized {
            self.initialize()?;
        }
        if buf.is_empty() {
            return Ok(0);
        }

        if self.buffer.is_empty() {
            if self.finalized {
                return Ok(0);
            }
            self.decode()?;
        }

        let amount = buf.len().min(self.buffer.len());
        buf[..amount].copy_from_slice(&self.buffer[..amount]);
        self.buffer.drain(..amount);
        Ok(amount)
    }
}

impl<'a> Read for Reader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.reader.read(buf)
    }
}

impl<'a> BufferedReader<Cookie> for Reader<'a> {
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

/// A filter that applies ASCII Armor to the data written to it.
pub struct Writer<W: Write> {
    sink: W,
    kind: Kind,
    stash: Vec<u8>,
    column: usize,
    crc: CRC,
    header: Vec<u8>,
    dirty: bool,
}

impl<W: Write> Writer<W> {
    /// Constructs a new filter for the given type of data.
    pub fn new(inner: W, kind: Kind) -> IoResult<Self> {
        Self::with_headers(inner, kind, Option::<(&str, &str)>::None)
    }

    /// Constructs a new filter with the given armor headers.
    pub fn with_headers<I, K, V>(inner: W, kind: Kind, headers: I)
                                 -> IoResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut header = Vec::with_capacity(128);
        writeln!(&mut header, "{}", kind.begin())?;
        for h in headers {
            writeln!(&mut header, "{}: {}", h.0.as_ref(), h.1.as_ref())?;
        }
        // A blank line separates the headers from the body.
        writeln!(&mut header)?;

        Ok(Writer {
            sink: inner,
            kind,
            stash: Vec::with_capacity(2),
            column: 0,
            crc: CRC::new(),
            header,
            dirty: false,
        })
    }

    /// Returns a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Returns a mutable reference to the inner writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    fn finalize_headers(&mut self) -> IoResult<()> {
        if !self.dirty {
            self.dirty = true;
            self.sink.write_all(&self.header)?;
            self.header = Vec::new();
        }
        Ok(())
    }

    /// Writes the footer and returns the inner writer.
    ///
    /// This function must be called explicitly; dropping the writer
    /// leaves the armor block unterminated.
    pub fn finalize(mut self) -> IoResult<W> {
        self.finalize_headers()?;

        // Write any stashed bytes, padded.
        if !self.stash.is_empty() {
            self.write_encoded(&BASE64.encode(&self.stash))?;
        }

        if self.column > 0 {
            writeln!(self.sink)?;
        }

        let crc = self.crc.finalize();
        let crc = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];
        writeln!(self.sink, "={}", BASE64.encode(crc))?;
        writeln!(self.sink, "{}", self.kind.end())?;
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn write_encoded(&mut self, encoded: &str) -> IoResult<()> {
        let mut rest = encoded.as_bytes();
        while !rest.is_empty() {
            if self.column == LINE_LENGTH {
                writeln!(self.sink)?;
                self.column = 0;
            }
            let n = rest.len().min(LINE_LENGTH - self.column);
            self.sink.write_all(&rest[..n])?;
            self.column += n;
            rest = &rest[n..];
        }
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.finalize_headers()?;
        self.crc.update(buf);

        let written = buf.len();

        // Fill up the stash to a full group first.
        let mut buf = buf;
        if !self.stash.is_empty() {
            let need = 3 - self.stash.len();
            let take = need.min(buf.len());
            self.stash.extend_from_slice(&buf[..take]);
            buf = &buf[take..];

            if self.stash.len() < 3 {
                return Ok(written);
            }
            let encoded = BASE64.encode(&self.stash);
            self.write_encoded(&encoded)?;
            self.stash.clear();
        }

        // Encode whole groups directly, stash the remainder.
        let whole = buf.len() / 3 * 3;
        if whole > 0 {
            let encoded = BASE64.encode(&buf[..whole]);
            self.write_encoded(&encoded)?;
        }
        self.stash.extend_from_slice(&buf[whole..]);

        Ok(written)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.sink.flush()
    }
}

const CRC24_INIT: u32 = 0xB704CE;
const CRC24_POLY: u32 = 0x1864CFB;

#[derive(Debug)]
struct CRC {
    n: u32,
}

/// Computes the CRC-24, (see [RFC 4880, section 6.1]).
///
/// [RFC 4880, section 6.1]: https://tools.ietf.org/html/rfc4880#section-6.1
impl CRC {
    fn new() -> Self {
        CRC { n: CRC24_INIT }
    }

    fn update(&mut self, buf: &[u8]) -> &Self {
        for octet in buf {
            self.n ^= (*octet as u32) << 16;
            for _ in 0..8 {
                self.n <<= 1;
                if self.n & 0x1000000 > 0 {
                    self.n ^= CRC24_POLY;
                }
            }
        }
        self
    }

    fn finalize(&self) -> u32 {
        self.n & 0xFFFFFF
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc() {
        let b = b"foobarbaz";
        let crcs = [
            0xb704ce, 0x6d2804, 0xa2d10d, 0x4fc255, 0x7aafca, 0xc79c46,
            0x7334de, 0x77dc72, 0x000f65, 0xf40d86,
        ];

        for len in 0..b.len() + 1 {
            assert_eq!(CRC::new().update(&b[..len]).finalize(), crcs[len]);
        }
    }

    #[test]
    fn enarmor() {
        let mut writer = Writer::new(Vec::new(), Kind::File).unwrap();
        writer.write_all(b"Hello world!").unwrap();
        let buffer = writer.finalize().unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buffer),
            "-----BEGIN PGP ARMORED FILE-----\n\
             \n\
             SGVsbG8gd29ybGQh\n\
             =s4Gu\n\
             -----END PGP ARMORED FILE-----\n");
    }

    #[test]
    fn enarmor_with_headers() {
        let mut writer = Writer::with_headers(
            Vec::new(), Kind::File, vec![("Key", "Value")]).unwrap();
        writer.write_all(b"Hello world!").unwrap();
        let buffer = writer.finalize().unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buffer),
            "-----BEGIN PGP ARMORED FILE-----\n\
             Key: Value\n\
             \n\
             SGVsbG8gd29ybGQh\n\
             =s4Gu\n\
             -----END PGP ARMORED FILE-----\n");
    }

    #[test]
    fn dearmor_standard() {
        let armored = "-----BEGIN PGP ARMORED FILE-----\n\
                       First: value\n\
                       Header: value\n\
                       \n\
                       SGVsbG8gd29ybGQh\n\
                       =s4Gu\n\
                       -----END PGP ARMORED FILE-----\n";

        let mut reader = Reader::from_bytes(
            armored.as_bytes(), Some(Kind::File));
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello world!");
        assert_eq!(reader.kind(), Some(Kind::File));
    }

    #[test]
    fn dearmor_headers() {
        let armored = "-----BEGIN PGP ARMORED FILE-----\n\
                       First: value\n\
                       Header: value\n\
                       \n\
                       SGVsbG8gd29ybGQh\n\
                       =s4Gu\n\
                       -----END PGP ARMORED FILE-----\n";

        let mut reader = Reader::from_bytes(armored.as_bytes(), None);
        assert_eq!(reader.headers().unwrap(),
                   &[("First".to_string(), "value".to_string()),
                     ("Header".to_string(), "value".to_string())]);
    }

    #[test]
    fn dearmor_skips_leading_text() {
        let armored = "Some explanatory prose.\n\
                       \n\
                       -----BEGIN PGP ARMORED FILE-----\n\
                       \n\
                       SGVsbG8gd29ybGQh\n\
                       =s4Gu\n\
                       -----END PGP ARMORED FILE-----\n";

        let mut reader = Reader::from_bytes(armored.as_bytes(), None);
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello world!");
    }

    #[test]
    fn dearmor_wrong_kind() {
        let armored = "-----BEGIN PGP MESSAGE-----\n\
                       \n\
                       SGVsbG8gd29ybGQh\n\
                       =s4Gu\n\
                       -----END PGP MESSAGE-----\n";

        let mut reader = Reader::from_bytes(
            armored.as_bytes(), Some(Kind::Signature));
        let mut content = Vec::new();
        assert!(reader.read_to_end(&mut content).is_err());
    }

    #[test]
    fn dearmor_bad_crc() {
        let armored = "-----BEGIN PGP ARMORED FILE-----\n\
                       \n\
                       SGVsbG8gd29ybGQh\n\
                       =s4Gv\n\
                       -----END PGP ARMORED FILE-----\n";

        let mut reader = Reader::from_bytes(armored.as_bytes(), None);
        let mut content = Vec::new();
        assert!(reader.read_to_end(&mut content).is_err());
    }

    #[test]
    fn dearmor_missing_footer() {
        let armored = "-----BEGIN PGP ARMORED FILE-----\n\
                       \n\
                       SGVsbG8gd29ybGQh\n";

        let mut reader = Reader::from_bytes(armored.as_bytes(), None);
        let mut content = Vec::new();
        assert!(reader.read_to_end(&mut content).is_err());
    }

    #[test]
    fn roundtrip_various_sizes() {
        for len in [0usize, 1, 2, 3, 47, 48, 49, 128, 3000] {
            let payload: Vec<u8> =
                (0..len).map(|i| (i * 17 + 3) as u8).collect();

            let mut writer = Writer::new(Vec::new(), Kind::Message).unwrap();
            writer.write_all(&payload).unwrap();
            let armored = writer.finalize().unwrap();

            let mut reader = Reader::from_bytes(&armored, Some(Kind::Message));
            let mut decoded = Vec::new();
            reader.read_to_end(&mut decoded).unwrap();
            assert_eq!(decoded, payload, "length {}", len);
        }
    }

    quickcheck::quickcheck! {
        fn roundtrip(payload: Vec<u8>) -> bool {
            let mut writer = Writer::new(Vec::new(), Kind::File).unwrap();
            writer.write_all(&payload).unwrap();
            let armored = writer.finalize().unwrap();

            let mut reader = Reader::from_bytes(&armored, Some(Kind::File));
            let mut decoded = Vec::new();
            reader.read_to_end(&mut decoded).unwrap();
            decoded == payload
        }
    }
}
