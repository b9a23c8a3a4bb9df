//! Cleartext signature framework.
//!
//! A cleartext signature keeps the signed payload human readable: the
//! text is framed by `-----BEGIN PGP SIGNED MESSAGE-----`, lines
//! beginning with a dash are escaped, and an armored detached
//! signature follows the text (see [Section 7 of RFC 4880]).
//!
//! The hash is computed over the text with trailing whitespace
//! stripped from every line and line endings normalized to CR-LF; the
//! line ending before the signature armor is not part of the signed
//! text.
//!
//! The [`Writer`] here is the signing side: it dash-escapes text
//! streamed into it while feeding the signature hash.  The reading
//! side lives in the parser, which emits header, body, and trailer
//! events and surrenders the hash contexts at the trailer (see
//! [`crate::parse::Content`]).
//!
//!   [Section 7 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-7

use std::io::{Result as IoResult, Write};

use crate::Error;
use crate::Result;
use crate::crypto::hash::Context;
use crate::types::HashAlgorithm;

/// The line framing the start of a signed cleartext region.
pub(crate) const BEGIN: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// Escapes one line of cleartext.
///
/// Lines starting with a dash get a `"- "` prefix (see [Section 7.1
/// of RFC 4880]).
///
///   [Section 7.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-7.1
pub fn dash_escape(line: &str) -> String {
    if line.starts_with('-') {
        format!("- {}", line)
    } else {
        line.to_string()
    }
}

/// Reverses the dash-escaping of one line.
pub fn dash_unescape(line: &str) -> &str {
    line.strip_prefix("- ").unwrap_or(line)
}

/// Feeds one logical line into the hash contexts.
///
/// Trailing spaces and tabs are stripped; lines after the first are
/// preceded by a CR-LF, which yields CR-LF joined lines with no
/// trailing line ending.
pub(crate) fn hash_line(hashes: &mut [Context], line: &str, first: bool) {
    let line = line.trim_end_matches([' ', '\t']);
    for hash in hashes.iter_mut() {
        if !first {
            hash.update(b"\r\n");
        }
        hash.update(line.as_bytes());
    }
}

/// A filter that dash-escapes text written to it while maintaining
/// the signature hash over the canonical form.
///
/// After streaming the text, call [`Writer::finalize`] to get the
/// inner writer back together with the hash context; the armored
/// signature packet is then written after the text.
pub struct Writer<W: Write> {
    sink: W,
    hash: Context,
    /// Partial line not yet terminated by a newline.
    pending: Vec<u8>,
    /// Whether any line has been hashed yet.
    first: bool,
    /// Whether the framing header has been written.
    dirty: bool,
}

impl<W: Write> Writer<W> {
    /// Creates a new cleartext writer.
    ///
    /// The framing header and the `Hash:` armor header are emitted on
    /// the first write.
    pub fn new(sink: W, hash_algo: HashAlgorithm) -> Result<Self> {
        Ok(Writer {
            sink,
            hash: hash_algo.context()?,
            pending: Vec::new(),
            first: true,
            dirty: false,
        })
    }

    fn write_framing(&mut self) -> IoResult<()> {
        if !self.dirty {
            self.dirty = true;
            writeln!(self.sink, "{}", BEGIN)?;
            writeln!(self.sink, "Hash: {}", self.hash.algo())?;
            writeln!(self.sink)?;
        }
        Ok(())
    }

    fn emit_line(&mut self) -> IoResult<()> {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        hash_line(std::slice::from_mut(&mut self.hash), &line, self.first);
        self.first = false;
        writeln!(self.sink, "{}", dash_escape(&line))?;
        self.pending.clear();
        Ok(())
    }

    /// Finishes the cleartext region.
    ///
    /// Returns the inner writer, positioned after the final line
    /// ending, and the hash context holding the canonical text; feed
    /// it to [`crate::packet::SignatureBuilder::sign_hash`] and write
    /// the armored signature to the writer.
    pub fn finalize(mut self) -> Result<(W, Context)> {
        self.write_framing()?;
        if !self.pending.is_empty() {
            self.emit_line()?;
        }
        if self.first {
            return Err(Error::InvalidOperation(
                "No cleartext was written".into()).into());
        }
        Ok((self.sink, self.hash))
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.write_framing()?;

        for &b in buf {
            match b {
                b'\n' => self.emit_line()?,
                b'\r' => (),
                b => self.pending.push(b),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dash_escape_roundtrip() {
        for line in ["plain", "- leading dash", "-", "--", "-----BEGIN",
                     "", " - interior"] {
            let escaped = dash_escape(line);
            assert_eq!(dash_unescape(&escaped), line);
            if line.starts_with('-') {
                assert!(escaped.starts_with("- "));
            }
        }
    }

    #[test]
    fn writer_escapes_and_frames() {
        let mut w = Writer::new(Vec::new(), HashAlgorithm::SHA256).unwrap();
        w.write_all(b"Hello.\n-- \nsig\n").unwrap();
        let (sink, _hash) = w.finalize().unwrap();

        assert_eq!(String::from_utf8_lossy(&sink),
                   "-----BEGIN PGP SIGNED MESSAGE-----\n\
                    Hash: SHA256\n\
                    \n\
                    Hello.\n\
                    - -- \n\
                    sig\n");
    }

    #[test]
    fn writer_hash_is_canonical() {
        // The hash must be over "One\r\nTwo" regardless of input line
        // endings and trailing whitespace.
        let mut expected = HashAlgorithm::SHA256.context().unwrap();
        expected.update(b"One\r\nTwo");

        for input in [&b"One\nTwo\n"[..], b"One\r\nTwo\r\n", b"One  \nTwo\n",
                      b"One\nTwo\t\n"] {
            let mut w =
                Writer::new(Vec::new(), HashAlgorithm::SHA256).unwrap();
            w.write_all(input).unwrap();
            let (_, hash) = w.finalize().unwrap();
            assert_eq!(hash.into_digest(),
                       expected.clone().into_digest());
        }
    }

    #[test]
    fn unterminated_final_line_is_emitted() {
        let mut w = Writer::new(Vec::new(), HashAlgorithm::SHA256).unwrap();
        w.write_all(b"no newline").unwrap();
        let (sink, _) = w.finalize().unwrap();
        assert!(String::from_utf8_lossy(&sink).ends_with("no newline\n"));
    }
}
