use std::fmt;

use crate::Fingerprint;
use crate::KeyID;

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string_internal(true))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Fingerprint")
            .field(&self.to_string_internal(false))
            .finish()
    }
}

impl From<&[u8]> for Fingerprint {
    fn from(raw: &[u8]) -> Fingerprint {
        if raw.len() == 20 {
            let mut fp: [u8; 20] = Default::default();
            fp.copy_from_slice(raw);
            Fingerprint::V4(fp)
        } else if raw.len() == 16 {
            let mut fp: [u8; 16] = Default::default();
            fp.copy_from_slice(raw);
            Fingerprint::V3(fp)
        } else {
            Fingerprint::Invalid(raw.to_vec().into_boxed_slice())
        }
    }
}

impl Fingerprint {
    /// Returns the raw fingerprint.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Fingerprint::V4(bytes) => bytes,
            Fingerprint::V3(bytes) => bytes,
            Fingerprint::Invalid(bytes) => bytes,
        }
    }

    /// Converts the fingerprint to its canonical hexadecimal
    /// representation.
    pub fn to_hex(&self) -> String {
        self.to_string_internal(false)
    }

    /// Derives the key id from this fingerprint.
    ///
    /// This is well defined for v4 fingerprints only; an invalid
    /// fingerprint yields an invalid key id.
    pub fn keyid(&self) -> KeyID {
        match self {
            Fingerprint::V4(fp) => {
                let mut keyid: [u8; 8] = Default::default();
                keyid.copy_from_slice(&fp[12..]);
                KeyID::Long(keyid)
            }
            Fingerprint::V3(fp) =>
                KeyID::Invalid(fp.to_vec().into_boxed_slice()),
            Fingerprint::Invalid(fp) =>
                KeyID::Invalid(fp.clone()),
        }
    }

    fn to_string_internal(&self, pretty: bool) -> String {
        let raw = self.as_bytes();

        let mut output = Vec::with_capacity(raw.len() * 2 + raw.len() / 2);
        for (i, b) in raw.iter().enumerate() {
            if pretty && i > 0 && i % 2 == 0 {
                output.push(b' ');
            }
            if pretty && raw.len() == 20 && i == 10 {
                output.push(b' ');
            }
            output.push(char::from_digit((b >> 4) as u32, 16)
                        .unwrap().to_ascii_uppercase() as u8);
            output.push(char::from_digit((b & 0xf) as u32, 16)
                        .unwrap().to_ascii_uppercase() as u8);
        }

        // We know the content is valid UTF-8.
        String::from_utf8(output).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v4_roundtrip() {
        let raw: Vec<u8> = (0..20).collect();
        let fp = Fingerprint::from(&raw[..]);
        assert!(matches!(fp, Fingerprint::V4(_)));
        assert_eq!(fp.as_bytes(), &raw[..]);
        assert_eq!(fp.to_hex().len(), 40);
    }

    #[test]
    fn keyid_is_suffix() {
        let raw: Vec<u8> = (0..20).collect();
        let fp = Fingerprint::from(&raw[..]);
        match fp.keyid() {
            KeyID::Long(id) => assert_eq!(&id[..], &raw[12..]),
            _ => panic!("expected a long key id"),
        }
    }
}
