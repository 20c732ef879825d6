use crate::{engine::EngineError, types::PublicAttributes};

#[inline]
#[must_use]
pub const fn le64(x: u64) -> [u8; 8] {
    x.to_le_bytes()
}

#[inline]
#[must_use]
pub const fn le32(x: u32) -> [u8; 4] {
    x.to_le_bytes()
}

/// Canonical public-attribute encoding bound into signatures and proofs:
/// `LE64(iat)` || `LE64(exp)` || `LE32(|scope|)` || scope
#[must_use]
pub fn encode_public_attributes(attrs: &PublicAttributes) -> Vec<u8> {
    let scope = attrs.scope.as_bytes();
    let mut v = Vec::with_capacity(8 + 8 + 4 + scope.len());
    v.extend_from_slice(&le64(attrs.issued_at));
    v.extend_from_slice(&le64(attrs.expiry));
    v.extend_from_slice(&le32(u32::try_from(scope.len()).unwrap_or(u32::MAX)));
    v.extend_from_slice(scope);
    v
}

/// Cursor over an exact-length binary artifact. Every read is bounds-checked and
/// [`Reader::finish`] rejects trailing bytes.
pub struct Reader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], EngineError> {
        if self.buf.len() < n {
            return Err(EngineError::Malformed(self.what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], EngineError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn take_u32(&mut self) -> Result<u32, EngineError> {
        Ok(u32::from_le_bytes(self.take_array::<4>()?))
    }

    pub fn finish(self) -> Result<(), EngineError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Malformed(self.what))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_attribute_encoding_is_fixed_layout() {
        let attrs = PublicAttributes {
            issued_at: 1,
            expiry: 2,
            scope: "access:uid".into(),
        };
        let enc = encode_public_attributes(&attrs);
        assert_eq!(enc.len(), 8 + 8 + 4 + 10);
        assert_eq!(&enc[..8], &1u64.to_le_bytes());
        assert_eq!(&enc[16..20], &10u32.to_le_bytes());
        assert_eq!(&enc[20..], b"access:uid");
    }

    #[test]
    fn reader_rejects_short_and_trailing_input() {
        let mut r = Reader::new(&[1, 0, 0, 0, 9], "blob");
        assert_eq!(r.take_u32().unwrap(), 1);
        assert!(r.take(2).is_err());
        let mut r = Reader::new(&[1, 2, 3], "blob");
        r.take(2).unwrap();
        assert!(r.finish().is_err());
    }
}
