//! Fully buffered message bodies.

use std::fmt;

use bytes::{Buf, Bytes};

/// A fully buffered, immutable HTTP message body.
///
/// The bytes live in a reference-counted [`Bytes`] buffer, so cloning a body
/// is cheap and every clone reads the same content without affecting the
/// others. Reading a body never consumes it: [`reader`](Self::reader) hands
/// out a fresh cursor each time.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use httpc::http::Body;
///
/// let body = Body::from("hello");
/// let mut first = String::new();
/// let mut second = String::new();
/// body.reader().read_to_string(&mut first).unwrap();
/// body.reader().read_to_string(&mut second).unwrap();
/// assert_eq!(first, second);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Body {
    bytes: Bytes,
}

impl Body {
    /// Creates an empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the body bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of bytes in the body.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns an independent reader positioned at the start of the body.
    pub fn reader(&self) -> impl std::io::Read + Send + 'static {
        self.bytes.clone().reader()
    }

    /// Consumes the body and returns the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("len", &self.bytes.len()).finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self {
            bytes: Bytes::from_static(s.as_bytes()),
        }
    }
}

impl From<&'static [u8]> for Body {
    fn from(s: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(s),
        }
    }
}

impl AsRef<[u8]> for Body {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn clones_read_independently() {
        let body = Body::from(vec![1u8, 2, 3, 4]);
        let clone = body.clone();

        let mut partial = [0u8; 2];
        let mut reader = body.reader();
        reader.read_exact(&mut partial).unwrap();
        assert_eq!(partial, [1, 2]);

        let mut all = Vec::new();
        clone.reader().read_to_end(&mut all).unwrap();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn debug_hides_content() {
        let body = Body::from("secret");
        assert_eq!(format!("{body:?}"), "Body { len: 6 }");
    }
}
