//! Units of data moved through streams.

use bytes::Bytes;
use serde_json::Value;

/// A single immutable unit of data.
///
/// Byte chunks are accounted by their length; object chunks always count as
/// one unit toward the high-water mark.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Bytes(Bytes),
    Object(Value),
}

impl Chunk {
    pub fn object(value: impl Into<Value>) -> Self {
        Chunk::Object(value.into())
    }

    /// Length in bytes, or 1 for an object.
    pub fn byte_len(&self) -> usize {
        match self {
            Chunk::Bytes(b) => b.len(),
            Chunk::Object(_) => 1,
        }
    }

    /// Length as counted by a stream in the given mode.
    pub fn units(&self, object_mode: bool) -> usize {
        if object_mode {
            1
        } else {
            self.byte_len()
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Chunk::Bytes(b) if b.is_empty())
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Chunk::Bytes(b) => Some(b),
            Chunk::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Chunk::Object(v) => Some(v),
            Chunk::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Chunk::Bytes(b) => Some(b),
            Chunk::Object(_) => None,
        }
    }
}

impl From<Bytes> for Chunk {
    fn from(b: Bytes) -> Self {
        Chunk::Bytes(b)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(v: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(s: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(s))
    }
}

impl From<&str> for Chunk {
    fn from(s: &str) -> Self {
        Chunk::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Chunk {
    fn from(s: String) -> Self {
        Chunk::Bytes(Bytes::from(s))
    }
}

impl From<Value> for Chunk {
    fn from(v: Value) -> Self {
        Chunk::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_units_by_mode() {
        let bytes = Chunk::from("hello");
        assert_eq!(bytes.units(false), 5);
        assert_eq!(bytes.units(true), 1);

        let obj = Chunk::object(json!({"id": 7}));
        assert_eq!(obj.units(false), 1);
        assert_eq!(obj.units(true), 1);
        assert!(obj.as_bytes().is_none());
    }

    #[test]
    fn test_empty_chunk() {
        assert!(Chunk::from("").is_empty());
        assert!(!Chunk::object("").is_empty());
    }
}
