use serde::de::DeserializeOwned;
use tracing::warn;

/// Result of decoding a stored JSON value.
///
/// Malformed data is kept distinct from absence so callers can log it
/// before falling back to their default.
#[derive(Debug)]
pub enum Decoded<T> {
    Valid(T),
    Absent,
    Malformed(serde_json::Error),
}

impl<T> Decoded<T> {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Decoded::Malformed(_))
    }

    /// Collapse to an `Option`, logging malformed values against `key`.
    pub fn into_option(self, key: &str) -> Option<T> {
        match self {
            Decoded::Valid(value) => Some(value),
            Decoded::Absent => None,
            Decoded::Malformed(e) => {
                warn!(key, error = %e, "Ignoring malformed stored value");
                None
            }
        }
    }
}

pub fn decode<T: DeserializeOwned>(raw: Option<&str>) -> Decoded<T> {
    match raw {
        None => Decoded::Absent,
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => Decoded::Valid(value),
            Err(e) => Decoded::Malformed(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_absent() {
        let decoded: Decoded<Vec<u32>> = decode(None);
        assert!(matches!(decoded, Decoded::Absent));
    }

    #[test]
    fn test_decode_valid() {
        let decoded: Decoded<Vec<u32>> = decode(Some("[1,2,3]"));
        assert_eq!(decoded.into_option("nums"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_decode_malformed_is_tagged() {
        let decoded: Decoded<Vec<u32>> = decode(Some("{not json"));
        assert!(decoded.is_malformed());
        assert_eq!(decoded.into_option("nums"), None);
    }

    #[test]
    fn test_decode_wrong_shape_is_malformed() {
        let decoded: Decoded<Vec<u32>> = decode(Some(r#"{"a":1}"#));
        assert!(decoded.is_malformed());
    }
}
