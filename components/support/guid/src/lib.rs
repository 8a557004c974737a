/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A small string-backed guid type for sync records. Server-assigned ids and
//! locally generated record ids are both guids; nothing in here attempts to
//! validate the contents, a guid is whatever the server (or the caller) says
//! it is.

use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(String);

impl Guid {
    #[inline]
    pub fn new(s: &str) -> Self {
        Guid(s.into())
    }

    #[inline]
    pub fn from_string(s: String) -> Self {
        Guid(s)
    }

    #[inline]
    pub fn empty() -> Self {
        Guid(String::new())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Create a random guid: 12 random bytes, base64url without padding,
    /// which gives a 16 character string.
    #[cfg(feature = "random")]
    pub fn random() -> Self {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        use rand::RngCore;
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Guid(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl From<&str> for Guid {
    #[inline]
    fn from(s: &str) -> Self {
        Guid::new(s)
    }
}

impl From<String> for Guid {
    #[inline]
    fn from(s: String) -> Self {
        Guid::from_string(s)
    }
}

impl From<Guid> for String {
    #[inline]
    fn from(g: Guid) -> Self {
        g.into_string()
    }
}

impl AsRef<str> for Guid {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Guid {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Guid {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({:?})", self.0)
    }
}

#[cfg(feature = "serde_support")]
mod serde_support {
    use super::Guid;
    use serde::{
        de::{self, Visitor},
        Deserialize, Deserializer, Serialize, Serializer,
    };
    use std::fmt;

    impl Serialize for Guid {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    struct GuidVisitor;

    impl Visitor<'_> for GuidVisitor {
        type Value = Guid;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a guid string")
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
            Ok(Guid::new(s))
        }
    }

    impl<'de> Deserialize<'de> for Guid {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Guid, D::Error> {
            deserializer.deserialize_str(GuidVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let g = Guid::new("abcd");
        assert_eq!(g.as_str(), "abcd");
        assert_eq!(g, "abcd");
        assert_eq!(g.to_string(), "abcd");
        assert!(!g.is_empty());
        assert!(Guid::empty().is_empty());
    }

    #[cfg(feature = "random")]
    #[test]
    fn test_random() {
        let a = Guid::random();
        let b = Guid::random();
        assert_eq!(a.as_str().len(), 16);
        assert_ne!(a, b);
    }

    #[cfg(feature = "serde_support")]
    #[test]
    fn test_serde() {
        let g = Guid::new("xyz");
        let s = serde_json::to_string(&g).unwrap();
        assert_eq!(s, "\"xyz\"");
        let back: Guid = serde_json::from_str(&s).unwrap();
        assert_eq!(back, g);
    }
}
