/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The typed payloads carried by fake server entities, and the byte form they
//! take when crossing the bridge. The bridge treats these as opaque blocks;
//! only the store and the clients ever look inside.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The data kinds the fake server knows how to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bookmarks,
    Autofill,
    Sessions,
    TypedUrls,
    Nigori,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bookmarks => "bookmarks",
            DataType::Autofill => "autofill",
            DataType::Sessions => "sessions",
            DataType::TypedUrls => "typed_urls",
            DataType::Nigori => "nigori",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "bookmarks" => DataType::Bookmarks,
            "autofill" => DataType::Autofill,
            "sessions" => DataType::Sessions,
            "typed_urls" => DataType::TypedUrls,
            "nigori" => DataType::Nigori,
            _ => return Err(Error::UnknownDataType(s.into())),
        })
    }
}

/// An opaque token correlating the same logical entity across client and
/// server, even when server-assigned ids differ. Derived deterministically
/// from the data type and a client-chosen unique tag; callers must never
/// parse one back apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientTagHash(String);

impl ClientTagHash {
    pub fn from_tag(data_type: DataType, tag: &str) -> Self {
        let raw = format!("{}|{}", data_type.as_str(), tag);
        ClientTagHash(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientTagHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkSpecifics {
    pub title: String,
    /// `None` exactly when the entity is a folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutofillProfileSpecifics {
    pub guid: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSpecifics {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpecifics {
    /// Identifies the publishing client; one live session entity per client.
    pub session_tag: String,
    #[serde(default)]
    pub tabs: Vec<TabSpecifics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedUrlSpecifics {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Visit timestamps in ms. Merged by union when the same URL is visited
    /// on both sides.
    #[serde(default)]
    pub visits: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassphraseType {
    Keystore,
    CustomPassphrase,
    TrustedVault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NigoriSpecifics {
    pub passphrase_type: PassphraseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub key_name: Option<String>,
}

impl Default for NigoriSpecifics {
    fn default() -> Self {
        NigoriSpecifics {
            passphrase_type: PassphraseType::Keystore,
            key_name: None,
        }
    }
}

/// The payload of one entity. Serialized (as tagged JSON) when it crosses
/// the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitySpecifics {
    Bookmark(BookmarkSpecifics),
    Autofill(AutofillProfileSpecifics),
    Session(SessionSpecifics),
    TypedUrl(TypedUrlSpecifics),
    Nigori(NigoriSpecifics),
}

impl EntitySpecifics {
    pub fn data_type(&self) -> DataType {
        match self {
            EntitySpecifics::Bookmark(_) => DataType::Bookmarks,
            EntitySpecifics::Autofill(_) => DataType::Autofill,
            EntitySpecifics::Session(_) => DataType::Sessions,
            EntitySpecifics::TypedUrl(_) => DataType::TypedUrls,
            EntitySpecifics::Nigori(_) => DataType::Nigori,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_hash_is_stable_and_type_scoped() {
        let a = ClientTagHash::from_tag(DataType::Autofill, "guid-1");
        let b = ClientTagHash::from_tag(DataType::Autofill, "guid-1");
        let c = ClientTagHash::from_tag(DataType::TypedUrls, "guid-1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_specifics_round_trip() {
        let s = EntitySpecifics::Bookmark(BookmarkSpecifics {
            title: "Chromium".into(),
            url: Some("http://chromium.org/".into()),
        });
        let bytes = s.to_bytes().unwrap();
        assert_eq!(EntitySpecifics::from_bytes(&bytes).unwrap(), s);
        assert_eq!(s.data_type(), DataType::Bookmarks);
    }

    #[test]
    fn test_folder_payload_has_no_url_field() {
        let s = EntitySpecifics::Bookmark(BookmarkSpecifics {
            title: "menu".into(),
            url: None,
        });
        let json: serde_json::Value = serde_json::from_slice(&s.to_bytes().unwrap()).unwrap();
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_malformed_bytes_error() {
        let err = EntitySpecifics::from_bytes(b"{ not json").unwrap_err();
        assert!(matches!(err, Error::MalformedSpecifics(_)));
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("typed_urls".parse::<DataType>().unwrap(), DataType::TypedUrls);
        assert!("passwords".parse::<DataType>().is_err());
    }
}
