/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The in-memory entity store: the authoritative "server side" state for a
//! test run. All mutations funnel through [`FakeServer`]; thread affinity and
//! the at-most-one-instance policy live a layer up, in [`crate::server`].

use crate::error::{Error, Result};
use crate::specifics::{
    BookmarkSpecifics, ClientTagHash, DataType, EntitySpecifics, NigoriSpecifics, PassphraseType,
};
use std::collections::HashMap;
use sync_guid::Guid;

/// Server ids of the permanent bookmark folders. These exist from creation,
/// survive `clear_server_data`, and can never be deleted.
pub const BOOKMARK_BAR_ID: &str = "bookmark_bar";
pub const OTHER_BOOKMARKS_ID: &str = "other_bookmarks";
pub const SYNCED_BOOKMARKS_ID: &str = "synced_bookmarks";

const PERMANENT_FOLDERS: &[(&str, &str)] = &[
    (BOOKMARK_BAR_ID, "Bookmark Bar"),
    (OTHER_BOOKMARKS_ID, "Other Bookmarks"),
    (SYNCED_BOOKMARKS_ID, "Synced Bookmarks"),
];

/// The singleton nigori entity keeps a fixed id so passphrase updates can
/// replace it in place.
const NIGORI_ID: &str = "nigori";
const NIGORI_TAG: &str = "nigori";

/// One synchronizable record as the server sees it. A tombstoned entity keeps
/// its id, data type and (if known) client tag hash so the deletion itself
/// stays observable, but its payload is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeServerEntity {
    pub server_id: String,
    pub data_type: DataType,
    pub client_tag_hash: Option<ClientTagHash>,
    pub parent_id: Option<String>,
    pub name: String,
    /// Monotonic per-store mutation counter; orders entities as mutated.
    pub version: u64,
    pub deleted: bool,
    /// `None` exactly when `deleted` is set.
    pub specifics: Option<EntitySpecifics>,
}

impl FakeServerEntity {
    pub fn is_folder(&self) -> bool {
        matches!(
            &self.specifics,
            Some(EntitySpecifics::Bookmark(BookmarkSpecifics { url: None, .. }))
        )
    }

    pub fn is_permanent_folder(&self) -> bool {
        PERMANENT_FOLDERS.iter().any(|(id, _)| *id == self.server_id)
    }
}

#[derive(Debug)]
pub struct FakeServer {
    entities: HashMap<String, FakeServerEntity>,
    next_version: u64,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        let mut server = FakeServer {
            entities: HashMap::new(),
            next_version: 0,
        };
        server.seed();
        server
    }

    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Seed the state every fresh (or freshly cleared) server carries: the
    /// permanent bookmark folders and a keystore nigori.
    fn seed(&mut self) {
        for (id, name) in PERMANENT_FOLDERS {
            let version = self.bump();
            self.entities.insert(
                (*id).into(),
                FakeServerEntity {
                    server_id: (*id).into(),
                    data_type: DataType::Bookmarks,
                    client_tag_hash: None,
                    parent_id: None,
                    name: (*name).into(),
                    version,
                    deleted: false,
                    specifics: Some(EntitySpecifics::Bookmark(BookmarkSpecifics {
                        title: (*name).into(),
                        url: None,
                    })),
                },
            );
        }
        let version = self.bump();
        self.entities.insert(
            NIGORI_ID.into(),
            FakeServerEntity {
                server_id: NIGORI_ID.into(),
                data_type: DataType::Nigori,
                client_tag_hash: Some(ClientTagHash::from_tag(DataType::Nigori, NIGORI_TAG)),
                parent_id: None,
                name: "Nigori".into(),
                version,
                deleted: false,
                specifics: Some(EntitySpecifics::Nigori(NigoriSpecifics::default())),
            },
        );
    }

    pub fn get_entity(&self, id: &str) -> Option<&FakeServerEntity> {
        self.entities.get(id)
    }

    /// The live (non-tombstone) entity carrying the given tag hash, if any.
    pub fn live_entity_by_tag(&self, hash: &ClientTagHash) -> Option<&FakeServerEntity> {
        self.entities
            .values()
            .find(|e| !e.deleted && e.client_tag_hash.as_ref() == Some(hash))
    }

    /// Create a new live entity for a client-tagged data type. Exactly one
    /// live entity may exist per tag hash; injecting over a tombstone with
    /// the same hash revives the logical entity under a fresh server id.
    pub fn inject_unique_client_entity(
        &mut self,
        name: &str,
        client_tag: &str,
        specifics: EntitySpecifics,
    ) -> Result<String> {
        let data_type = specifics.data_type();
        if data_type == DataType::Bookmarks {
            return Err(Error::BookmarkEntryPoint);
        }
        let hash = ClientTagHash::from_tag(data_type, client_tag);
        if self.live_entity_by_tag(&hash).is_some() {
            return Err(Error::DuplicateClientTag(hash));
        }
        let server_id = Guid::random().into_string();
        let version = self.bump();
        self.entities.insert(
            server_id.clone(),
            FakeServerEntity {
                server_id: server_id.clone(),
                data_type,
                client_tag_hash: Some(hash),
                parent_id: None,
                name: name.into(),
                version,
                deleted: false,
                specifics: Some(specifics),
            },
        );
        Ok(server_id)
    }

    fn live_folder(&self, id: &str) -> Result<&FakeServerEntity> {
        let parent = self
            .entities
            .get(id)
            .filter(|e| !e.deleted)
            .ok_or_else(|| Error::NotFound(id.into()))?;
        if !parent.is_folder() {
            return Err(Error::NotAFolder(id.into()));
        }
        Ok(parent)
    }

    /// Create a leaf bookmark under `parent_id` (the bookmark bar when
    /// `None`). Leaves always carry a URL.
    pub fn inject_bookmark_entity(
        &mut self,
        name: &str,
        url: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }
        self.insert_bookmark(Guid::random().into_string(), name, Some(url), parent_id)
    }

    /// Create a bookmark folder. Folders never carry a URL.
    pub fn inject_bookmark_folder_entity(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        self.insert_bookmark(Guid::random().into_string(), name, None, parent_id)
    }

    /// A client commit of a locally created bookmark node. The server assigns
    /// the id by prefixing the originator's local item id with "s". Tests
    /// rely on that mapping, so treat it as a fixed transformation rule, not
    /// something to clean up. Re-committing the same originator id replaces
    /// the entity in place.
    pub fn commit_client_bookmark(
        &mut self,
        originator_item_id: &str,
        name: &str,
        url: Option<&str>,
        parent_id: &str,
    ) -> Result<String> {
        self.insert_bookmark(
            format!("s{}", originator_item_id),
            name,
            url,
            Some(parent_id),
        )
    }

    fn insert_bookmark(
        &mut self,
        server_id: String,
        name: &str,
        url: Option<&str>,
        parent_id: Option<&str>,
    ) -> Result<String> {
        let parent_id = parent_id.unwrap_or(BOOKMARK_BAR_ID);
        self.live_folder(parent_id)?;
        let version = self.bump();
        self.entities.insert(
            server_id.clone(),
            FakeServerEntity {
                server_id: server_id.clone(),
                data_type: DataType::Bookmarks,
                client_tag_hash: None,
                parent_id: Some(parent_id.into()),
                name: name.into(),
                version,
                deleted: false,
                specifics: Some(EntitySpecifics::Bookmark(BookmarkSpecifics {
                    title: name.into(),
                    url: url.map(String::from),
                })),
            },
        );
        Ok(server_id)
    }

    /// Replace the payload of a live entity. Unknown and tombstoned ids are
    /// hard failures, as is a payload of the wrong data type. For bookmarks
    /// the folder/leaf shape must be preserved.
    pub fn modify_entity_specifics(&mut self, id: &str, specifics: EntitySpecifics) -> Result<()> {
        let version = self.bump();
        let entity = self
            .entities
            .get_mut(id)
            .filter(|e| !e.deleted)
            .ok_or_else(|| Error::NotFound(id.into()))?;
        if specifics.data_type() != entity.data_type {
            return Err(Error::WrongDataType {
                id: id.into(),
                expected: entity.data_type,
                got: specifics.data_type(),
            });
        }
        if let EntitySpecifics::Bookmark(b) = &specifics {
            let was_folder = matches!(
                &entity.specifics,
                Some(EntitySpecifics::Bookmark(BookmarkSpecifics { url: None, .. }))
            );
            match (was_folder, b.url.is_some()) {
                (true, true) => return Err(Error::UnexpectedUrl),
                (false, false) => return Err(Error::MissingUrl),
                _ => {}
            }
        }
        entity.specifics = Some(specifics);
        entity.version = version;
        Ok(())
    }

    /// Rewrite a leaf bookmark's title/URL and optionally move it.
    pub fn modify_bookmark_entity(
        &mut self,
        id: &str,
        name: &str,
        url: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }
        self.rewrite_bookmark(id, name, Some(url), parent_id)
    }

    /// Rewrite a folder's title and optionally move it. Moving a folder under
    /// itself or one of its descendants is a cycle and fails.
    pub fn modify_bookmark_folder_entity(
        &mut self,
        id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        self.rewrite_bookmark(id, name, None, parent_id)
    }

    fn rewrite_bookmark(
        &mut self,
        id: &str,
        name: &str,
        url: Option<&str>,
        new_parent: Option<&str>,
    ) -> Result<()> {
        {
            let entity = self
                .entities
                .get(id)
                .filter(|e| !e.deleted && e.data_type == DataType::Bookmarks)
                .ok_or_else(|| Error::NotFound(id.into()))?;
            match (entity.is_folder(), url.is_some()) {
                (true, true) => return Err(Error::UnexpectedUrl),
                (false, false) => return Err(Error::MissingUrl),
                _ => {}
            }
        }
        if let Some(parent) = new_parent {
            self.live_folder(parent)?;
            if self.would_create_cycle(id, parent) {
                return Err(Error::FolderCycle { id: id.into() });
            }
        }
        let version = self.bump();
        let entity = self.entities.get_mut(id).expect("checked above");
        entity.name = name.into();
        entity.specifics = Some(EntitySpecifics::Bookmark(BookmarkSpecifics {
            title: name.into(),
            url: url.map(String::from),
        }));
        if let Some(parent) = new_parent {
            entity.parent_id = Some(parent.into());
        }
        entity.version = version;
        Ok(())
    }

    /// Walks the parent chain from `new_parent`; if it passes through `id`,
    /// the move would create a cycle.
    fn would_create_cycle(&self, id: &str, new_parent: &str) -> bool {
        let mut cur = Some(new_parent);
        while let Some(node) = cur {
            if node == id {
                return true;
            }
            cur = self
                .entities
                .get(node)
                .and_then(|e| e.parent_id.as_deref());
        }
        false
    }

    /// Tombstone an entity. Idempotent: re-deleting a tombstone is a no-op.
    /// Unknown ids (and the permanent folders) are hard failures. The tag
    /// hash, when supplied, is recorded on the tombstone so the deletion
    /// propagates to clients by tag.
    pub fn delete_entity(&mut self, id: &str, client_tag_hash: Option<ClientTagHash>) -> Result<()> {
        let version = self.bump();
        let entity = self
            .entities
            .get_mut(id)
            .filter(|e| !e.is_permanent_folder())
            .ok_or_else(|| Error::NotFound(id.into()))?;
        if entity.deleted {
            return Ok(());
        }
        entity.deleted = true;
        entity.specifics = None;
        if client_tag_hash.is_some() {
            entity.client_tag_hash = client_tag_hash;
        }
        entity.version = version;
        Ok(())
    }

    /// Live entities of one data type, in mutation order.
    pub fn entities_by_data_type(&self, data_type: DataType) -> Vec<&FakeServerEntity> {
        let mut out: Vec<_> = self
            .entities
            .values()
            .filter(|e| !e.deleted && e.data_type == data_type)
            .collect();
        out.sort_by_key(|e| e.version);
        out
    }

    /// Tombstones of one data type, in mutation order.
    pub fn tombstones_by_data_type(&self, data_type: DataType) -> Vec<&FakeServerEntity> {
        let mut out: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.deleted && e.data_type == data_type)
            .collect();
        out.sort_by_key(|e| e.version);
        out
    }

    pub fn count_by_type_and_name(&self, data_type: DataType, name: &str) -> usize {
        self.entities
            .values()
            .filter(|e| !e.deleted && e.data_type == data_type && e.name == name)
            .count()
    }

    /// Drop everything - entities and tombstones both - then re-seed the
    /// permanent state. Simulates the user clearing their dashboard.
    pub fn clear_server_data(&mut self) {
        self.entities.clear();
        self.seed();
    }

    pub fn set_custom_passphrase_nigori(&mut self, key_name: &str) -> Result<()> {
        self.set_nigori(NigoriSpecifics {
            passphrase_type: PassphraseType::CustomPassphrase,
            key_name: Some(key_name.into()),
        })
    }

    pub fn set_trusted_vault_nigori(&mut self) -> Result<()> {
        self.set_nigori(NigoriSpecifics {
            passphrase_type: PassphraseType::TrustedVault,
            key_name: None,
        })
    }

    pub fn set_keystore_nigori(&mut self) -> Result<()> {
        self.set_nigori(NigoriSpecifics::default())
    }

    fn set_nigori(&mut self, nigori: NigoriSpecifics) -> Result<()> {
        self.modify_entity_specifics(NIGORI_ID, EntitySpecifics::Nigori(nigori))
    }

    pub fn nigori(&self) -> Option<&NigoriSpecifics> {
        match self.get_entity(NIGORI_ID)?.specifics.as_ref()? {
            EntitySpecifics::Nigori(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specifics::AutofillProfileSpecifics;

    fn profile(guid: &str, city: &str) -> EntitySpecifics {
        EntitySpecifics::Autofill(AutofillProfileSpecifics {
            guid: guid.into(),
            city: city.into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_seeded_state() {
        let server = FakeServer::new();
        let folders = server.entities_by_data_type(DataType::Bookmarks);
        assert_eq!(folders.len(), 3);
        assert!(folders.iter().all(|e| e.is_folder()));
        assert_eq!(
            server.nigori().unwrap().passphrase_type,
            PassphraseType::Keystore
        );
    }

    #[test]
    fn test_duplicate_client_tag_rejected() {
        let mut server = FakeServer::new();
        server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Mountain View"))
            .unwrap();
        let err = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Sunnyvale"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateClientTag(_)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut server = FakeServer::new();
        let id = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Mountain View"))
            .unwrap();
        let hash = ClientTagHash::from_tag(DataType::Autofill, "guid-1");
        server.delete_entity(&id, Some(hash.clone())).unwrap();
        let after_once: Vec<_> = server
            .tombstones_by_data_type(DataType::Autofill)
            .into_iter()
            .cloned()
            .collect();
        server.delete_entity(&id, Some(hash.clone())).unwrap();
        let after_twice: Vec<_> = server
            .tombstones_by_data_type(DataType::Autofill)
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(after_once, after_twice);
        assert!(server.live_entity_by_tag(&hash).is_none());
        // The id stays resolvable.
        assert!(server.get_entity(&id).unwrap().deleted);
    }

    #[test]
    fn test_revive_after_tombstone_gets_fresh_id() {
        let mut server = FakeServer::new();
        let id = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Mountain View"))
            .unwrap();
        server.delete_entity(&id, None).unwrap();
        let id2 = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Sunnyvale"))
            .unwrap();
        assert_ne!(id, id2);
        assert_eq!(server.entities_by_data_type(DataType::Autofill).len(), 1);
    }

    #[test]
    fn test_delete_unknown_id_is_not_found() {
        let mut server = FakeServer::new();
        assert!(matches!(
            server.delete_entity("nope", None),
            Err(Error::NotFound(_))
        ));
        // Permanent folders can't be deleted either.
        assert!(matches!(
            server.delete_entity(BOOKMARK_BAR_ID, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_modify_tombstone_is_not_found() {
        let mut server = FakeServer::new();
        let id = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Mountain View"))
            .unwrap();
        server.delete_entity(&id, None).unwrap();
        assert!(matches!(
            server.modify_entity_specifics(&id, profile("guid-1", "Sunnyvale")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_modify_wrong_data_type() {
        let mut server = FakeServer::new();
        let id = server
            .inject_unique_client_entity("p", "guid-1", profile("guid-1", "Mountain View"))
            .unwrap();
        let err = server
            .modify_entity_specifics(
                &id,
                EntitySpecifics::TypedUrl(crate::specifics::TypedUrlSpecifics {
                    url: "http://example.com/".into(),
                    ..Default::default()
                }),
            )
            .unwrap_err();
        assert!(matches!(err, Error::WrongDataType { .. }));
    }

    #[test]
    fn test_bookmarks_must_use_bookmark_entry_points() {
        let mut server = FakeServer::new();
        let err = server
            .inject_unique_client_entity(
                "b",
                "tag",
                EntitySpecifics::Bookmark(BookmarkSpecifics::default()),
            )
            .unwrap_err();
        assert!(matches!(err, Error::BookmarkEntryPoint));
    }

    #[test]
    fn test_folder_and_leaf_shapes() {
        let mut server = FakeServer::new();
        let folder = server.inject_bookmark_folder_entity("work", None).unwrap();
        let leaf = server
            .inject_bookmark_entity("Chromium", "http://chromium.org/", Some(&folder))
            .unwrap();
        assert!(server.get_entity(&folder).unwrap().is_folder());
        assert!(!server.get_entity(&leaf).unwrap().is_folder());
        // A leaf can't become a folder through a specifics replacement.
        assert!(matches!(
            server.modify_entity_specifics(
                &leaf,
                EntitySpecifics::Bookmark(BookmarkSpecifics {
                    title: "Chromium".into(),
                    url: None,
                })
            ),
            Err(Error::MissingUrl)
        ));
        // And a leaf is not a valid parent.
        assert!(matches!(
            server.inject_bookmark_entity("x", "http://x.org/", Some(&leaf)),
            Err(Error::NotAFolder(_))
        ));
    }

    #[test]
    fn test_folder_cycle_rejected() {
        let mut server = FakeServer::new();
        let a = server.inject_bookmark_folder_entity("a", None).unwrap();
        let b = server.inject_bookmark_folder_entity("b", Some(&a)).unwrap();
        let c = server.inject_bookmark_folder_entity("c", Some(&b)).unwrap();
        assert!(matches!(
            server.modify_bookmark_folder_entity(&a, "a", Some(&c)),
            Err(Error::FolderCycle { .. })
        ));
        // A legal move still works.
        server.modify_bookmark_folder_entity(&c, "c", Some(&a)).unwrap();
        assert_eq!(
            server.get_entity(&c).unwrap().parent_id.as_deref(),
            Some(a.as_str())
        );
    }

    #[test]
    fn test_commit_client_bookmark_prefixes_originator_id() {
        let mut server = FakeServer::new();
        let id = server
            .commit_client_bookmark("c0-5", "Chromium", Some("http://chromium.org/"), BOOKMARK_BAR_ID)
            .unwrap();
        assert_eq!(id, "sc0-5");
        // Re-commit replaces in place.
        server
            .commit_client_bookmark("c0-5", "Chromium!", Some("http://chromium.org/"), BOOKMARK_BAR_ID)
            .unwrap();
        assert_eq!(server.count_by_type_and_name(DataType::Bookmarks, "Chromium!"), 1);
        assert_eq!(server.count_by_type_and_name(DataType::Bookmarks, "Chromium"), 0);
    }

    #[test]
    fn test_count_by_type_and_name() {
        let mut server = FakeServer::new();
        server
            .inject_bookmark_entity("Chromium", "http://chromium.org/", None)
            .unwrap();
        server
            .inject_bookmark_entity("Chromium", "http://chromium.org/mirror", None)
            .unwrap();
        assert_eq!(server.count_by_type_and_name(DataType::Bookmarks, "Chromium"), 2);
        assert_eq!(server.count_by_type_and_name(DataType::Autofill, "Chromium"), 0);
    }

    #[test]
    fn test_clear_reseeds_permanent_state() {
        let mut server = FakeServer::new();
        server
            .inject_bookmark_entity("Chromium", "http://chromium.org/", None)
            .unwrap();
        server.set_trusted_vault_nigori().unwrap();
        server.clear_server_data();
        assert_eq!(server.entities_by_data_type(DataType::Bookmarks).len(), 3);
        assert!(server.tombstones_by_data_type(DataType::Bookmarks).is_empty());
        assert_eq!(
            server.nigori().unwrap().passphrase_type,
            PassphraseType::Keystore
        );
    }

    #[test]
    fn test_nigori_transitions() {
        let mut server = FakeServer::new();
        server.set_custom_passphrase_nigori("key-1").unwrap();
        let n = server.nigori().unwrap();
        assert_eq!(n.passphrase_type, PassphraseType::CustomPassphrase);
        assert_eq!(n.key_name.as_deref(), Some("key-1"));
        server.set_trusted_vault_nigori().unwrap();
        assert_eq!(
            server.nigori().unwrap().passphrase_type,
            PassphraseType::TrustedVault
        );
        server.set_keystore_nigori().unwrap();
        assert_eq!(
            server.nigori().unwrap().passphrase_type,
            PassphraseType::Keystore
        );
    }
}
