/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! Local bookmark model and its reconciliation against the fake server.
//!
//! Ids are the fiddly part. Locally a node has a client-scoped id; when the
//! client commits it, the server assigns `"s" + local_id`. Server-injected
//! nodes arrive under arbitrary guids and get fresh local ids on apply. The
//! model tracks the mapping in both directions, and tests asserting on
//! server-side parent ids must go through it (or apply the "s" rule
//! themselves - it's a stable, documented transformation).

use crate::client::TestClient;
use crate::testing::{poll_short, TestGroup};
use fakeserver::specifics::{BookmarkSpecifics, EntitySpecifics};
use fakeserver::{DataType, FakeServerHandle, Result};
use std::collections::{BTreeMap, HashMap};

pub use fakeserver::store::{BOOKMARK_BAR_ID, OTHER_BOOKMARKS_ID, SYNCED_BOOKMARKS_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkNode {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    /// `None` for folders.
    pub url: Option<String>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

pub struct BookmarkModel {
    /// Namespaces local ids so two clients never collide on the server.
    prefix: String,
    next_id: u64,
    nodes: BTreeMap<String, BookmarkNode>,
    to_server: HashMap<String, String>,
    to_local: HashMap<String, String>,
    /// Local ids with uncommitted creations or edits, in mutation order.
    dirty: Vec<String>,
    /// Server ids tombstoned locally but not yet committed.
    pending_deletes: Vec<String>,
}

impl BookmarkModel {
    pub fn new(prefix: &str) -> Self {
        let mut model = BookmarkModel {
            prefix: prefix.into(),
            next_id: 0,
            nodes: BTreeMap::new(),
            to_server: HashMap::new(),
            to_local: HashMap::new(),
            dirty: Vec::new(),
            pending_deletes: Vec::new(),
        };
        // The permanent folders exist on both sides from the start and map
        // onto themselves.
        for id in [BOOKMARK_BAR_ID, OTHER_BOOKMARKS_ID, SYNCED_BOOKMARKS_ID] {
            model.nodes.insert(
                id.into(),
                BookmarkNode {
                    id: id.into(),
                    parent_id: String::new(),
                    title: id.into(),
                    url: None,
                },
            );
            model.to_server.insert(id.into(), id.into());
            model.to_local.insert(id.into(), id.into());
        }
        model
    }

    fn alloc_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}-{}", self.prefix, self.next_id)
    }

    pub fn add_bookmark(&mut self, title: &str, url: &str, parent_id: &str) -> String {
        self.add_node(title, Some(url), parent_id)
    }

    pub fn add_folder(&mut self, title: &str, parent_id: &str) -> String {
        self.add_node(title, None, parent_id)
    }

    fn add_node(&mut self, title: &str, url: Option<&str>, parent_id: &str) -> String {
        assert!(self.nodes.contains_key(parent_id), "unknown parent {}", parent_id);
        let id = self.alloc_id();
        self.nodes.insert(
            id.clone(),
            BookmarkNode {
                id: id.clone(),
                parent_id: parent_id.into(),
                title: title.into(),
                url: url.map(String::from),
            },
        );
        self.dirty.push(id.clone());
        id
    }

    pub fn set_title(&mut self, id: &str, title: &str) {
        let node = self.nodes.get_mut(id).expect("unknown bookmark node");
        node.title = title.into();
        self.dirty.push(id.into());
    }

    pub fn move_node(&mut self, id: &str, new_parent: &str) {
        assert!(self.nodes.contains_key(new_parent), "unknown parent {}", new_parent);
        let node = self.nodes.get_mut(id).expect("unknown bookmark node");
        node.parent_id = new_parent.into();
        self.dirty.push(id.into());
    }

    /// Delete a node and its whole subtree. Committed nodes turn into
    /// pending server tombstones; uncommitted ones just vanish.
    pub fn delete(&mut self, id: &str) {
        let mut doomed = vec![id.to_string()];
        while let Some(current) = doomed.pop() {
            let children: Vec<String> = self
                .nodes
                .values()
                .filter(|n| n.parent_id == current)
                .map(|n| n.id.clone())
                .collect();
            doomed.extend(children);
            self.nodes.remove(&current);
            self.dirty.retain(|d| d != &current);
            if let Some(server_id) = self.to_server.remove(&current) {
                self.to_local.remove(&server_id);
                self.pending_deletes.push(server_id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&BookmarkNode> {
        self.nodes.get(id)
    }

    pub fn find_by_title(&self, title: &str) -> Option<&BookmarkNode> {
        self.nodes.values().find(|n| n.title == title)
    }

    pub fn count_with_title(&self, title: &str) -> usize {
        self.nodes.values().filter(|n| n.title == title).count()
    }

    pub fn server_id_for(&self, local_id: &str) -> Option<&str> {
        self.to_server.get(local_id).map(String::as_str)
    }

    /// Push pending deletions and dirty nodes to the server, parents before
    /// children so every commit has a live server-side parent.
    pub(crate) fn commit(&mut self, server: &FakeServerHandle) -> Result<()> {
        for server_id in std::mem::take(&mut self.pending_deletes) {
            server.delete_entity(&server_id, None)?;
        }
        let mut pending: Vec<String> = Vec::new();
        for id in std::mem::take(&mut self.dirty) {
            if !pending.contains(&id) {
                pending.push(id);
            }
        }
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut progressed = false;
            for local_id in pending {
                let (title, url, parent_local) = match self.nodes.get(&local_id) {
                    Some(n) => (n.title.clone(), n.url.clone(), n.parent_id.clone()),
                    // Deleted again before we ever committed it.
                    None => continue,
                };
                let parent_server = match self.to_server.get(&parent_local) {
                    Some(p) => p.clone(),
                    None => {
                        // Parent not committed yet; retry after this pass.
                        deferred.push(local_id);
                        continue;
                    }
                };
                if let Some(server_id) = self.to_server.get(&local_id).cloned() {
                    match &url {
                        Some(u) => server.modify_bookmark_entity(
                            &server_id,
                            &title,
                            u,
                            Some(&parent_server),
                        )?,
                        None => server.modify_bookmark_folder_entity(
                            &server_id,
                            &title,
                            Some(&parent_server),
                        )?,
                    }
                } else {
                    let server_id = server.commit_client_bookmark(
                        &local_id,
                        &title,
                        url.as_deref(),
                        &parent_server,
                    )?;
                    self.to_server.insert(local_id.clone(), server_id.clone());
                    self.to_local.insert(server_id, local_id.clone());
                }
                progressed = true;
            }
            if !progressed {
                // A dirty node's parent isn't on the server and never will
                // be this pass; leave it for the next sync.
                self.dirty = deferred;
                break;
            }
            pending = deferred;
        }
        Ok(())
    }

    /// Pull the server's bookmark tree down, mapping server ids (and server
    /// parent ids) back onto local ones, and honoring tombstones.
    pub(crate) fn apply(&mut self, server: &FakeServerHandle) -> Result<()> {
        // Entities arrive in version order, which says nothing about tree
        // shape: an edited folder can carry a higher version than its
        // children. So upsert every node first and resolve parents only
        // once the whole snapshot is in.
        let mut parents: Vec<(String, String)> = Vec::new();
        for entity in server.entities_by_data_type(DataType::Bookmarks)? {
            if entity.is_permanent_folder() {
                continue;
            }
            let specifics = match entity.specifics {
                Some(EntitySpecifics::Bookmark(b)) => b,
                _ => continue,
            };
            let parent_server = entity
                .parent_id
                .clone()
                .unwrap_or_else(|| BOOKMARK_BAR_ID.to_string());
            let local_id = match self.to_local.get(&entity.server_id).cloned() {
                Some(local_id) => {
                    if let Some(node) = self.nodes.get_mut(&local_id) {
                        node.title = specifics.title;
                        node.url = specifics.url;
                    }
                    local_id
                }
                None => {
                    let local_id = self.alloc_id();
                    self.nodes.insert(
                        local_id.clone(),
                        BookmarkNode {
                            id: local_id.clone(),
                            parent_id: BOOKMARK_BAR_ID.into(),
                            title: specifics.title,
                            url: specifics.url,
                        },
                    );
                    self.to_server.insert(local_id.clone(), entity.server_id.clone());
                    self.to_local.insert(entity.server_id, local_id.clone());
                    local_id
                }
            };
            parents.push((local_id, parent_server));
        }
        for (local_id, parent_server) in parents {
            let parent_local = self
                .to_local
                .get(&parent_server)
                .cloned()
                // Every applied node is mapped now, so a parent still
                // missing here really was created outside this model's
                // view; file the node under the bar rather than drop it.
                .unwrap_or_else(|| BOOKMARK_BAR_ID.to_string());
            if let Some(node) = self.nodes.get_mut(&local_id) {
                node.parent_id = parent_local;
            }
        }
        for tombstone in server.tombstones_by_data_type(DataType::Bookmarks)? {
            if let Some(local_id) = self.to_local.remove(&tombstone.server_id) {
                self.to_server.remove(&local_id);
                self.nodes.remove(&local_id);
            }
        }
        // A direct server-side tombstone of a folder doesn't cover its
        // children; prune anything left pointing at a parent that no
        // longer exists so the local tree never dangles.
        loop {
            let orphans: Vec<String> = self
                .nodes
                .values()
                .filter(|n| !n.parent_id.is_empty() && !self.nodes.contains_key(&n.parent_id))
                .map(|n| n.id.clone())
                .collect();
            if orphans.is_empty() {
                break;
            }
            for id in orphans {
                self.nodes.remove(&id);
                if let Some(server_id) = self.to_server.remove(&id) {
                    self.to_local.remove(&server_id);
                }
            }
        }
        Ok(())
    }
}

// Test helpers.

pub fn verify_server_bookmark_count(client: &TestClient, count: usize, name: &str) {
    assert!(
        client
            .server
            .verify_entity_count_by_type_and_name(count, DataType::Bookmarks, name)
            .expect("count query to work"),
        "expected exactly {} server bookmark(s) named {:?}",
        count,
        name
    );
}

pub fn server_bookmark_named(client: &TestClient, name: &str) -> fakeserver::FakeServerEntity {
    client
        .server
        .entities_by_data_type(DataType::Bookmarks)
        .expect("entity query to work")
        .into_iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("no server bookmark named {:?}", name))
}

pub fn wait_for_local_bookmark(client: &mut TestClient, title: &str) {
    let seen = poll_short(|| {
        let count = client.bookmarks.count_with_title(title);
        if count == 1 {
            Ok(())
        } else {
            Err(format!("{} local bookmark(s) titled {:?}", count, title))
        }
    });
    seen.expect("bookmark to converge locally");
}

// Actual tests.

fn test_bookmark_roundtrip(c0: &mut TestClient, c1: &mut TestClient) {
    log::info!("Create a folder and a bookmark on c0");
    let folder = c0.bookmarks.add_folder("work", BOOKMARK_BAR_ID);
    let bookmark = c0
        .bookmarks
        .add_bookmark("Chromium", "http://chromium.org/", &folder);

    c0.sync().expect("c0 sync to work");

    verify_server_bookmark_count(c0, 1, "Chromium");
    let entity = server_bookmark_named(c0, "Chromium");
    // Server-assigned ids are the originator's local id with "s" prepended.
    assert_eq!(entity.server_id, format!("s{}", bookmark));
    assert_eq!(
        entity.parent_id.as_deref(),
        Some(format!("s{}", folder).as_str())
    );
    match entity.specifics {
        Some(EntitySpecifics::Bookmark(b)) => {
            assert_eq!(b.title, "Chromium");
            assert_eq!(b.url.as_deref(), Some("http://chromium.org/"));
        }
        other => panic!("unexpected specifics: {:?}", other),
    }

    log::info!("Converge c1 and check the tree shape survived");
    c1.sync().expect("c1 sync to work");
    wait_for_local_bookmark(c1, "Chromium");
    let node = c1.bookmarks.find_by_title("Chromium").expect("node applied");
    assert_eq!(node.url.as_deref(), Some("http://chromium.org/"));
    let parent = c1.bookmarks.get(&node.parent_id).expect("parent applied");
    assert_eq!(parent.title, "work");
    assert!(parent.is_folder());
}

fn test_bookmark_server_injection(c0: &mut TestClient, _c1: &mut TestClient) {
    let folder_id = c0
        .server
        .inject_bookmark_folder_entity("injected folder", None)
        .expect("folder injection to work");
    c0.server
        .inject_bookmark_entity("injected", "http://example.com/", Some(&folder_id))
        .expect("bookmark injection to work");

    c0.sync().expect("c0 sync to work");
    wait_for_local_bookmark(c0, "injected");
    let node = c0.bookmarks.find_by_title("injected").expect("applied");
    assert_eq!(node.url.as_deref(), Some("http://example.com/"));
    let parent = c0.bookmarks.get(&node.parent_id).expect("parent applied");
    assert_eq!(parent.title, "injected folder");
    assert!(parent.is_folder());
}

fn test_bookmark_delete_propagation(c0: &mut TestClient, c1: &mut TestClient) {
    log::info!("Local delete becomes a server tombstone");
    let bookmark = c0
        .bookmarks
        .add_bookmark("doomed", "http://doomed.org/", BOOKMARK_BAR_ID);
    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");
    wait_for_local_bookmark(c1, "doomed");
    verify_server_bookmark_count(c0, 1, "doomed");

    let server_id = c0
        .bookmarks
        .server_id_for(&bookmark)
        .expect("committed")
        .to_string();
    c0.bookmarks.delete(&bookmark);
    c0.sync().expect("c0 sync to work");

    verify_server_bookmark_count(c0, 0, "doomed");
    let tombstones = c0
        .server
        .tombstones_by_data_type(DataType::Bookmarks)
        .expect("tombstone query to work");
    assert!(
        tombstones.iter().any(|t| t.server_id == server_id),
        "tombstone for {} should survive under its id",
        server_id
    );

    log::info!("And the tombstone reaches the other client");
    c1.sync().expect("c1 sync to work");
    assert_eq!(c1.bookmarks.count_with_title("doomed"), 0);
}

fn test_bookmark_move(c0: &mut TestClient, c1: &mut TestClient) {
    let folder_a = c0.bookmarks.add_folder("a", BOOKMARK_BAR_ID);
    let folder_b = c0.bookmarks.add_folder("b", BOOKMARK_BAR_ID);
    let bookmark = c0
        .bookmarks
        .add_bookmark("wanderer", "http://w.org/", &folder_a);
    c0.sync().expect("c0 sync to work");

    c0.bookmarks.move_node(&bookmark, &folder_b);
    c0.sync().expect("c0 sync to work");

    let entity = server_bookmark_named(c0, "wanderer");
    assert_eq!(
        entity.parent_id.as_deref(),
        Some(format!("s{}", folder_b).as_str())
    );

    c1.sync().expect("c1 sync to work");
    let node = c1.bookmarks.find_by_title("wanderer").expect("applied");
    let parent = c1.bookmarks.get(&node.parent_id).expect("parent applied");
    assert_eq!(parent.title, "b");
}

fn test_folder_rename_then_fresh_client(c0: &mut TestClient, c1: &mut TestClient) {
    log::info!("Commit a folder and a child, then rename the folder");
    let folder = c0.bookmarks.add_folder("work", BOOKMARK_BAR_ID);
    c0.bookmarks
        .add_bookmark("Chromium", "http://chromium.org/", &folder);
    c0.sync().expect("c0 sync to work");

    // The rename bumps the folder's version past its child's, so a client
    // seeing the tree for the first time gets them in folder-last order.
    c0.bookmarks.set_title(&folder, "work!");
    c0.sync().expect("c0 sync to work");

    c1.sync().expect("c1 sync to work");
    wait_for_local_bookmark(c1, "Chromium");
    let node = c1.bookmarks.find_by_title("Chromium").expect("applied");
    let parent = c1.bookmarks.get(&node.parent_id).expect("parent applied");
    assert_eq!(parent.title, "work!");
    assert!(parent.is_folder());
}

fn test_server_folder_tombstone_prunes_subtree(c0: &mut TestClient, c1: &mut TestClient) {
    let folder = c0.bookmarks.add_folder("doomed folder", BOOKMARK_BAR_ID);
    c0.bookmarks
        .add_bookmark("orphan", "http://orphan.org/", &folder);
    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");
    wait_for_local_bookmark(c1, "orphan");

    log::info!("Tombstone the folder directly on the server");
    let folder_server_id = c0
        .bookmarks
        .server_id_for(&folder)
        .expect("committed")
        .to_string();
    c0.server
        .delete_entity(&folder_server_id, None)
        .expect("server delete to work");

    for client in [c0, c1] {
        client.sync().expect("sync to work");
        assert_eq!(client.bookmarks.count_with_title("doomed folder"), 0);
        assert_eq!(
            client.bookmarks.count_with_title("orphan"),
            0,
            "child should not survive its folder's removal"
        );
    }
}

fn test_folder_vs_leaf_payloads(c0: &mut TestClient, _c1: &mut TestClient) {
    c0.server
        .inject_bookmark_folder_entity("the folder", None)
        .expect("folder injection to work");
    c0.server
        .inject_bookmark_entity("the leaf", "http://leaf.org/", None)
        .expect("bookmark injection to work");

    let blobs = c0
        .server
        .get_sync_entities_by_data_type(DataType::Bookmarks)
        .expect("payload query to work");
    let mut saw_folder = false;
    let mut saw_leaf = false;
    for blob in blobs {
        match EntitySpecifics::from_bytes(&blob).expect("payloads to decode") {
            EntitySpecifics::Bookmark(BookmarkSpecifics { title, url }) => {
                if title == "the folder" {
                    assert!(url.is_none(), "folder decoded with a URL");
                    saw_folder = true;
                } else if title == "the leaf" {
                    assert!(url.is_some(), "leaf decoded without a URL");
                    saw_leaf = true;
                }
            }
            other => panic!("unexpected specifics: {:?}", other),
        }
    }
    assert!(saw_folder && saw_leaf);
}

pub fn get_test_group() -> TestGroup {
    TestGroup::new(
        "bookmarks",
        vec![
            ("test_bookmark_roundtrip", test_bookmark_roundtrip),
            ("test_bookmark_server_injection", test_bookmark_server_injection),
            (
                "test_bookmark_delete_propagation",
                test_bookmark_delete_propagation,
            ),
            ("test_bookmark_move", test_bookmark_move),
            (
                "test_folder_rename_then_fresh_client",
                test_folder_rename_then_fresh_client,
            ),
            (
                "test_server_folder_tombstone_prunes_subtree",
                test_server_folder_tombstone_prunes_subtree,
            ),
            ("test_folder_vs_leaf_payloads", test_folder_vs_leaf_payloads),
        ],
    )
}
