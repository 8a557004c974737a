/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! Open tabs. Each client publishes at most one live session entity, tagged
//! with its cache guid; everyone else's sessions are read-only remote state,
//! so local tabs are write-only and remote tabs are read-only.

use crate::client::TestClient;
use crate::testing::{poll_short, TestGroup};
use fakeserver::specifics::{ClientTagHash, EntitySpecifics, SessionSpecifics, TabSpecifics};
use fakeserver::{DataType, FakeServerHandle, Result};
use std::collections::BTreeMap;

pub type RemoteTab = TabSpecifics;

pub struct TabsModel {
    session_tag: String,
    local_tabs: Vec<RemoteTab>,
    local_dirty: bool,
    server_id: Option<String>,
    remote: BTreeMap<String, Vec<RemoteTab>>,
}

impl TabsModel {
    pub fn new(session_tag: &str) -> Self {
        TabsModel {
            session_tag: session_tag.into(),
            local_tabs: Vec::new(),
            local_dirty: false,
            server_id: None,
            remote: BTreeMap::new(),
        }
    }

    /// Replace this client's published tabs wholesale.
    pub fn set_local_tabs(&mut self, tabs: Vec<RemoteTab>) {
        self.local_tabs = tabs;
        self.local_dirty = true;
    }

    pub fn remote_tabs(&self, session_tag: &str) -> Option<&[RemoteTab]> {
        self.remote.get(session_tag).map(Vec::as_slice)
    }

    pub fn remote_session_count(&self) -> usize {
        self.remote.len()
    }

    pub(crate) fn commit(&mut self, server: &FakeServerHandle) -> Result<()> {
        if !self.local_dirty {
            return Ok(());
        }
        let bytes = EntitySpecifics::Session(SessionSpecifics {
            session_tag: self.session_tag.clone(),
            tabs: self.local_tabs.clone(),
        })
        .to_bytes()?;
        match &self.server_id {
            Some(server_id) => server.modify_entity_specifics(server_id, &bytes)?,
            None => {
                let server_id = server.inject_unique_client_entity(
                    &self.session_tag,
                    &self.session_tag,
                    &bytes,
                )?;
                self.server_id = Some(server_id);
            }
        }
        self.local_dirty = false;
        Ok(())
    }

    pub(crate) fn apply(&mut self, server: &FakeServerHandle) -> Result<()> {
        for entity in server.entities_by_data_type(DataType::Sessions)? {
            let session = match entity.specifics {
                Some(EntitySpecifics::Session(s)) => s,
                _ => continue,
            };
            // Our own published session isn't "remote".
            if session.session_tag == self.session_tag {
                continue;
            }
            self.remote.insert(session.session_tag, session.tabs);
        }
        for tombstone in server.tombstones_by_data_type(DataType::Sessions)? {
            let hash = match &tombstone.client_tag_hash {
                Some(h) => h.clone(),
                None => continue,
            };
            self.remote
                .retain(|tag, _| ClientTagHash::from_tag(DataType::Sessions, tag) != hash);
        }
        Ok(())
    }
}

// Test helpers.

pub fn tab(title: &str, url: &str) -> RemoteTab {
    RemoteTab {
        title: title.into(),
        url: url.into(),
    }
}

pub fn assert_remote_tabs_equiv(l: &[RemoteTab], r: &[RemoteTab]) {
    assert_eq!(l.len(), r.len(), "tab count mismatch");
    for (l, r) in l.iter().zip(r.iter()) {
        assert_eq!(l.title, r.title);
        assert_eq!(l.url, r.url);
    }
}

pub fn wait_for_remote_session(client: &mut TestClient, session_tag: &str) {
    let tag = session_tag.to_string();
    let seen = poll_short(|| {
        if client.tabs.remote_tabs(&tag).is_some() {
            Ok(())
        } else {
            Err(format!(
                "{} remote session(s), none tagged {}",
                client.tabs.remote_session_count(),
                tag
            ))
        }
    });
    seen.expect("remote session to converge");
}

// Actual tests.

fn test_tabs_roundtrip(c0: &mut TestClient, c1: &mut TestClient) {
    log::info!("Publish tabs on c0");
    let t0 = tab("Welcome to Bobo", "https://bobo.moz/");
    c0.tabs.set_local_tabs(vec![t0.clone()]);

    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");

    wait_for_remote_session(c1, c0.cache_guid.as_str());
    let remote = c1
        .tabs
        .remote_tabs(c0.cache_guid.as_str())
        .expect("session applied");
    assert_remote_tabs_equiv(remote, &[t0]);
    // And c0 does not see itself as a remote session.
    assert_eq!(c0.tabs.remote_session_count(), 0);
}

fn test_tabs_update(c0: &mut TestClient, c1: &mut TestClient) {
    c1.tabs.set_local_tabs(vec![tab("Foo", "https://foo.org/")]);
    c1.sync().expect("c1 sync to work");
    c0.sync().expect("c0 sync to work");
    wait_for_remote_session(c0, c1.cache_guid.as_str());

    log::info!("Replace c1's tabs and re-sync");
    let t1 = tab("Foo", "https://foo.org/");
    let t2 = tab("Bar", "https://bar.org/");
    c1.tabs.set_local_tabs(vec![t1.clone(), t2.clone()]);
    c1.sync().expect("c1 sync to work");
    c0.sync().expect("c0 sync to work");

    let remote = c0
        .tabs
        .remote_tabs(c1.cache_guid.as_str())
        .expect("session applied");
    assert_remote_tabs_equiv(remote, &[t1, t2]);
}

fn test_tabs_session_tombstone(c0: &mut TestClient, c1: &mut TestClient) {
    c0.tabs.set_local_tabs(vec![tab("Gone Soon", "https://gone.org/")]);
    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");
    wait_for_remote_session(c1, c0.cache_guid.as_str());

    // The server drops c0's session (e.g. device removed).
    let session = c1
        .server
        .entities_by_data_type(DataType::Sessions)
        .expect("entity query to work")
        .into_iter()
        .find(|e| e.name == c0.cache_guid.as_str())
        .expect("published session on server");
    c1.server
        .delete_entity(&session.server_id, session.client_tag_hash.clone())
        .expect("delete to work");

    c1.sync().expect("c1 sync to work");
    assert!(c1.tabs.remote_tabs(c0.cache_guid.as_str()).is_none());
}

pub fn get_test_group() -> TestGroup {
    TestGroup::new(
        "tabs",
        vec![
            ("test_tabs_roundtrip", test_tabs_roundtrip),
            ("test_tabs_update", test_tabs_update),
            ("test_tabs_session_tombstone", test_tabs_session_tombstone),
        ],
    )
}
