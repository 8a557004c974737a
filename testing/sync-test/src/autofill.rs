/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! Local autofill profile model. Profiles correlate across the boundary by
//! client tag, and the tag is simply the profile guid - so server-side edits
//! land on the right local record no matter what server id they live under.

use crate::client::TestClient;
use crate::testing::{poll_short, TestGroup};
use fakeserver::specifics::{AutofillProfileSpecifics, ClientTagHash, EntitySpecifics};
use fakeserver::{DataType, FakeServerHandle, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use sync_guid::Guid;

pub type AutofillProfile = AutofillProfileSpecifics;

pub struct AutofillModel {
    profiles: BTreeMap<String, AutofillProfile>,
    to_server: HashMap<String, String>,
    dirty: BTreeSet<String>,
    pending_deletes: Vec<(String, ClientTagHash)>,
}

impl AutofillModel {
    pub fn new() -> Self {
        AutofillModel {
            profiles: BTreeMap::new(),
            to_server: HashMap::new(),
            dirty: BTreeSet::new(),
            pending_deletes: Vec::new(),
        }
    }

    /// Add a profile, assigning a guid if the caller didn't. Returns the guid.
    pub fn add_profile(&mut self, mut profile: AutofillProfile) -> String {
        if profile.guid.is_empty() {
            profile.guid = Guid::random().into_string();
        }
        let guid = profile.guid.clone();
        self.profiles.insert(guid.clone(), profile);
        self.dirty.insert(guid.clone());
        guid
    }

    pub fn update_profile(&mut self, guid: &str, update: impl FnOnce(&mut AutofillProfile)) {
        let profile = self.profiles.get_mut(guid).expect("unknown profile");
        update(profile);
        self.dirty.insert(guid.into());
    }

    pub fn delete_profile(&mut self, guid: &str) {
        self.profiles.remove(guid).expect("unknown profile");
        self.dirty.remove(guid);
        if let Some(server_id) = self.to_server.remove(guid) {
            self.pending_deletes
                .push((server_id, ClientTagHash::from_tag(DataType::Autofill, guid)));
        }
    }

    pub fn get_profile(&self, guid: &str) -> Option<&AutofillProfile> {
        self.profiles.get(guid)
    }

    pub fn all_profiles(&self) -> impl Iterator<Item = &AutofillProfile> {
        self.profiles.values()
    }

    pub fn count(&self) -> usize {
        self.profiles.len()
    }

    pub(crate) fn commit(&mut self, server: &FakeServerHandle) -> Result<()> {
        for (server_id, hash) in std::mem::take(&mut self.pending_deletes) {
            server.delete_entity(&server_id, Some(hash))?;
        }
        for guid in std::mem::take(&mut self.dirty) {
            let profile = match self.profiles.get(&guid) {
                Some(p) => p.clone(),
                None => continue,
            };
            let bytes = EntitySpecifics::Autofill(profile).to_bytes()?;
            match self.to_server.get(&guid) {
                Some(server_id) => server.modify_entity_specifics(server_id, &bytes)?,
                None => {
                    let server_id = server.inject_unique_client_entity(&guid, &guid, &bytes)?;
                    self.to_server.insert(guid, server_id);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&mut self, server: &FakeServerHandle) -> Result<()> {
        for entity in server.entities_by_data_type(DataType::Autofill)? {
            let profile = match entity.specifics {
                Some(EntitySpecifics::Autofill(p)) => p,
                _ => continue,
            };
            self.to_server
                .insert(profile.guid.clone(), entity.server_id);
            self.profiles.insert(profile.guid.clone(), profile);
        }
        for tombstone in server.tombstones_by_data_type(DataType::Autofill)? {
            let hash = match &tombstone.client_tag_hash {
                Some(h) => h.clone(),
                None => continue,
            };
            let doomed: Vec<String> = self
                .profiles
                .keys()
                .filter(|guid| ClientTagHash::from_tag(DataType::Autofill, guid) == hash)
                .cloned()
                .collect();
            for guid in doomed {
                self.profiles.remove(&guid);
                self.to_server.remove(&guid);
            }
        }
        Ok(())
    }
}

impl Default for AutofillModel {
    fn default() -> Self {
        Self::new()
    }
}

// Test helpers.

pub fn mountain_view_profile(guid: &str) -> AutofillProfile {
    AutofillProfile {
        guid: guid.into(),
        full_name: "John Doe".into(),
        street_address: "1600 Amphitheatre Pkwy".into(),
        city: "Mountain View".into(),
        zip: "94043".into(),
        country: "US".into(),
    }
}

pub fn inject_server_profile(client: &TestClient, profile: &AutofillProfile) -> String {
    let bytes = EntitySpecifics::Autofill(profile.clone())
        .to_bytes()
        .expect("profile to serialize");
    client
        .server
        .inject_unique_client_entity(&profile.guid, &profile.guid, &bytes)
        .expect("server injection to work")
}

pub fn assert_profile_equiv(a: &AutofillProfile, b: &AutofillProfile) {
    assert_eq!(a.full_name, b.full_name, "full_name mismatch");
    assert_eq!(a.street_address, b.street_address, "street_address mismatch");
    assert_eq!(a.city, b.city, "city mismatch");
    assert_eq!(a.zip, b.zip, "zip mismatch");
    assert_eq!(a.country, b.country, "country mismatch");
}

// Actual tests.

fn test_autofill_roundtrip(c0: &mut TestClient, c1: &mut TestClient) {
    let guid = c0.autofill.add_profile(mountain_view_profile(""));
    c0.sync().expect("c0 sync to work");

    assert!(c0
        .server
        .verify_entity_count_by_type_and_name(1, DataType::Autofill, &guid)
        .expect("count query to work"));

    c1.sync().expect("c1 sync to work");
    let local = c1.autofill.get_profile(&guid).expect("profile applied");
    assert_profile_equiv(local, &mountain_view_profile(&guid));
}

fn test_autofill_server_modify(c0: &mut TestClient, _c1: &mut TestClient) {
    log::info!("Server injects a Mountain View profile");
    let profile = mountain_view_profile("profile-guid-1");
    let server_id = inject_server_profile(c0, &profile);

    c0.sync().expect("c0 sync to work");
    assert_eq!(
        c0.autofill.get_profile(&profile.guid).expect("applied").city,
        "Mountain View"
    );

    log::info!("Server changes the city; the client copy follows");
    let mut updated = profile.clone();
    updated.city = "Sunnyvale".into();
    let bytes = EntitySpecifics::Autofill(updated)
        .to_bytes()
        .expect("profile to serialize");
    c0.server
        .modify_entity_specifics(&server_id, &bytes)
        .expect("server modify to work");

    c0.sync().expect("c0 sync to work");
    let check = poll_short(|| {
        let city = &c0.autofill.get_profile(&profile.guid).expect("still there").city;
        match city.as_str() {
            "Sunnyvale" => Ok(()),
            "Mountain View" => Err("city still Mountain View".into()),
            other => panic!("city transitioned to an unexpected value: {:?}", other),
        }
    });
    check.expect("city to converge to Sunnyvale");
}

fn test_autofill_delete_by_tag(c0: &mut TestClient, _c1: &mut TestClient) {
    log::info!("Inject, then delete by id and tag hash");
    let profile = mountain_view_profile("profile-guid-2");
    let server_id = inject_server_profile(c0, &profile);
    let hash = ClientTagHash::from_tag(DataType::Autofill, &profile.guid);

    c0.server
        .delete_entity(&server_id, Some(hash.clone()))
        .expect("delete to work");
    // Deleting a tombstone is a no-op, not an error.
    c0.server
        .delete_entity(&server_id, Some(hash))
        .expect("re-delete to be a no-op");

    c0.sync().expect("c0 sync to work");
    assert!(c0.autofill.get_profile(&profile.guid).is_none());
    assert!(c0
        .server
        .verify_entity_count_by_type_and_name(0, DataType::Autofill, &profile.guid)
        .expect("count query to work"));
}

fn test_autofill_local_delete_propagates(c0: &mut TestClient, c1: &mut TestClient) {
    let guid = c0.autofill.add_profile(mountain_view_profile(""));
    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");
    assert_eq!(c1.autofill.count(), 1);

    c0.autofill.delete_profile(&guid);
    c0.sync().expect("c0 sync to work");
    c1.sync().expect("c1 sync to work");
    assert_eq!(c1.autofill.count(), 0, "tombstone should reach c1 by tag");
}

fn test_disabled_type_is_isolated(c0: &mut TestClient, _c1: &mut TestClient) {
    c0.disable_data_type(DataType::Autofill);
    inject_server_profile(c0, &mountain_view_profile("profile-guid-3"));

    c0.sync().expect("c0 sync to work");
    // A full pass ran; the disabled type stayed untouched on the client.
    let check = poll_short(|| {
        if c0.autofill.count() == 0 {
            Ok(())
        } else {
            Err(format!("{} local profiles", c0.autofill.count()))
        }
    });
    check.expect("disabled type to stay empty");

    // Re-enabling picks the entity up on the next pass.
    c0.enable_data_type(DataType::Autofill);
    c0.sync().expect("c0 sync to work");
    assert_eq!(c0.autofill.count(), 1);
}

pub fn get_test_group() -> TestGroup {
    TestGroup::new(
        "autofill",
        vec![
            ("test_autofill_roundtrip", test_autofill_roundtrip),
            ("test_autofill_server_modify", test_autofill_server_modify),
            ("test_autofill_delete_by_tag", test_autofill_delete_by_tag),
            (
                "test_autofill_local_delete_propagates",
                test_autofill_local_delete_propagates,
            ),
            ("test_disabled_type_is_isolated", test_disabled_type_is_isolated),
        ],
    )
}
