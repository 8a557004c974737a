/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! Runs every scenario from the group registry under `cargo test`. The fake
//! server slot is process-wide, so scenarios take a lock and run one at a
//! time, each against a fresh server and fresh clients.

use fakeserver::FakeServerHandle;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};
use sync_test::client::TestClient;

lazy_static! {
    static ref ONE_SERVER_AT_A_TIME: Mutex<()> = Mutex::new(());
}

fn run_named(group_name: &str, test_name: &str) {
    sync_test::init_testing();
    let _guard = ONE_SERVER_AT_A_TIME
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let group = sync_test::all_test_groups()
        .into_iter()
        .find(|g| g.name == group_name)
        .unwrap_or_else(|| panic!("no test group named {:?}", group_name));
    let (_, test) = group
        .tests
        .into_iter()
        .find(|(name, _)| *name == test_name)
        .unwrap_or_else(|| panic!("no test named {:?} in {:?}", test_name, group_name));

    let server = Arc::new(FakeServerHandle::create().expect("a fake server is already active"));
    let mut c0 = TestClient::new(Arc::clone(&server));
    let mut c1 = TestClient::new(Arc::clone(&server));
    test(&mut c0, &mut c1);
    server.destroy();
}

#[test]
fn bookmark_roundtrip() {
    run_named("bookmarks", "test_bookmark_roundtrip");
}

#[test]
fn bookmark_server_injection() {
    run_named("bookmarks", "test_bookmark_server_injection");
}

#[test]
fn bookmark_delete_propagation() {
    run_named("bookmarks", "test_bookmark_delete_propagation");
}

#[test]
fn bookmark_move() {
    run_named("bookmarks", "test_bookmark_move");
}

#[test]
fn folder_rename_then_fresh_client() {
    run_named("bookmarks", "test_folder_rename_then_fresh_client");
}

#[test]
fn server_folder_tombstone_prunes_subtree() {
    run_named("bookmarks", "test_server_folder_tombstone_prunes_subtree");
}

#[test]
fn folder_vs_leaf_payloads() {
    run_named("bookmarks", "test_folder_vs_leaf_payloads");
}

#[test]
fn autofill_roundtrip() {
    run_named("autofill", "test_autofill_roundtrip");
}

#[test]
fn autofill_server_modify() {
    run_named("autofill", "test_autofill_server_modify");
}

#[test]
fn autofill_delete_by_tag() {
    run_named("autofill", "test_autofill_delete_by_tag");
}

#[test]
fn autofill_local_delete_propagates() {
    run_named("autofill", "test_autofill_local_delete_propagates");
}

#[test]
fn disabled_type_is_isolated() {
    run_named("autofill", "test_disabled_type_is_isolated");
}

#[test]
fn tabs_roundtrip() {
    run_named("tabs", "test_tabs_roundtrip");
}

#[test]
fn tabs_update() {
    run_named("tabs", "test_tabs_update");
}

#[test]
fn tabs_session_tombstone() {
    run_named("tabs", "test_tabs_session_tombstone");
}

#[test]
fn typed_url_roundtrip() {
    run_named("typed_urls", "test_typed_url_roundtrip");
}

#[test]
fn typed_url_visit_merge() {
    run_named("typed_urls", "test_typed_url_visit_merge");
}

#[test]
fn typed_url_delete_propagation() {
    run_named("typed_urls", "test_typed_url_delete_propagation");
}

#[test]
fn passphrase_transitions() {
    run_named("nigori", "test_passphrase_transitions");
}

#[test]
fn clear_resets_passphrase() {
    run_named("nigori", "test_clear_resets_passphrase");
}
