/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! Passphrase state. There's no client model here - the nigori entity is a
//! server-side singleton and these tests just drive the dedicated bridge
//! calls and decode what comes back.

use crate::client::TestClient;
use crate::testing::TestGroup;
use fakeserver::specifics::{EntitySpecifics, NigoriSpecifics, PassphraseType};
use fakeserver::DataType;

pub fn server_nigori(client: &TestClient) -> NigoriSpecifics {
    let blobs = client
        .server
        .get_sync_entities_by_data_type(DataType::Nigori)
        .expect("nigori query to work");
    assert_eq!(blobs.len(), 1, "exactly one nigori entity expected");
    match EntitySpecifics::from_bytes(&blobs[0]).expect("nigori to decode") {
        EntitySpecifics::Nigori(n) => n,
        other => panic!("unexpected specifics: {:?}", other),
    }
}

fn test_passphrase_transitions(c0: &mut TestClient, _c1: &mut TestClient) {
    // A fresh server is on the keystore passphrase.
    assert_eq!(server_nigori(c0).passphrase_type, PassphraseType::Keystore);

    c0.server
        .set_custom_passphrase_nigori("key-name-1")
        .expect("custom passphrase to apply");
    let nigori = server_nigori(c0);
    assert_eq!(nigori.passphrase_type, PassphraseType::CustomPassphrase);
    assert_eq!(nigori.key_name.as_deref(), Some("key-name-1"));

    c0.server
        .set_trusted_vault_nigori()
        .expect("trusted vault to apply");
    let nigori = server_nigori(c0);
    assert_eq!(nigori.passphrase_type, PassphraseType::TrustedVault);
    assert_eq!(nigori.key_name, None);
}

fn test_clear_resets_passphrase(c0: &mut TestClient, _c1: &mut TestClient) {
    c0.server
        .set_custom_passphrase_nigori("key-name-2")
        .expect("custom passphrase to apply");
    c0.server.clear_server_data().expect("clear to work");
    // Dashboard clear resets everything, the passphrase marker included,
    // and the permanent folders come back.
    assert_eq!(server_nigori(c0).passphrase_type, PassphraseType::Keystore);
    let folders = c0
        .server
        .entities_by_data_type(DataType::Bookmarks)
        .expect("entity query to work");
    assert_eq!(folders.len(), 3);
}

pub fn get_test_group() -> TestGroup {
    TestGroup::new(
        "nigori",
        vec![
            ("test_passphrase_transitions", test_passphrase_transitions),
            ("test_clear_resets_passphrase", test_clear_resets_passphrase),
        ],
    )
}
