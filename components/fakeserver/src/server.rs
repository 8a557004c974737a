/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The handle test authors talk to. This is the transport boundary of the
//! harness: specifics enter and leave as opaque serialized blocks, at most
//! one server is active per process, and every store operation must happen
//! on the thread that created the handle. The one thread-safe entry point is
//! [`FakeServerHandle::wait_until`], so a watcher thread can block on
//! convergence while the designated thread keeps mutating.

use crate::error::{Error, Result};
use crate::specifics::{ClientTagHash, DataType, EntitySpecifics};
use crate::store::{FakeServer, FakeServerEntity, BOOKMARK_BAR_ID};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

lazy_static! {
    // Whether a live FakeServerHandle exists anywhere in the process.
    static ref ACTIVE: Mutex<bool> = Mutex::new(false);
}

struct Shared {
    store: Mutex<FakeServer>,
    // Notified on every mutation; wait_until blocks on this.
    converged: Condvar,
}

pub struct FakeServerHandle {
    shared: Arc<Shared>,
    main_thread: ThreadId,
    released: AtomicBool,
}

impl FakeServerHandle {
    /// Create the process-wide fake server. Returns `None` (after logging a
    /// warning) if one is already active; by policy this is not an error.
    pub fn create() -> Option<FakeServerHandle> {
        let mut active = ACTIVE.lock().unwrap();
        if *active {
            log::warn!("FakeServerHandle::create() called while a server is already active");
            return None;
        }
        *active = true;
        log::info!("Fake server created");
        Some(FakeServerHandle {
            shared: Arc::new(Shared {
                store: Mutex::new(FakeServer::new()),
                converged: Condvar::new(),
            }),
            main_thread: thread::current().id(),
            released: AtomicBool::new(false),
        })
    }

    /// Release the active-server slot. Idempotent: destroying twice (or
    /// destroying and then dropping) is a no-op the second time.
    pub fn destroy(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            *ACTIVE.lock().unwrap() = false;
            log::info!("Fake server destroyed");
        }
    }

    fn ensure_main_thread(&self) -> Result<()> {
        if thread::current().id() != self.main_thread {
            return Err(Error::WrongThread);
        }
        Ok(())
    }

    /// Run one store operation on the designated thread, then wake any
    /// convergence waiters.
    fn with_store<R>(&self, f: impl FnOnce(&mut FakeServer) -> Result<R>) -> Result<R> {
        self.ensure_main_thread()?;
        let result = {
            let mut store = self.shared.store.lock().unwrap();
            f(&mut store)
        };
        self.shared.converged.notify_all();
        result
    }

    pub fn inject_unique_client_entity(
        &self,
        non_unique_name: &str,
        client_tag: &str,
        specifics_bytes: &[u8],
    ) -> Result<String> {
        let specifics = EntitySpecifics::from_bytes(specifics_bytes)?;
        self.with_store(|s| s.inject_unique_client_entity(non_unique_name, client_tag, specifics))
    }

    pub fn modify_entity_specifics(&self, id: &str, specifics_bytes: &[u8]) -> Result<()> {
        let specifics = EntitySpecifics::from_bytes(specifics_bytes)?;
        self.with_store(|s| s.modify_entity_specifics(id, specifics))
    }

    pub fn delete_entity(&self, id: &str, client_tag_hash: Option<ClientTagHash>) -> Result<()> {
        self.with_store(|s| s.delete_entity(id, client_tag_hash))
    }

    pub fn verify_entity_count_by_type_and_name(
        &self,
        count: usize,
        data_type: DataType,
        name: &str,
    ) -> Result<bool> {
        self.with_store(|s| Ok(s.count_by_type_and_name(data_type, name) == count))
    }

    /// The live entities of one type, as opaque serialized specifics blocks.
    pub fn get_sync_entities_by_data_type(&self, data_type: DataType) -> Result<Vec<Vec<u8>>> {
        self.with_store(|s| {
            s.entities_by_data_type(data_type)
                .into_iter()
                .filter_map(|e| e.specifics.as_ref())
                .map(|specifics| specifics.to_bytes())
                .collect()
        })
    }

    /// Snapshot of the live entities of one type, metadata included. The
    /// reconciliation harness needs ids and parents, not just payloads.
    pub fn entities_by_data_type(&self, data_type: DataType) -> Result<Vec<FakeServerEntity>> {
        self.with_store(|s| {
            Ok(s.entities_by_data_type(data_type)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    pub fn tombstones_by_data_type(&self, data_type: DataType) -> Result<Vec<FakeServerEntity>> {
        self.with_store(|s| {
            Ok(s.tombstones_by_data_type(data_type)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    pub fn inject_bookmark_entity(
        &self,
        name: &str,
        url: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        self.with_store(|s| s.inject_bookmark_entity(name, url, parent_id))
    }

    pub fn inject_bookmark_folder_entity(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        self.with_store(|s| s.inject_bookmark_folder_entity(name, parent_id))
    }

    pub fn modify_bookmark_entity(
        &self,
        id: &str,
        name: &str,
        url: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        self.with_store(|s| s.modify_bookmark_entity(id, name, url, parent_id))
    }

    pub fn modify_bookmark_folder_entity(
        &self,
        id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        self.with_store(|s| s.modify_bookmark_folder_entity(id, name, parent_id))
    }

    pub fn commit_client_bookmark(
        &self,
        originator_item_id: &str,
        name: &str,
        url: Option<&str>,
        parent_id: &str,
    ) -> Result<String> {
        self.with_store(|s| s.commit_client_bookmark(originator_item_id, name, url, parent_id))
    }

    pub fn get_bookmark_bar_folder_id(&self) -> String {
        BOOKMARK_BAR_ID.to_string()
    }

    pub fn set_custom_passphrase_nigori(&self, key_name: &str) -> Result<()> {
        self.with_store(|s| s.set_custom_passphrase_nigori(key_name))
    }

    pub fn set_trusted_vault_nigori(&self) -> Result<()> {
        self.with_store(|s| s.set_trusted_vault_nigori())
    }

    pub fn clear_server_data(&self) -> Result<()> {
        self.with_store(|s| {
            s.clear_server_data();
            Ok(())
        })
    }

    /// Block until `pred` holds over the store, or until `timeout` elapses.
    /// `pred` reports the last observed mismatch as an `Err(description)`,
    /// which is carried on the timeout error for diagnosis. Callable from
    /// any thread; waiters are woken on every mutation rather than polling
    /// on a timer.
    pub fn wait_until<F>(&self, timeout: Duration, mut pred: F) -> Result<()>
    where
        F: FnMut(&FakeServer) -> std::result::Result<(), String>,
    {
        let deadline = Instant::now() + timeout;
        let mut store = self.shared.store.lock().unwrap();
        let mut last_seen = match pred(&store) {
            Ok(()) => return Ok(()),
            Err(seen) => seen,
        };
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ConvergenceTimeout { last_seen });
            }
            let (guard, _) = self
                .shared
                .converged
                .wait_timeout(store, deadline - now)
                .unwrap();
            store = guard;
            match pred(&store) {
                Ok(()) => return Ok(()),
                Err(seen) => last_seen = seen,
            }
        }
    }
}

impl Drop for FakeServerHandle {
    fn drop(&mut self) {
        // Teardown must happen on every exit path, test panics included.
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specifics::{AutofillProfileSpecifics, PassphraseType};

    lazy_static! {
        // The active-server slot is process-wide, so tests touching it must
        // not overlap.
        static ref ONE_SERVER_AT_A_TIME: Mutex<()> = Mutex::new(());
    }

    fn exclusive() -> std::sync::MutexGuard<'static, ()> {
        ONE_SERVER_AT_A_TIME
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn profile_bytes(guid: &str, city: &str) -> Vec<u8> {
        EntitySpecifics::Autofill(AutofillProfileSpecifics {
            guid: guid.into(),
            city: city.into(),
            ..Default::default()
        })
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_at_most_one_active_server() {
        let _guard = exclusive();
        let first = FakeServerHandle::create().unwrap();
        assert!(FakeServerHandle::create().is_none());
        first.destroy();
        // The slot is free again, and double-destroy stays a no-op.
        let second = FakeServerHandle::create().unwrap();
        first.destroy();
        second
            .inject_bookmark_entity("Chromium", "http://chromium.org/", None)
            .unwrap();
    }

    #[test]
    fn test_drop_releases_the_slot() {
        let _guard = exclusive();
        {
            let _server = FakeServerHandle::create().unwrap();
        }
        let server = FakeServerHandle::create().unwrap();
        server.destroy();
    }

    #[test]
    fn test_calls_from_the_wrong_thread_fail() {
        let _guard = exclusive();
        let server = FakeServerHandle::create().unwrap();
        thread::scope(|scope| {
            scope.spawn(|| {
                let err = server
                    .inject_bookmark_entity("x", "http://x.org/", None)
                    .unwrap_err();
                assert!(matches!(err, Error::WrongThread));
            });
        });
        // The designated thread is unaffected.
        server
            .inject_bookmark_entity("x", "http://x.org/", None)
            .unwrap();
    }

    #[test]
    fn test_bytes_cross_the_bridge_opaquely() {
        let _guard = exclusive();
        let server = FakeServerHandle::create().unwrap();
        server
            .inject_unique_client_entity("profile", "guid-1", &profile_bytes("guid-1", "Mountain View"))
            .unwrap();
        let blobs = server
            .get_sync_entities_by_data_type(DataType::Autofill)
            .unwrap();
        assert_eq!(blobs.len(), 1);
        match EntitySpecifics::from_bytes(&blobs[0]).unwrap() {
            EntitySpecifics::Autofill(p) => assert_eq!(p.city, "Mountain View"),
            other => panic!("unexpected specifics: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_fails_the_call() {
        let _guard = exclusive();
        let server = FakeServerHandle::create().unwrap();
        let err = server
            .inject_unique_client_entity("p", "tag", b"{ garbage")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedSpecifics(_)));
    }

    #[test]
    fn test_wait_until_sees_mutations_from_designated_thread() {
        let _guard = exclusive();
        let server = Arc::new(FakeServerHandle::create().unwrap());
        thread::scope(|scope| {
            let watcher = {
                let server = Arc::clone(&server);
                scope.spawn(move || {
                    server.wait_until(Duration::from_secs(5), |s| {
                        if s.count_by_type_and_name(DataType::Bookmarks, "Chromium") == 1 {
                            Ok(())
                        } else {
                            Err("no entity named Chromium yet".into())
                        }
                    })
                })
            };
            // Give the watcher a moment to block, then publish.
            thread::sleep(Duration::from_millis(50));
            server
                .inject_bookmark_entity("Chromium", "http://chromium.org/", None)
                .unwrap();
            watcher.join().unwrap().unwrap();
        });
    }

    #[test]
    fn test_wait_until_timeout_reports_last_seen() {
        let _guard = exclusive();
        let server = FakeServerHandle::create().unwrap();
        let err = server
            .wait_until(Duration::from_millis(50), |s| {
                Err(format!(
                    "bookmark count is {}",
                    s.entities_by_data_type(DataType::Bookmarks).len()
                ))
            })
            .unwrap_err();
        match err {
            Error::ConvergenceTimeout { last_seen } => {
                assert_eq!(last_seen, "bookmark count is 3");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_nigori_round_trip_through_handle() {
        let _guard = exclusive();
        let server = FakeServerHandle::create().unwrap();
        server.set_custom_passphrase_nigori("key-1").unwrap();
        let blobs = server
            .get_sync_entities_by_data_type(DataType::Nigori)
            .unwrap();
        assert_eq!(blobs.len(), 1);
        match EntitySpecifics::from_bytes(&blobs[0]).unwrap() {
            EntitySpecifics::Nigori(n) => {
                assert_eq!(n.passphrase_type, PassphraseType::CustomPassphrase);
                assert_eq!(n.key_name.as_deref(), Some("key-1"));
            }
            other => panic!("unexpected specifics: {:?}", other),
        }
    }
}
