/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

//! A minimal sync "client": per-data-type local models plus a synchronous
//! reconciliation pass against the shared fake server. Tests mutate a model,
//! call `sync()`, then assert on the other side.

use crate::autofill::AutofillModel;
use crate::bookmarks::BookmarkModel;
use crate::tabs::TabsModel;
use crate::typed_urls::TypedUrlModel;
use fakeserver::{DataType, FakeServerHandle, Result};
use std::collections::HashSet;
use std::sync::Arc;
use sync_guid::Guid;

fn all_types() -> HashSet<DataType> {
    [
        DataType::Bookmarks,
        DataType::Autofill,
        DataType::Sessions,
        DataType::TypedUrls,
    ]
    .into_iter()
    .collect()
}

pub struct TestClient {
    pub server: Arc<FakeServerHandle>,
    /// Identifies this client; doubles as its session tag.
    pub cache_guid: Guid,
    enabled_types: HashSet<DataType>,
    pub bookmarks: BookmarkModel,
    pub autofill: AutofillModel,
    pub tabs: TabsModel,
    pub typed_urls: TypedUrlModel,
}

impl TestClient {
    pub fn new(server: Arc<FakeServerHandle>) -> TestClient {
        let cache_guid = Guid::random();
        TestClient {
            bookmarks: BookmarkModel::new(cache_guid.as_str()),
            autofill: AutofillModel::new(),
            tabs: TabsModel::new(cache_guid.as_str()),
            typed_urls: TypedUrlModel::new(),
            enabled_types: all_types(),
            cache_guid,
            server,
        }
    }

    /// A disabled type takes no part in the sync pass, in either direction.
    pub fn disable_data_type(&mut self, data_type: DataType) {
        self.enabled_types.remove(&data_type);
    }

    pub fn enable_data_type(&mut self, data_type: DataType) {
        self.enabled_types.insert(data_type);
    }

    pub fn is_enabled(&self, data_type: DataType) -> bool {
        self.enabled_types.contains(&data_type)
    }

    /// One full reconciliation pass: push local mutations for every enabled
    /// type, then pull the server's view back down.
    pub fn sync(&mut self) -> Result<()> {
        log::debug!("client {} syncing", self.cache_guid);
        if self.is_enabled(DataType::Bookmarks) {
            self.bookmarks.commit(&self.server)?;
        }
        if self.is_enabled(DataType::Autofill) {
            self.autofill.commit(&self.server)?;
        }
        if self.is_enabled(DataType::Sessions) {
            self.tabs.commit(&self.server)?;
        }
        if self.is_enabled(DataType::TypedUrls) {
            self.typed_urls.commit(&self.server)?;
        }
        if self.is_enabled(DataType::Bookmarks) {
            self.bookmarks.apply(&self.server)?;
        }
        if self.is_enabled(DataType::Autofill) {
            self.autofill.apply(&self.server)?;
        }
        if self.is_enabled(DataType::Sessions) {
            self.tabs.apply(&self.server)?;
        }
        if self.is_enabled(DataType::TypedUrls) {
            self.typed_urls.apply(&self.server)?;
        }
        Ok(())
    }

    /// Drop all local state, as if the profile were wiped. Used between
    /// tests; the server side is cleared separately.
    pub fn fully_reset_local(&mut self) {
        self.bookmarks = BookmarkModel::new(self.cache_guid.as_str());
        self.autofill = AutofillModel::new();
        self.tabs = TabsModel::new(self.cache_guid.as_str());
        self.typed_urls = TypedUrlModel::new();
        self.enabled_types = all_types();
    }
}
