/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! An in-process fake sync server for integration tests.
//!
//! Tests drive the server through a [`FakeServerHandle`]: inject entities,
//! modify or tombstone them, and query counts or payloads back, with the
//! payloads crossing the handle as opaque serialized blocks. At most one
//! server is active per process, all mutations are pinned to the creating
//! thread, and [`FakeServerHandle::wait_until`] gives watchers a bounded,
//! condvar-backed way to wait for the store to converge on a predicate.

mod error;
pub mod server;
pub mod specifics;
pub mod store;

pub use crate::error::{Error, Result};
pub use crate::server::FakeServerHandle;
pub use crate::specifics::{ClientTagHash, DataType, EntitySpecifics};
pub use crate::store::{FakeServer, FakeServerEntity};
