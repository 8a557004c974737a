/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::specifics::{ClientTagHash, DataType};

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a fake server call can fail. All of these are "fail the test"
/// conditions for callers; the harness never retries.
///
/// Note that attempting to create a second live server is deliberately *not*
/// here - that surfaces as a `None` handle with a warning logged, per the
/// at-most-one-active-instance policy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No entity with id {0}")]
    NotFound(String),

    #[error("A live entity already exists for client tag hash {0}")]
    DuplicateClientTag(ClientTagHash),

    #[error("Entity {id} holds {expected} specifics but the payload is {got}")]
    WrongDataType {
        id: String,
        expected: DataType,
        got: DataType,
    },

    #[error("Malformed specifics payload: {0}")]
    MalformedSpecifics(#[from] serde_json::Error),

    #[error("Bookmark entities require a URL")]
    MissingUrl,

    #[error("Folder entities must not carry a URL")]
    UnexpectedUrl,

    #[error("Bookmark entities must use the bookmark-specific entry points")]
    BookmarkEntryPoint,

    #[error("Entity {0} is not a bookmark folder")]
    NotAFolder(String),

    #[error("Re-parenting {id} would create a folder cycle")]
    FolderCycle { id: String },

    #[error("Fake server calls must happen on the thread that created it")]
    WrongThread,

    #[error("Timed out waiting for the server to converge; last seen: {last_seen}")]
    ConvergenceTimeout { last_seen: String },

    #[error("Unknown data type: {0:?}")]
    UnknownDataType(String),
}
