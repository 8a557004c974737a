/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

pub mod autofill;
pub mod bookmarks;
pub mod client;
pub mod nigori;
pub mod tabs;
pub mod testing;
pub mod typed_urls;

use crate::client::TestClient;
use crate::testing::TestGroup;
use fakeserver::FakeServerHandle;
use std::sync::Arc;

pub fn init_testing() {
    // Enable backtraces.
    std::env::set_var("RUST_BACKTRACE", "1");
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .try_init();
}

macro_rules! cleanup_clients {
    ($server:ident, $($client:ident),+) => {
        $server.clear_server_data().expect("Server cleanup failed");
        $($client.fully_reset_local();)+
    };
}

pub fn run_test_groups(groups: Vec<TestGroup>) {
    let server = Arc::new(FakeServerHandle::create().expect("a fake server is already active"));
    let mut c0 = TestClient::new(Arc::clone(&server));
    let mut c1 = TestClient::new(Arc::clone(&server));

    log::info!("+ Testing {} groups", groups.len());
    for group in groups {
        log::info!("++ TestGroup begin {}", group.name);
        for (name, test) in group.tests {
            log::info!("+++ Test begin {}::{}", group.name, name);
            test(&mut c0, &mut c1);
            log::info!("+++ Test cleanup {}::{}", group.name, name);
            cleanup_clients!(server, c0, c1);
            log::info!("+++ Test finish {}::{}", group.name, name);
        }
        log::info!("++ TestGroup end {}", group.name);
    }
    server.destroy();
    log::info!("+ Test groups finished");
}

pub fn all_test_groups() -> Vec<TestGroup> {
    vec![
        crate::bookmarks::get_test_group(),
        crate::autofill::get_test_group(),
        crate::tabs::get_test_group(),
        crate::typed_urls::get_test_group(),
        crate::nigori::get_test_group(),
    ]
}
