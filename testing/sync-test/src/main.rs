/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

use sync_test::{all_test_groups, init_testing, run_test_groups};

pub fn main() {
    println!("### Running sync integration tests ###");
    init_testing();
    run_test_groups(all_test_groups());
    println!("### Sync integration tests passed!");
}
