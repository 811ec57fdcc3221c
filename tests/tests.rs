//! Dogfoods the crate's own runner against the fixture tree in `demos/`,
//! following the teacher's own `tests/tests.rs` convention of running the
//! crate on a small fixture tree as its primary integration test.

use cliscore::TestConfig;

#[test]
#[cfg(unix)]
fn run_demos() -> cliscore::TestResult<()> {
    let config = TestConfig::new("demos")?;
    config.run_tests()
}
