//! Custom assertion helpers for testing.

use common::{DbError, DbResult, Uid, Xid};
use engine::Engine;
use mvcc::IsolationLevel;

/// Assert that an operation returns an error containing a specific substring.
///
/// # Example
///
/// ```
/// use common::{DbError, DbResult};
/// use testsupport::prelude::*;
///
/// let result: DbResult<()> = Err(DbError::Index("index 0x2 is not open".into()));
/// assert_error_contains(result, "not open");
/// ```
pub fn assert_error_contains<T>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}', but got Ok", expected_msg),
        Err(e) => {
            let error_string = e.to_string();
            assert!(
                error_string.contains(expected_msg),
                "Expected error to contain '{}', but got: {}",
                expected_msg,
                error_string
            );
        }
    }
}

/// Assert that `result` failed because `xid` closed a wait-for cycle.
pub fn assert_deadlock<T: std::fmt::Debug>(result: DbResult<T>, xid: Xid) {
    match result {
        Err(DbError::Deadlock { xid: victim, .. }) if victim == xid => {}
        other => panic!("Expected deadlock for transaction {xid}, got {other:?}"),
    }
}

/// Assert that `result` failed because `xid` would have skipped a version.
pub fn assert_version_conflict<T: std::fmt::Debug>(result: DbResult<T>, xid: Xid) {
    match result {
        Err(DbError::VersionConflict { xid: victim, .. }) if victim == xid => {}
        other => panic!("Expected version conflict for {xid}, got {other:?}"),
    }
}

/// Assert that a new read-committed transaction reads `expected` at `uid`.
pub fn assert_visible(engine: &Engine, uid: Uid, expected: &[u8]) {
    let seen = read_fresh(engine, uid);
    assert_eq!(
        seen.as_deref(),
        Some(expected),
        "row {uid:#x}: expected {expected:?}, got {seen:?}"
    );
}

/// Assert that a new read-committed transaction does not see `uid`.
pub fn assert_invisible(engine: &Engine, uid: Uid) {
    let seen = read_fresh(engine, uid);
    assert!(
        seen.is_none(),
        "row {uid:#x} should be invisible, got {seen:?}"
    );
}

fn read_fresh(engine: &Engine, uid: Uid) -> Option<Vec<u8>> {
    let xid = engine
        .begin(IsolationLevel::ReadCommitted)
        .expect("begin failed");
    let seen = engine.read(xid, uid).expect("read failed");
    engine.commit(xid).expect("commit failed");
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_error_contains() {
        let result: DbResult<()> = Err(DbError::Index("index 0x9 is not open".into()));
        assert_error_contains(result, "not open");
    }

    #[test]
    #[should_panic(expected = "but got Ok")]
    fn test_assert_error_contains_no_error() {
        let result: DbResult<()> = Ok(());
        assert_error_contains(result, "some error");
    }

    #[test]
    fn test_assert_deadlock() {
        assert_deadlock::<()>(Err(DbError::Deadlock { xid: 3, uid: 9 }), 3);
    }

    #[test]
    #[should_panic(expected = "Expected deadlock")]
    fn test_assert_deadlock_wrong_victim() {
        assert_deadlock::<()>(Err(DbError::Deadlock { xid: 4, uid: 9 }), 3);
    }

    #[test]
    #[should_panic(expected = "Expected version conflict")]
    fn test_assert_version_conflict_on_ok() {
        assert_version_conflict(Ok(true), 1);
    }
}
