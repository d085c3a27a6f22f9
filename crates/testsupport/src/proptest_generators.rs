//! Property-based test generators using proptest.

use common::{PageNo, Xid};
use proptest::prelude::*;
use wal::LogEntry;

/// Row payloads from empty up to a few hundred bytes.
pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Index keys clustered enough to produce duplicates.
pub fn arb_index_keys(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000i64..1_000, 0..max_len)
}

/// Log entries with realistic page numbers and in-page offsets.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_log_entry;
/// use wal::LogEntry;
///
/// proptest! {
///     #[test]
///     fn entries_decode(entry in arb_log_entry()) {
///         prop_assert_eq!(LogEntry::decode(&entry.encode()).unwrap(), entry);
///     }
/// }
/// ```
pub fn arb_log_entry() -> impl Strategy<Value = LogEntry> {
    let xid = any::<Xid>();
    let page = 2..1_000 as PageNo;
    let offset = 2..8_000u16;
    prop_oneof![
        (xid.clone(), page.clone(), offset.clone(), arb_payload()).prop_map(
            |(xid, page, offset, raw)| LogEntry::Insert {
                xid,
                page,
                offset,
                raw,
            }
        ),
        (xid, page, offset, arb_payload()).prop_map(|(xid, page, offset, old)| {
            let new = old.iter().map(|b| b.wrapping_add(1)).collect();
            LogEntry::Update {
                xid,
                page,
                offset,
                old,
                new,
            }
        }),
    ]
}
