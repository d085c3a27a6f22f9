//! Generated log entries survive a trip through a real log file.

use proptest::prelude::*;
use testsupport::proptest_generators::arb_log_entry;
use wal::{LogEntry, Wal};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn generated_entries_scan_back_intact(
        entries in prop::collection::vec(arb_log_entry(), 0..24)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.log");
        let wal = Wal::create(&path).unwrap();
        for entry in &entries {
            wal.append(&entry.encode()).unwrap();
        }
        wal.close().unwrap();

        let scan = Wal::scan(&path).unwrap();
        prop_assert_eq!(scan.torn_bytes, 0);
        prop_assert_eq!(scan.stored_checksum, scan.computed_checksum);
        let decoded = scan
            .entries
            .iter()
            .map(|raw| LogEntry::decode(raw).unwrap())
            .collect::<Vec<_>>();
        prop_assert_eq!(decoded, entries);
    }
}
