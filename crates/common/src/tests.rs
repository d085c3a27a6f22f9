use super::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.name, "easydb");
    assert_eq!(cfg.page_cache_bytes, 64 << 20);
    assert_eq!(cfg.data_cache_items, 4096);
}

#[test]
fn builder_defaults_match_default_impl() {
    let built = Config::builder().build();
    let default = Config::default();
    assert_eq!(built.data_dir, default.data_dir);
    assert_eq!(built.name, default.name);
    assert_eq!(built.page_cache_bytes, default.page_cache_bytes);
}

#[test]
fn file_stem_joins_dir_and_name() {
    let cfg = Config::builder()
        .data_dir(PathBuf::from("/tmp/x"))
        .name("bank")
        .build();
    assert_eq!(cfg.file_stem(), PathBuf::from("/tmp/x/bank"));
    assert_eq!(cfg.file_path("log"), PathBuf::from("/tmp/x/bank.log"));
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("short read".into());
    assert!(format!("{err}").contains("storage"));

    let err = DbError::Deadlock { xid: 3, uid: 0x2_0000_0002 };
    assert_eq!(
        err.to_string(),
        "deadlock: transaction 3 waiting on record 0x200000002"
    );
}

#[test]
fn only_corruption_is_fatal() {
    assert!(DbError::Corruption("bad xid header".into()).is_fatal());
    assert!(!DbError::CacheFull.is_fatal());
    assert!(!DbError::TransactionAborted(4).is_fatal());
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn uid_layout_is_page_high_offset_low() {
    let uid = uid_from(3, 18);
    assert_eq!(uid, (3u64 << 32) | 18);
    assert_eq!(uid_page(uid), 3);
    assert_eq!(uid_offset(uid), 18);
}

proptest! {
    #[test]
    fn uid_roundtrips(page in any::<u32>(), offset in any::<u16>()) {
        let uid = uid_from(page, offset);
        prop_assert_eq!(uid_page(uid), page);
        prop_assert_eq!(uid_offset(uid), offset);
    }
}
