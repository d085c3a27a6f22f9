use super::*;
use common::SUPER_XID;
use pretty_assertions::assert_eq;
use std::{fs, path::Path};
use tempfile::{TempDir, tempdir};

fn config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir.to_path_buf())
        .name("t")
        .page_cache_bytes(1 << 20)
        .data_cache_items(64)
        .build()
}

struct Fixture {
    _dir: TempDir,
    cfg: Config,
    tm: TransactionStatusStore,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let tm = TransactionStatusStore::create(cfg.file_path("xid")).unwrap();
    Fixture { _dir: dir, cfg, tm }
}

fn read_payload(ds: &DataStore, uid: Uid) -> Option<Vec<u8>> {
    let item = ds.read(uid).unwrap()?;
    let data = item.data();
    ds.release(&item).unwrap();
    Some(data)
}

#[test]
fn first_record_lands_after_the_data_page_header() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let uid = ds.insert(SUPER_XID, b"hello").unwrap();
    assert_eq!(uid, uid_from(2, 2));
    assert_eq!(read_payload(&ds, uid), Some(b"hello".to_vec()));
    assert_eq!(ds.page_count(), 2);
}

#[test]
fn records_are_packed_and_spill_to_new_pages() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let payload = vec![7u8; 3000];
    let uids: Vec<Uid> = (0..3)
        .map(|_| ds.insert(SUPER_XID, &payload).unwrap())
        .collect();

    let pages: Vec<PageNo> = uids.iter().map(|&u| uid_page(u)).collect();
    assert_eq!(pages, vec![2, 2, 3]);
    assert_eq!(uid_offset(uids[1]), 2 + 3003);
    for uid in uids {
        assert_eq!(read_payload(&ds, uid).unwrap().len(), 3000);
    }
}

#[test]
fn oversized_records_are_rejected() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let err = ds
        .insert(SUPER_XID, &vec![0u8; record::MAX_PAYLOAD + 1])
        .unwrap_err();
    assert!(matches!(err, DbError::RecordTooLarge { .. }));

    let uid = ds.insert(SUPER_XID, &vec![1u8; record::MAX_PAYLOAD]).unwrap();
    assert_eq!(uid_offset(uid), 2);
}

#[test]
fn repeated_reads_share_one_item() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let uid = ds.insert(SUPER_XID, b"shared").unwrap();

    let a = ds.read(uid).unwrap().unwrap();
    let b = ds.read(uid).unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    ds.release(&a).unwrap();
    ds.release(&b).unwrap();
    assert!(ds.release(&a).is_err());
}

#[test]
fn after_modify_keeps_the_change_and_logs_both_images() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let uid = ds.insert(SUPER_XID, &[0u8; 8]).unwrap();

    let item = ds.read(uid).unwrap().unwrap();
    let mut guard = item.before_modify();
    guard.write(4, &[9, 9]);
    assert_eq!(guard.data(), vec![0, 0, 0, 0, 9, 9, 0, 0]);
    guard.after_modify(SUPER_XID).unwrap();
    assert_eq!(item.data(), vec![0, 0, 0, 0, 9, 9, 0, 0]);
    ds.release(&item).unwrap();

    let scan = Wal::scan(fx.cfg.file_path("log")).unwrap();
    let last = LogEntry::decode(scan.entries.last().unwrap()).unwrap();
    match last {
        LogEntry::Update { old, new, offset, .. } => {
            assert_eq!(offset, 2);
            assert_eq!(&old[3..], &[0u8; 8]);
            assert_eq!(&new[3..], &[0, 0, 0, 0, 9, 9, 0, 0]);
        }
        other => panic!("expected update entry, got {other:?}"),
    }
}

#[test]
fn rollback_and_drop_restore_the_old_image() {
    let fx = fixture();
    let ds = DataStore::create(&fx.cfg).unwrap();
    let uid = ds.insert(SUPER_XID, &[1u8; 4]).unwrap();
    let item = ds.read(uid).unwrap().unwrap();

    let mut guard = item.before_modify();
    guard.write(0, &[5]);
    guard.rollback();
    assert_eq!(item.data(), vec![1; 4]);

    {
        let mut guard = item.before_modify();
        guard.write(1, &[6, 6]);
    }
    assert_eq!(item.data(), vec![1; 4]);

    // The write lock is free again.
    item.before_modify().after_modify(SUPER_XID).unwrap();
    ds.release(&item).unwrap();
}

#[test]
fn clean_reopen_keeps_records_and_free_space() {
    let fx = fixture();
    let first = {
        let ds = DataStore::create(&fx.cfg).unwrap();
        let uid = ds.insert(SUPER_XID, b"persisted").unwrap();
        ds.close().unwrap();
        uid
    };

    let ds = DataStore::open(&fx.cfg, &fx.tm).unwrap();
    assert_eq!(read_payload(&ds, first), Some(b"persisted".to_vec()));
    let second = ds.insert(SUPER_XID, b"next").unwrap();
    assert_eq!(second, uid_from(2, 2 + 3 + 9));
    ds.close().unwrap();
}

#[test]
fn crash_redoes_committed_inserts() {
    let fx = fixture();
    let xid = fx.tm.begin().unwrap();
    let uid = {
        let ds = DataStore::create(&fx.cfg).unwrap();
        let uid = ds.insert(xid, b"durable").unwrap();
        fx.tm.commit(xid).unwrap();
        uid
    };

    // Lose the data page contents entirely.
    let pg = fx.cfg.file_path("pg");
    let mut raw = fs::read(&pg).unwrap();
    raw[PAGE_SIZE..].fill(0);
    fs::write(&pg, &raw).unwrap();

    let ds = DataStore::open(&fx.cfg, &fx.tm).unwrap();
    assert_eq!(read_payload(&ds, uid), Some(b"durable".to_vec()));
    // Free-space offset was restored too.
    assert_eq!(ds.insert(SUPER_XID, b"x").unwrap(), uid_from(2, 2 + 3 + 7));
}

#[test]
fn crash_undoes_active_transactions() {
    let fx = fixture();
    let committed = fx.tm.begin().unwrap();
    let crashed = fx.tm.begin().unwrap();
    let (kept, lost) = {
        let ds = DataStore::create(&fx.cfg).unwrap();
        let kept = ds.insert(committed, &[1, 1, 1, 1]).unwrap();
        fx.tm.commit(committed).unwrap();

        let lost = ds.insert(crashed, b"in flight").unwrap();
        let item = ds.read(kept).unwrap().unwrap();
        let mut guard = item.before_modify();
        guard.write(0, &[2, 2]);
        guard.after_modify(crashed).unwrap();
        ds.release(&item).unwrap();
        (kept, lost)
    };

    let ds = DataStore::open(&fx.cfg, &fx.tm).unwrap();
    assert_eq!(read_payload(&ds, kept), Some(vec![1, 1, 1, 1]));
    assert_eq!(read_payload(&ds, lost), None);
    assert!(fx.tm.is_aborted(crashed).unwrap());
    assert!(fx.tm.is_committed(committed).unwrap());
    ds.close().unwrap();
}

#[test]
fn clean_close_skips_recovery() {
    let fx = fixture();
    let xid = fx.tm.begin().unwrap();
    {
        let ds = DataStore::create(&fx.cfg).unwrap();
        ds.insert(xid, b"pending").unwrap();
        ds.close().unwrap();
    }
    let ds = DataStore::open(&fx.cfg, &fx.tm).unwrap();
    // Still active: nothing rolled it back.
    assert!(fx.tm.is_active(xid).unwrap());
    ds.close().unwrap();
}

#[test]
fn recovery_is_idempotent() {
    let fx = fixture();
    let committed = fx.tm.begin().unwrap();
    let crashed = fx.tm.begin().unwrap();
    {
        let ds = DataStore::create(&fx.cfg).unwrap();
        let uid = ds.insert(committed, &[3u8; 40]).unwrap();
        fx.tm.commit(committed).unwrap();
        ds.insert(crashed, &[4u8; 40]).unwrap();
        let item = ds.read(uid).unwrap().unwrap();
        let mut guard = item.before_modify();
        guard.write(10, &[8; 10]);
        guard.after_modify(crashed).unwrap();
        ds.release(&item).unwrap();
    }

    let run = || {
        let wal = Wal::open(fx.cfg.file_path("log")).unwrap();
        let pages = PageCache::open(fx.cfg.file_path("pg"), 16).unwrap();
        let stats = recovery::recover(&fx.tm, &wal, &pages).unwrap();
        pages.close().unwrap();
        (stats, fs::read(fx.cfg.file_path("pg")).unwrap())
    };

    let (first, after_first) = run();
    assert_eq!(first.aborted, vec![crashed]);
    assert_eq!(first.undone, 2);

    let (second, after_second) = run();
    assert!(second.aborted.is_empty());
    assert_eq!(second.undone, 0);
    assert_eq!(after_first, after_second);
}
