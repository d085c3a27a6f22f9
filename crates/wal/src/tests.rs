use super::*;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;

fn read_all(wal: &Wal) -> Vec<Vec<u8>> {
    wal.rewind();
    let mut out = Vec::new();
    while let Some(payload) = wal.next().unwrap() {
        out.push(payload);
    }
    out
}

#[test]
fn checksum_is_signed_polynomial() {
    assert_eq!(checksum(0, &[]), 0);
    assert_eq!(checksum(0, &[1, 2]), 713);
    assert_eq!(checksum(0, &[0xFF]), -1);
    // Folding in two steps equals folding once.
    assert_eq!(
        checksum(checksum(0, &[1, 2]), &[3]),
        checksum(0, &[1, 2, 3])
    );
}

#[test]
fn append_and_reopen_roundtrips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");

    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; i as usize + 1]).collect();
    {
        let wal = Wal::create(&path).unwrap();
        for p in &payloads {
            wal.append(p).unwrap();
        }
        wal.close().unwrap();
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(read_all(&wal), payloads);
}

#[test]
fn header_tracks_rolling_checksum() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    let wal = Wal::create(&path).unwrap();
    assert_eq!(wal.checksum(), 0);
    wal.append(b"abc").unwrap();
    wal.append(b"de").unwrap();

    let raw = fs::read(&path).unwrap();
    let stored = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    assert_eq!(stored, wal.checksum());
    assert_eq!(stored, checksum(0, &raw[4..]));
}

#[test]
fn torn_tail_is_dropped_on_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    {
        let wal = Wal::create(&path).unwrap();
        wal.append(b"first").unwrap();
        wal.append(b"second").unwrap();
        wal.append(b"third entry").unwrap();
    }
    let full = fs::metadata(&path).unwrap().len();
    // Chop the last entry mid-payload.
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 4).unwrap();
    drop(file);

    let wal = Wal::open(&path).unwrap();
    assert_eq!(read_all(&wal), vec![b"first".to_vec(), b"second".to_vec()]);
    let expected_len = 4 + (8 + 5) + (8 + 6);
    assert_eq!(fs::metadata(&path).unwrap().len(), expected_len);

    // Appending after the cut lines up with the surviving entries.
    wal.append(b"fourth").unwrap();
    drop(wal);
    let wal = Wal::open(&path).unwrap();
    assert_eq!(read_all(&wal).len(), 3);
}

#[test]
fn torn_header_of_entry_is_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    {
        let wal = Wal::create(&path).unwrap();
        wal.append(b"kept").unwrap();
    }
    let mut raw = fs::read(&path).unwrap();
    raw.extend_from_slice(&[0, 0, 0]);
    fs::write(&path, &raw).unwrap();

    let wal = Wal::open(&path).unwrap();
    assert_eq!(read_all(&wal), vec![b"kept".to_vec()]);
}

#[test]
fn corrupt_entry_ends_the_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    {
        let wal = Wal::create(&path).unwrap();
        wal.append(b"good").unwrap();
        wal.append(b"flipped").unwrap();
    }
    let mut raw = fs::read(&path).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x40;
    fs::write(&path, &raw).unwrap();

    let scan = Wal::scan(&path).unwrap();
    assert_eq!(scan.entries, vec![b"good".to_vec()]);
    assert_eq!(scan.torn_bytes, 8 + 7);
    assert_ne!(scan.stored_checksum, scan.computed_checksum);

    let wal = Wal::open(&path).unwrap();
    assert_eq!(read_all(&wal), vec![b"good".to_vec()]);
}

#[test]
fn scan_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    {
        let wal = Wal::create(&path).unwrap();
        wal.append(b"one").unwrap();
    }
    let mut raw = fs::read(&path).unwrap();
    raw.push(1);
    fs::write(&path, &raw).unwrap();

    let scan = Wal::scan(&path).unwrap();
    assert_eq!(scan.torn_bytes, 1);
    assert_eq!(scan.stored_checksum, scan.computed_checksum);
    assert_eq!(fs::read(&path).unwrap(), raw);
}

#[test]
fn next_does_not_advance_past_the_end() {
    let dir = tempdir().unwrap();
    let wal = Wal::create(dir.path().join("t.log")).unwrap();
    wal.append(b"x").unwrap();
    wal.rewind();
    assert!(wal.next().unwrap().is_some());
    assert!(wal.next().unwrap().is_none());
    assert!(wal.next().unwrap().is_none());
}

#[test]
fn create_refuses_existing_and_short_files_are_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    fs::write(&path, [0u8; 2]).unwrap();
    assert!(Wal::create(&path).is_err());
    let err = Wal::open(&path).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn insert_entry_layout() {
    let entry = LogEntry::Insert {
        xid: 5,
        page: 3,
        offset: 18,
        raw: vec![6, 0, 1, 9],
    };
    let bytes = entry.encode();
    assert_eq!(
        bytes,
        vec![1, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 3, 0, 18, 6, 0, 1, 9]
    );
    assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
    assert_eq!(entry.uid(), common::uid_from(3, 18));
}

#[test]
fn update_entry_splits_images_at_midpoint() {
    let entry = LogEntry::Update {
        xid: 9,
        page: 2,
        offset: 2,
        old: vec![1, 2, 3],
        new: vec![4, 5, 6],
    };
    let decoded = LogEntry::decode(&entry.encode()).unwrap();
    assert_eq!(decoded, entry);
    assert_eq!(decoded.xid(), 9);
}

#[test]
fn malformed_entries_are_rejected() {
    assert!(LogEntry::decode(&[1, 0, 0]).is_err());

    let mut unknown = LogEntry::Insert {
        xid: 1,
        page: 2,
        offset: 2,
        raw: vec![],
    }
    .encode();
    unknown[0] = 7;
    assert!(LogEntry::decode(&unknown).is_err());

    let mut odd = LogEntry::Update {
        xid: 1,
        page: 2,
        offset: 2,
        old: vec![1],
        new: vec![2],
    }
    .encode();
    odd.push(3);
    assert!(LogEntry::decode(&odd).is_err());
}
