use super::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn data_page(number: PageNo) -> Page {
    Page::new(number, data_page::initial())
}

#[test]
fn page_offsets_are_one_based() {
    assert_eq!(page_offset(1), 0);
    assert_eq!(page_offset(2), PAGE_SIZE as u64);
    assert_eq!(page_offset(10), 9 * PAGE_SIZE as u64);
}

#[test]
fn write_at_marks_page_dirty() {
    let page = Page::new(3, vec![0u8; PAGE_SIZE]);
    assert!(!page.is_dirty());
    page.write_at(10, &[1, 2, 3]);
    assert!(page.is_dirty());
    assert_eq!(page.read_at(10, 3), vec![1, 2, 3]);
}

#[test]
fn fresh_meta_page_is_not_clean_until_closed() {
    let page = Page::new(meta::META_PAGE, meta::initial());
    // Random open marker against an all-zero close marker.
    assert!(!meta::is_clean(&page));
    meta::stamp_close(&page);
    assert!(meta::is_clean(&page));
    meta::stamp_open(&page);
    assert!(!meta::is_clean(&page));
}

#[test]
fn new_data_page_has_header_only() {
    let page = data_page(2);
    assert_eq!(data_page::free_offset(&page), 2);
    assert_eq!(data_page::free_space(&page), data_page::MAX_FREE_SPACE);
}

#[test]
fn append_packs_records_back_to_back() {
    let page = data_page(2);
    let first = data_page::append(&page, &[7; 10]).unwrap();
    let second = data_page::append(&page, &[8; 5]).unwrap();
    assert_eq!(first, 2);
    assert_eq!(second, 12);
    assert_eq!(data_page::free_offset(&page), 17);
    assert_eq!(page.read_at(12, 5), vec![8; 5]);
    assert!(page.is_dirty());
}

#[test]
fn append_rejects_overflow() {
    let page = data_page(2);
    data_page::append(&page, &vec![1; data_page::MAX_FREE_SPACE - 4]).unwrap();
    let err = data_page::append(&page, &[0; 5]).unwrap_err();
    assert!(matches!(err, common::DbError::Storage(_)));
}

#[test]
fn recover_insert_only_moves_offset_forward() {
    let page = data_page(2);
    data_page::recover_insert(&page, 40, &[9; 8]).unwrap();
    assert_eq!(data_page::free_offset(&page), 48);

    // An earlier record replayed afterwards must not pull the offset back.
    data_page::recover_insert(&page, 2, &[5; 4]).unwrap();
    assert_eq!(data_page::free_offset(&page), 48);
    assert_eq!(page.read_at(2, 4), vec![5; 4]);
}

#[test]
fn recover_update_overwrites_in_place() {
    let page = data_page(2);
    let at = data_page::append(&page, &[1, 1, 1, 1]).unwrap();
    data_page::recover_update(&page, at, &[2, 2, 2, 2]).unwrap();
    assert_eq!(page.read_at(at as usize, 4), vec![2, 2, 2, 2]);
    assert_eq!(data_page::free_offset(&page), 6);
}

#[test]
fn recover_rejects_out_of_page_entries() {
    let page = data_page(2);
    let err = data_page::recover_insert(&page, (PAGE_SIZE - 2) as u16, &[0; 8]).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn checkout_returns_none_when_empty() {
    let index = FreeSpaceIndex::new();
    assert!(index.checkout(10).is_none());
}

#[test]
fn checkout_removes_the_page() {
    let index = FreeSpaceIndex::new();
    index.record(4, 3000);
    assert_eq!(index.checkout(100), Some(PageInfo { page: 4, free: 3000 }));
    assert!(index.checkout(100).is_none());
    assert!(index.is_empty());
}

#[test]
fn checkout_skips_the_bucket_needed_falls_in() {
    let index = FreeSpaceIndex::new();
    // 250 and 300 share a bucket; 250 must not satisfy a request for 300.
    index.record(2, 250);
    assert!(index.checkout(300).is_none());
    assert_eq!(index.len(), 1);
}

#[test]
fn empty_pages_satisfy_largest_request() {
    let index = FreeSpaceIndex::new();
    index.record(2, data_page::MAX_FREE_SPACE);
    let info = index.checkout(data_page::MAX_FREE_SPACE).unwrap();
    assert_eq!(info.page, 2);
}

#[test]
fn every_recorded_page_comes_back_once() {
    let index = FreeSpaceIndex::new();
    for page in 1..=20u32 {
        index.record(page, page as usize * 400);
    }
    let mut seen = Vec::new();
    while let Some(info) = index.checkout(1) {
        seen.push(info.page);
    }
    seen.sort_unstable();
    assert_eq!(seen, (1..=20).collect::<Vec<_>>());
}

proptest! {
    #[test]
    fn checkout_honours_requested_size(needed in 0usize..8000) {
        let index = FreeSpaceIndex::new();
        for page in 1..=20u32 {
            index.record(page, page as usize * 400);
        }
        if let Some(info) = index.checkout(needed) {
            prop_assert!(info.free >= needed);
            prop_assert_eq!(info.free, info.page as usize * 400);
        }
    }
}
