use crate::PAGE_SIZE;
use common::PageNo;
use parking_lot::Mutex;

const INTERVALS: usize = 40;
const BUCKET_SIZE: usize = PAGE_SIZE / INTERVALS;

/// A page handed out by [`FreeSpaceIndex::checkout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub page: PageNo,
    pub free: usize,
}

/// Buckets data pages by free space so an insert can pick a page with room
/// in a single upward scan.
///
/// A page lives in at most one bucket at a time: `checkout` removes it and
/// the caller must `record` it again once it knows the page's new free space.
#[derive(Debug)]
pub struct FreeSpaceIndex {
    // Bucket i holds pages with free space in [i * BUCKET_SIZE, (i + 1) * BUCKET_SIZE).
    // The extra bucket at INTERVALS holds completely empty pages.
    buckets: Mutex<Vec<Vec<PageInfo>>>,
}

impl Default for FreeSpaceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeSpaceIndex {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![Vec::new(); INTERVALS + 1]),
        }
    }

    pub fn record(&self, page: PageNo, free: usize) {
        let bucket = (free / BUCKET_SIZE).min(INTERVALS);
        self.buckets.lock()[bucket].push(PageInfo { page, free });
    }

    /// Removes and returns a page with at least `needed` free bytes.
    pub fn checkout(&self, needed: usize) -> Option<PageInfo> {
        let mut start = needed / BUCKET_SIZE;
        // Bucket membership only bounds free space from below, so skip the
        // bucket `needed` falls in.
        if start < INTERVALS {
            start += 1;
        }
        let mut buckets = self.buckets.lock();
        for bucket in buckets.iter_mut().skip(start) {
            if let Some(pos) = bucket.iter().position(|info| info.free >= needed) {
                return Some(bucket.remove(pos));
            }
        }
        None
    }

    /// Number of pages currently recorded.
    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
