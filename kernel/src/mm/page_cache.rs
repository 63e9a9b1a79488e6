//! Per-inode page cache (C5).
//!
//! Maps a file's page index (`pgoff`) to the physical frame holding that
//! page's data. The cache itself does not know anything about inodes or
//! filesystems -- callers supply a `populate`/`writeback` closure that
//! reads/writes through to the backing `VfsNode` (see
//! [`crate::fs::dentry::Inode`], which owns one `PageCache` per inode and
//! drives `flush_all`/`drop_all` from its own `Drop` impl). This keeps `mm`
//! free of a hard dependency on `fs`, matching the rest of the module's
//! layering.
//!
//! Eviction is driven only by inode drop: there is no background LRU scan.
//! The data model (one entry per cached page, independently freeable)
//! doesn't preclude adding one later.

#![allow(dead_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::collections::BTreeMap;

use spin::Mutex;

use crate::mm::{phys_to_virt_addr, FrameNumber, FRAME_ALLOCATOR, PAGE_SIZE};

/// A single cached page: the frame holding its data, and whether that data
/// has been written since the last flush.
#[cfg(feature = "alloc")]
struct CachedPage {
    frame: FrameNumber,
    dirty: bool,
}

/// Page cache for a single inode.
#[cfg(feature = "alloc")]
pub struct PageCache {
    pages: Mutex<BTreeMap<usize, CachedPage>>,
}

#[cfg(feature = "alloc")]
impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "alloc")]
impl PageCache {
    pub const fn new() -> Self {
        Self {
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    /// Borrow the live byte contents of the frame backing `pgoff`. Only
    /// valid while holding `pages` locked, which every caller below does.
    fn page_bytes(frame: FrameNumber) -> &'static mut [u8] {
        let virt = phys_to_virt_addr(frame.as_u64() * PAGE_SIZE as u64) as *mut u8;
        // SAFETY: `frame` is owned by this cache via a frame-allocator
        // refcount, and the kernel's physical memory window covers it.
        unsafe { core::slice::from_raw_parts_mut(virt, PAGE_SIZE) }
    }

    /// Return the frame backing `pgoff`, populating it on a cache miss by
    /// calling `populate(buf)` (expected to behave like `VfsNode::getpage`:
    /// fill `buf` and return the number of bytes read).
    pub fn get_or_populate(
        &self,
        pgoff: usize,
        populate: impl FnOnce(&mut [u8]) -> Result<usize, &'static str>,
    ) -> Result<FrameNumber, &'static str> {
        let mut pages = self.pages.lock();
        if let Some(page) = pages.get(&pgoff) {
            return Ok(page.frame);
        }

        // allocate_frames already leaves the frame at refcount 1; that
        // allocation ref is this cache's sole ownership ref, same
        // convention as demand_paging's anonymous-fault path.
        let frame = FRAME_ALLOCATOR
            .lock()
            .allocate_frames(1)
            .map_err(|_| "ENOMEM: page cache frame allocation failed")?;

        let buf = Self::page_bytes(frame);
        buf.fill(0);
        if let Err(e) = populate(buf) {
            let _ = FRAME_ALLOCATOR.lock().unref_frames(frame, 1);
            return Err(e);
        }

        pages.insert(pgoff, CachedPage {
            frame,
            dirty: false,
        });
        Ok(frame)
    }

    /// Mark a cached page dirty (written to via a shared mapping or a
    /// buffered write). No-op if the page isn't cached.
    pub fn mark_dirty(&self, pgoff: usize) {
        if let Some(page) = self.pages.lock().get_mut(&pgoff) {
            page.dirty = true;
        }
    }

    /// Write back every dirty page via `writeback(pgoff, bytes)` (expected
    /// to behave like `VfsNode::writepage`), then clear the dirty bit.
    pub fn flush_all(&self, mut writeback: impl FnMut(usize, &[u8]) -> Result<usize, &'static str>) {
        let mut pages = self.pages.lock();
        for (&pgoff, page) in pages.iter_mut() {
            if !page.dirty {
                continue;
            }
            let buf = Self::page_bytes(page.frame);
            if writeback(pgoff, buf).is_ok() {
                page.dirty = false;
            }
        }
    }

    /// Release every cached frame (unref -- the frame allocator frees it
    /// once no other owner, e.g. an mmap, still holds a reference).
    /// Callers that need the data durable must `flush_all` first.
    pub fn drop_all(&self) {
        let mut pages = self.pages.lock();
        for (_, page) in pages.iter() {
            let _ = FRAME_ALLOCATOR.lock().unref_frames(page.frame, 1);
        }
        pages.clear();
    }

    /// Number of pages currently cached, for `/proc`-style accounting.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;

    #[test]
    fn populate_then_cache_hit_skips_populate() {
        let cache = PageCache::new();
        let mut populate_calls = 0;
        let frame1 = cache
            .get_or_populate(0, |buf| {
                populate_calls += 1;
                buf[0] = 7;
                Ok(buf.len())
            })
            .unwrap();
        let frame2 = cache.get_or_populate(0, |_| unreachable!()).unwrap();
        assert_eq!(frame1, frame2);
        assert_eq!(populate_calls, 1);
        cache.drop_all();
    }

    #[test]
    fn flush_only_writes_dirty_pages() {
        let cache = PageCache::new();
        cache.get_or_populate(0, |_| Ok(0)).unwrap();
        cache.get_or_populate(1, |_| Ok(0)).unwrap();
        cache.mark_dirty(1);

        let mut flushed = alloc::vec::Vec::new();
        cache.flush_all(|pgoff, _| {
            flushed.push(pgoff);
            Ok(0)
        });
        assert_eq!(flushed, alloc::vec![1]);
        cache.drop_all();
    }
}
