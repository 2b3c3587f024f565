//! Defragmentation.
//!
//! Invariant 2 (no two physically-adjacent blocks are ever both free,
//! since `free` always coalesces eagerly) means that under normal
//! operation there is nothing for `defragment` to do — adjacent free
//! blocks only exist transiently inside a single `free`/`realloc` call,
//! never between calls. This method exists for completeness and for the
//! case where a future caller of `walk_pool`/direct pool manipulation
//! leaves the invariant temporarily violated; it returns the count of
//! merges actually performed rather than assuming there's always
//! something to find.
use core::ptr::NonNull;

use super::Allocator;
use crate::block::BlockHdr;
use crate::control::Control;
use crate::lock::Lockable;

impl<L: Lockable> Allocator<L> {
    /// Scan every pool's physical block chain for adjacent free blocks and
    /// merge them. Returns the number of merges performed; `0` means the
    /// free-list index was already maximally coalesced.
    pub fn defragment(&mut self) -> usize {
        if !self.lock.lock(crate::lock::WAIT_FOREVER) {
            return 0;
        }
        let mut merges = 0usize;
        for pool in self.pools.iter_mut().flatten() {
            merges += unsafe { defragment_pool(&mut pool.control, pool.base) };
        }
        self.lock.unlock();
        merges
    }

    /// Called after every successful allocation. Every 10th allocation,
    /// checks the aggregate fragmentation factor against the configured
    /// threshold and triggers a `defragment()` pass if it's exceeded.
    /// No-op unless `set_auto_defragment(true, _)` was called.
    pub(crate) fn maybe_auto_defragment(&mut self) {
        if !self.auto_defragment {
            return;
        }
        if self.alloc_count == 0 || self.alloc_count % 10 != 0 {
            return;
        }
        if self.report().fragmentation_factor > self.defragment_threshold {
            self.defragment();
        }
    }
}

unsafe fn defragment_pool(control: &mut Control, base: NonNull<u8>) -> usize {
    let mut merges = 0usize;
    let mut block = NonNull::new_unchecked(base.as_ptr() as *mut BlockHdr);
    loop {
        if block.as_ref().is_last() {
            break;
        }
        let next = BlockHdr::next(block);
        if block.as_ref().is_free() && !next.as_ref().is_last() && next.as_ref().is_free() {
            let (fl, sl) = crate::mapping::mapping_insert(block.as_ref().get_size());
            control.remove(block, fl, sl);
            let merged = control.merge_next(block);
            BlockHdr::mark_as_free(merged);
            control.insert(merged);
            merges += 1;
            block = merged;
            continue;
        }
        if next.as_ref().is_last() {
            break;
        }
        block = next;
    }
    merges
}
