//! The segregated free-list index and the block-shaping operations built on
//! top of it: everything needed to locate a free block for an allocation
//! request and to split/merge blocks as allocations come and go.
//!
//! Grounded on `Control`/`SecondLevel` and the free-list/shaping functions
//! in the reference allocator's `tlsf.hpp`, reworked around `Option<NonNull<_>>`
//! links in the style of the teacher's `Tlsf` rather than the original's
//! `block_null` sentinel node — a plain `None` plays the same role with less
//! unsafe surface.
use core::ptr::NonNull;

use crate::bits::{ffs, ffs_from, fls};
use crate::block::{BlockHdr, FreeBlockHdr, BLOCK_HEADER_OVERHEAD, MIN_BLOCK_SIZE};
use crate::mapping::{mapping_insert, mapping_search, FL_INDEX_COUNT, SLI_COUNT};

#[derive(Clone, Copy)]
pub(crate) struct SecondLevel {
    pub sl_bitmap: u32,
    pub shelves: [Option<NonNull<FreeBlockHdr>>; SLI_COUNT],
}

impl SecondLevel {
    const EMPTY: Self = SecondLevel {
        sl_bitmap: 0,
        shelves: [None; SLI_COUNT],
    };
}

/// The free-list index for a single pool's worth of memory.
///
/// `unsafe impl Send` is intentionally absent here: a `Control` holds raw
/// pointers into caller-owned memory and is always reached through a
/// [`crate::lock::Lockable`]-guarded [`crate::allocator::Allocator`], which
/// is where the `Send`/`Sync` story belongs.
pub(crate) struct Control {
    pub fl_bitmap: u32,
    pub cabinets: [SecondLevel; FL_INDEX_COUNT],
}

impl Control {
    pub(crate) const fn new() -> Self {
        Control {
            fl_bitmap: 0,
            cabinets: [SecondLevel::EMPTY; FL_INDEX_COUNT],
        }
    }

    /// Insert `block` (already sized and flagged free) into the index at
    /// the list determined by its own size.
    ///
    /// # Safety
    /// `block` must be a live, free block not already indexed.
    pub(crate) unsafe fn insert(&mut self, block: NonNull<BlockHdr>) {
        let size = block.as_ref().get_size();
        let (fl, sl) = mapping_insert(size);
        self.insert_free_block(block.cast(), fl, sl);
    }

    /// Remove `block` from the index, given the `(fl, sl)` coordinates it
    /// was inserted at (callers track these, or recompute via
    /// [`mapping_insert`] on the block's current size).
    ///
    /// # Safety
    /// `block` must currently be linked at `(fl, sl)`.
    pub(crate) unsafe fn remove(&mut self, block: NonNull<BlockHdr>, fl: usize, sl: usize) {
        self.remove_free_block(block.cast(), fl, sl);
    }

    unsafe fn insert_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, fl: usize, sl: usize) {
        let cabinet = &mut self.cabinets[fl];
        let head = cabinet.shelves[sl];
        block.as_mut().next_free = head;
        block.as_mut().prev_free = None;
        if let Some(mut head) = head {
            head.as_mut().prev_free = Some(block);
        }
        cabinet.shelves[sl] = Some(block);
        cabinet.sl_bitmap |= 1 << sl;
        self.fl_bitmap |= 1 << fl;
    }

    unsafe fn remove_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, fl: usize, sl: usize) {
        let prev = block.as_ref().prev_free;
        let next = block.as_ref().next_free;
        if let Some(mut prev) = prev {
            prev.as_mut().next_free = next;
        }
        if let Some(mut next) = next {
            next.as_mut().prev_free = prev;
        }
        let cabinet = &mut self.cabinets[fl];
        if cabinet.shelves[sl] == Some(block) {
            cabinet.shelves[sl] = next;
            if next.is_none() {
                cabinet.sl_bitmap &= !(1 << sl);
                if cabinet.sl_bitmap == 0 {
                    self.fl_bitmap &= !(1 << fl);
                }
            }
        }
        block.as_mut().next_free = None;
        block.as_mut().prev_free = None;
    }

    /// Find the smallest non-empty list that is guaranteed to satisfy a
    /// request mapped to `(fl, sl)`, advancing to larger lists as needed.
    fn search_suitable_block(&self, fl: usize, sl: usize) -> Option<(usize, usize)> {
        let sl_map = self.cabinets[fl].sl_bitmap;
        if let Some(sl) = ffs_from(sl_map, sl as u32) {
            return Some((fl, sl as usize));
        }
        let fl_map = ffs_from(self.fl_bitmap, fl as u32 + 1)?;
        let fl = fl_map as usize;
        let sl = ffs(self.cabinets[fl].sl_bitmap)?;
        Some((fl, sl as usize))
    }

    /// Locate and unlink a free block able to satisfy `size` bytes of
    /// payload, returning the block still flagged free (caller finishes the
    /// transition via [`Self::prepare_used`]).
    ///
    /// # Safety
    /// The index must be internally consistent (every listed block really
    /// is free and really belongs at its `(fl, sl)`).
    pub(crate) unsafe fn locate_free(&mut self, size: usize) -> Option<NonNull<BlockHdr>> {
        let (fl, sl) = mapping_search(size);
        let (fl, sl) = self.search_suitable_block(fl, sl)?;
        let block = self.cabinets[fl].shelves[sl]?;
        self.remove_free_block(block, fl, sl);
        Some(block.cast())
    }

    /// Trim a located free block down to `size` bytes of payload, mark it
    /// used, and return the user pointer.
    ///
    /// # Safety
    /// `block` must be a free block (not yet indexed, as returned by
    /// [`Self::locate_free`]) at least `size` bytes.
    pub(crate) unsafe fn prepare_used(
        &mut self,
        block: NonNull<BlockHdr>,
        size: usize,
    ) -> NonNull<u8> {
        self.trim_free(block, size);
        BlockHdr::mark_as_used(block);
        BlockHdr::to_ptr(block)
    }

    /// Split `block` if the remainder after carving out `size` bytes of
    /// payload is large enough to stand on its own, re-inserting the
    /// remainder into the index.
    ///
    /// # Safety
    /// `block` must be free and not indexed; `size <= block`'s current size.
    unsafe fn trim_free(&mut self, block: NonNull<BlockHdr>, size: usize) {
        if !Self::can_split(block, size) {
            return;
        }
        let remaining = Self::split(block, size);
        let next = BlockHdr::link_next(remaining);
        let remaining = if (*next.as_ptr()).is_free() {
            self.merge_neighbour_into(remaining, next)
        } else {
            remaining
        };
        BlockHdr::mark_as_free(remaining);
        self.insert(remaining);
    }

    /// Shrink a used block in place after a `realloc`, inserting the
    /// freed tail (merged with a free successor, if any) back into the
    /// index.
    ///
    /// # Safety
    /// `block` must be used, currently sized larger than `size` by at
    /// least [`MIN_BLOCK_SIZE`].
    pub(crate) unsafe fn trim_used(&mut self, block: NonNull<BlockHdr>, size: usize) {
        if !Self::can_split(block, size) {
            return;
        }
        let mut remaining = Self::split(block, size);
        // `block` stays used throughout this call, so the remainder's
        // PREV_FREE must be cleared explicitly: split() carves the new
        // header out of what was live payload, and set_size only preserves
        // whatever flag bits happened to already be sitting in that memory.
        remaining.as_mut().set_prev_used();
        let next = BlockHdr::link_next(remaining);
        let remaining = if (*next.as_ptr()).is_free() {
            let (fl, sl) = mapping_insert(next.as_ref().get_size());
            self.remove(next, fl, sl);
            Self::absorb(remaining, next)
        } else {
            remaining
        };
        BlockHdr::mark_as_free(remaining);
        self.insert(remaining);
    }

    /// Carve `size` bytes off the *front* of a free block, re-indexing the
    /// leading remainder. Used by `memalign` to align a carved-out block.
    ///
    /// # Safety
    /// `block` must be free, not indexed, and large enough that the split
    /// leaves a conforming tail.
    pub(crate) unsafe fn trim_free_leading(
        &mut self,
        block: NonNull<BlockHdr>,
        size: usize,
    ) -> NonNull<BlockHdr> {
        let mut remaining = block;
        if Self::can_split(block, size) {
            remaining = Self::split(block, size - BLOCK_HEADER_OVERHEAD);
            BlockHdr::link_next(block);
            BlockHdr::mark_as_free(block);
            self.insert(block);
        }
        remaining
    }

    /// `true` if splitting `block` at `size` bytes of payload leaves a
    /// remainder big enough to be its own block.
    fn can_split(block: NonNull<BlockHdr>, size: usize) -> bool {
        unsafe { block.as_ref().get_size() >= size + BLOCK_HEADER_OVERHEAD + MIN_BLOCK_SIZE }
    }

    /// Carve a new block of `size` payload bytes off the front of `block`,
    /// returning the header of the remainder (unlinked, not yet flagged).
    ///
    /// # Safety
    /// `Self::can_split(block, size)` must hold.
    unsafe fn split(block: NonNull<BlockHdr>, size: usize) -> NonNull<BlockHdr> {
        let total = block.as_ref().get_size();
        let remaining_size = total - size - BLOCK_HEADER_OVERHEAD;
        let mut remaining = NonNull::new_unchecked(
            (BlockHdr::to_ptr(block).as_ptr() as *mut u8).add(size) as *mut BlockHdr,
        );
        remaining.as_mut().set_size(remaining_size);
        (*block.as_ptr()).set_size(size);
        remaining
    }

    /// Merge `next` (which must immediately follow `prev` physically) into
    /// `prev`, returning the combined block header.
    ///
    /// # Safety
    /// `next` must equal `BlockHdr::next(prev)` and must already be
    /// unlinked from any free list.
    unsafe fn absorb(prev: NonNull<BlockHdr>, next: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        let combined = prev.as_ref().get_size() + next.as_ref().get_size() + BLOCK_HEADER_OVERHEAD;
        let mut prev = prev;
        prev.as_mut().set_size(combined);
        BlockHdr::link_next(prev);
        prev
    }

    unsafe fn merge_neighbour_into(
        &mut self,
        block: NonNull<BlockHdr>,
        next: NonNull<BlockHdr>,
    ) -> NonNull<BlockHdr> {
        let (fl, sl) = mapping_insert(next.as_ref().get_size());
        self.remove(next, fl, sl);
        Self::absorb(block, next)
    }

    /// Merge `block` with its physically-previous block if that block is
    /// free, returning the (possibly merged) block header.
    ///
    /// # Safety
    /// `block` must be a valid header with an accurate `PREV_FREE` flag.
    pub(crate) unsafe fn merge_prev(&mut self, block: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        if !block.as_ref().is_prev_free() {
            return block;
        }
        let prev = BlockHdr::prev(block);
        let (fl, sl) = mapping_insert(prev.as_ref().get_size());
        self.remove(prev, fl, sl);
        Self::absorb(prev, block)
    }

    /// Merge `block` with its physically-next block if that block is free
    /// (and not the pool's trailing sentinel).
    ///
    /// # Safety
    /// `block` must be a valid, non-sentinel header.
    pub(crate) unsafe fn merge_next(&mut self, block: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        let next = BlockHdr::next(block);
        if next.as_ref().is_last() || !next.as_ref().is_free() {
            return block;
        }
        let (fl, sl) = mapping_insert(next.as_ref().get_size());
        self.remove(next, fl, sl);
        Self::absorb(block, next)
    }

    /// Verify every bitmap bit and free-list head is internally consistent.
    /// Returns the number of discrepancies found (0 means clean).
    pub(crate) fn check(&self) -> usize {
        let mut failures = 0usize;
        for fl in 0..FL_INDEX_COUNT {
            let cabinet = &self.cabinets[fl];
            for sl in 0..SLI_COUNT {
                let list_non_empty = cabinet.shelves[sl].is_some();
                let bit_set = cabinet.sl_bitmap & (1 << sl) != 0;
                if list_non_empty != bit_set {
                    failures += 1;
                }
                let mut node = cabinet.shelves[sl];
                let mut prev: Option<NonNull<FreeBlockHdr>> = None;
                while let Some(n) = node {
                    unsafe {
                        let hdr = &n.as_ref().common;
                        if !hdr.is_free() {
                            failures += 1;
                        }
                        if hdr.get_size() < MIN_BLOCK_SIZE {
                            failures += 1;
                        }
                        let (efl, esl) = mapping_insert(hdr.get_size());
                        if (efl, esl) != (fl, sl) {
                            failures += 1;
                        }
                        if n.as_ref().prev_free != prev {
                            failures += 1;
                        }
                        prev = Some(n);
                        node = n.as_ref().next_free;
                    }
                }
            }
            let cabinet_non_empty = cabinet.sl_bitmap != 0;
            let fl_bit_set = self.fl_bitmap & (1 << fl) != 0;
            if cabinet_non_empty != fl_bit_set {
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::MaybeUninit;

    unsafe fn make_block(mem: &mut [MaybeUninit<u8>], size: usize) -> NonNull<BlockHdr> {
        let ptr = mem.as_mut_ptr() as *mut BlockHdr;
        (*ptr).size_and_flags = 0;
        (*ptr).prev_phys_block = None;
        (*ptr).set_size(size);
        NonNull::new_unchecked(ptr)
    }

    #[test]
    fn insert_then_locate_round_trips() {
        let mut mem = [MaybeUninit::<u8>::uninit(); 512];
        unsafe {
            let block = make_block(&mut mem, 256);
            (*block.as_ptr()).set_free();
            let mut control = Control::new();
            control.insert(block);
            assert_eq!(control.check(), 0);
            let found = control.locate_free(64).expect("block should be found");
            assert_eq!(found, block);
            assert_eq!(control.check(), 0);
        }
    }

    #[test]
    fn locate_on_empty_index_returns_none() {
        let mut control = Control::new();
        unsafe {
            assert!(control.locate_free(64).is_none());
        }
    }
}
