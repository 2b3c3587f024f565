//! The public allocation surface: `malloc`/`calloc`/`memalign`/`realloc`/
//! `free`, grounded on the bodies of the same names in
//! `examples/original_source/src/eAlloc.cpp`.
use core::ptr::NonNull;

use super::{Allocator, Pool};
use crate::block::{BlockHdr, ALIGN_SIZE, BLOCK_HEADER_OVERHEAD, MIN_BLOCK_SIZE};
use crate::error::TlsfError;
use crate::lock::{Lockable, WAIT_FOREVER};
use crate::mapping::BLOCK_SIZE_MAX;
use crate::pool::Policy;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Carve `adjusted` payload bytes out of `pool`, honoring `align` (which may
/// come from an explicit `memalign` request, a pool's configured
/// `preferred_alignment` floor, or both combined).
fn allocate_in_pool(pool: &mut Pool, adjusted: usize, align: usize) -> Option<NonNull<u8>> {
    if align <= ALIGN_SIZE {
        unsafe {
            let block = pool.control.locate_free(adjusted)?;
            Some(pool.control.prepare_used(block, adjusted))
        }
    } else {
        let gap_minimum = BLOCK_HEADER_OVERHEAD;
        let size_with_gap = adjust_request_size(adjusted + align + gap_minimum, ALIGN_SIZE)?;
        unsafe {
            let block = pool.control.locate_free(size_with_gap)?;
            let unaligned_ptr = BlockHdr::to_ptr(block).as_ptr() as usize;
            let mut aligned_ptr = align_up(unaligned_ptr, align);
            let mut gap = aligned_ptr - unaligned_ptr;
            if gap != 0 && gap < gap_minimum {
                let offset = (gap_minimum - gap).max(align);
                aligned_ptr = align_up(unaligned_ptr + offset, align);
                gap = aligned_ptr - unaligned_ptr;
            }
            let block = if gap != 0 {
                pool.control.trim_free_leading(block, gap)
            } else {
                block
            };
            Some(pool.control.prepare_used(block, adjusted))
        }
    }
}

/// Round `size` up to the allocator's granularity and clamp it to the
/// representable range, matching `adjust_request_size` in the reference
/// allocator. Returns `None` for a zero-sized request (the caller should
/// treat that as "no allocation needed", as `malloc(0)` historically does).
fn adjust_request_size(size: usize, align: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }
    let aligned = align_up(size, align.max(ALIGN_SIZE));
    if aligned >= BLOCK_SIZE_MAX {
        return None;
    }
    Some(aligned.max(MIN_BLOCK_SIZE))
}

impl<L: Lockable> Allocator<L> {
    /// Allocate `size` bytes from whichever registered pool is the best
    /// fit, requiring priority `>= min_priority` and policy `policy` on the
    /// first selection pass (see [`super::pools`]'s three-pass search).
    pub fn malloc_with(&mut self, size: usize, min_priority: u8, policy: Policy) -> Option<NonNull<u8>> {
        let adjusted = adjust_request_size(size, ALIGN_SIZE)?;
        self.allocate_adjusted(adjusted, min_priority, policy)
    }

    /// Allocate `size` bytes, accepting any registered pool.
    pub fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.malloc_with(size, 0, Policy::Default)
    }

    /// Allocate storage for `count` elements of `size` bytes each, zeroed.
    /// Returns `None` (rather than panicking) on `count * size` overflow,
    /// matching `eAlloc::calloc`'s overflow guard.
    pub fn calloc(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        if count != 0 && size > usize::MAX / count {
            return None;
        }
        let total = count * size;
        let ptr = self.malloc(total)?;
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, total);
        }
        Some(ptr)
    }

    /// Allocate `size` bytes with a payload address aligned to `align`
    /// (which must be a power of two).
    pub fn memalign(&mut self, align: usize, size: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() {
            return None;
        }
        if align <= ALIGN_SIZE {
            return self.malloc(size);
        }
        let adjusted = adjust_request_size(size, ALIGN_SIZE)?;
        let gap_minimum = BLOCK_HEADER_OVERHEAD;
        let size_with_gap = adjust_request_size(adjusted + align + gap_minimum, ALIGN_SIZE)?;

        if !self.lock.lock(WAIT_FOREVER) {
            return None;
        }
        let result = (|| {
            let index = self.select_pool(size_with_gap, 0, Policy::Default)?;
            let pool = self.pools[index].as_mut()?;
            // A pool may demand a stricter alignment than the caller asked
            // for; `preferred_alignment` is a floor, not a ceiling.
            let effective_align = align.max(pool.config.preferred_alignment);
            let ptr = allocate_in_pool(pool, adjusted, effective_align)?;
            pool.live_allocations += 1;
            self.alloc_count += 1;
            Some(ptr)
        })();
        self.lock.unlock();
        if result.is_some() {
            self.maybe_auto_defragment();
        }
        result
    }

    /// Reallocate the block at `ptr` (or allocate fresh if `ptr` is
    /// `None`) to `new_size` bytes, preserving the lesser of the old and
    /// new sizes worth of content. `new_size == 0` frees `ptr` and returns
    /// `None`, matching `eAlloc::realloc`.
    pub fn realloc(&mut self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        let ptr = match ptr {
            None => return self.malloc(new_size),
            Some(ptr) => ptr,
        };
        if new_size == 0 {
            let _ = self.free(ptr);
            return None;
        }
        let adjusted = adjust_request_size(new_size, ALIGN_SIZE)?;

        if !self.lock.lock(WAIT_FOREVER) {
            return None;
        }
        let result = unsafe {
            let block = BlockHdr::from_ptr(ptr);
            let pool = self.pool_owning(block)?;
            let cur_size = block.as_ref().get_size();
            if adjusted <= cur_size {
                pool.control.trim_used(block, adjusted);
                Some(ptr)
            } else {
                None
            }
        };
        self.lock.unlock();
        if result.is_some() {
            return result;
        }

        // Couldn't grow in place: copy to a fresh block.
        let new_ptr = self.malloc(new_size)?;
        unsafe {
            let block = BlockHdr::from_ptr(ptr);
            let old_size = block.as_ref().get_size() - BLOCK_HEADER_OVERHEAD;
            let copy_len = old_size.min(new_size);
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
        }
        let _ = self.free(ptr);
        Some(new_ptr)
    }

    /// Return the block at `ptr` to its owning pool's free-list index,
    /// coalescing with free neighbours. Fails with
    /// [`TlsfError::DoubleFree`] if the block is already marked free.
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), TlsfError> {
        if !self.lock.lock(WAIT_FOREVER) {
            return Err(TlsfError::InvalidArgument);
        }
        let result = unsafe {
            let block = BlockHdr::from_ptr(ptr);
            if block.as_ref().is_free() {
                log::error!("tlsf: double free detected");
                Err(TlsfError::DoubleFree)
            } else {
                match self.pool_owning(block) {
                    Some(pool) => {
                        let merged = pool.control.merge_prev(block);
                        let merged = pool.control.merge_next(merged);
                        BlockHdr::mark_as_free(merged);
                        pool.control.insert(merged);
                        pool.live_allocations -= 1;
                        Ok(())
                    }
                    None => Err(TlsfError::PoolNotFound),
                }
            }
        };
        self.lock.unlock();
        result
    }

    fn allocate_adjusted(
        &mut self,
        adjusted: usize,
        min_priority: u8,
        policy: Policy,
    ) -> Option<NonNull<u8>> {
        if !self.lock.lock(WAIT_FOREVER) {
            return None;
        }
        let mut result = self.try_allocate_from_any_pool(adjusted, min_priority, policy);
        self.lock.unlock();

        if result.is_none() {
            if let Some(handler) = self.failure_handler {
                if handler(adjusted, self.failure_handler_data).is_some() {
                    if !self.lock.lock(WAIT_FOREVER) {
                        return None;
                    }
                    result = self.try_allocate_from_any_pool(adjusted, min_priority, policy);
                    self.lock.unlock();
                }
            }
        }
        if result.is_some() {
            self.maybe_auto_defragment();
        }
        result
    }

    fn try_allocate_from_any_pool(
        &mut self,
        adjusted: usize,
        min_priority: u8,
        policy: Policy,
    ) -> Option<NonNull<u8>> {
        let index = self.select_pool(adjusted, min_priority, policy)?;
        let pool = self.pools[index].as_mut()?;
        let align = pool.config.preferred_alignment.max(ALIGN_SIZE);
        let ptr = allocate_in_pool(pool, adjusted, align)?;
        pool.live_allocations += 1;
        self.alloc_count += 1;
        Some(ptr)
    }

    /// The pool whose backing region contains `block`, if any.
    fn pool_owning(&mut self, block: NonNull<BlockHdr>) -> Option<&mut Pool> {
        let addr = block.as_ptr() as usize;
        self.pools.iter_mut().flatten().find(|pool| {
            let start = pool.base.as_ptr() as usize;
            let end = start + pool.size + BLOCK_HEADER_OVERHEAD;
            addr >= start && addr < end
        })
    }
}
