//! Integrity checking and the block walker, grounded on `eAlloc::check`/
//! `walk_pool`/`default_walker` in the reference allocator.
use core::ptr::NonNull;

use super::{Allocator, Pool, Walker};
use crate::block::{BlockHdr, MIN_BLOCK_SIZE};
use crate::error::TlsfError;
use crate::lock::Lockable;

impl<L: Lockable> Allocator<L> {
    /// Verify every registered pool's free-list index is internally
    /// consistent. Returns `Ok(())` if clean, or the number of
    /// discrepancies found wrapped in [`TlsfError::IntegrityViolation`].
    pub fn check(&self) -> Result<(), TlsfError> {
        let mut failures = 0usize;
        for pool in self.pools.iter().flatten() {
            failures += pool.control.check();
        }
        if failures == 0 {
            Ok(())
        } else {
            log::warn!("tlsf: integrity check found {failures} discrepancies");
            Err(TlsfError::IntegrityViolation)
        }
    }

    /// Walk the pool at `index`'s physical block chain (not its free-list
    /// index — that's [`Self::check`]'s job) and verify the boundary-tag
    /// relationship between neighbours and each block's size coherence.
    pub fn check_pool(&self, index: usize) -> Result<(), TlsfError> {
        let pool = match self.pools.get(index) {
            Some(Some(pool)) => pool,
            _ => return Err(TlsfError::PoolNotFound),
        };
        if unsafe { check_physical_chain(pool) } == 0 {
            Ok(())
        } else {
            Err(TlsfError::IntegrityViolation)
        }
    }

    /// Walk every block of the pool at `index` in physical order, calling
    /// `walker(payload_ptr, size, is_free, user_data)` for each.
    pub fn walk_pool(&self, index: usize, walker: Walker, user_data: usize) -> Result<(), TlsfError> {
        let pool = match self.pools.get(index) {
            Some(Some(pool)) => pool,
            _ => return Err(TlsfError::PoolNotFound),
        };
        unsafe {
            let mut block = NonNull::new_unchecked(pool.base.as_ptr() as *mut BlockHdr);
            loop {
                let size = block.as_ref().get_size();
                if block.as_ref().is_last() {
                    break;
                }
                walker(BlockHdr::to_ptr(block), size, block.as_ref().is_free(), user_data);
                block = BlockHdr::next(block);
            }
        }
        Ok(())
    }
}

/// The boundary-tag relationship (invariant 1): a block's own `FREE` flag
/// and its physical successor's `PREV_FREE` flag must agree. Also checks
/// that every non-sentinel block meets the minimum size. Returns the
/// number of discrepancies found.
unsafe fn check_physical_chain(pool: &Pool) -> usize {
    let mut failures = 0usize;
    let mut block = NonNull::new_unchecked(pool.base.as_ptr() as *mut BlockHdr);
    loop {
        if block.as_ref().is_last() {
            break;
        }
        if block.as_ref().get_size() < MIN_BLOCK_SIZE {
            failures += 1;
        }
        let next = BlockHdr::next(block);
        if block.as_ref().is_free() != next.as_ref().is_prev_free() {
            failures += 1;
        }
        block = next;
    }
    failures
}
