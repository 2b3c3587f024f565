//! Pool registration and the priority/policy pool-selection engine.
//!
//! `add_pool`/`remove_pool` are grounded directly on `eAlloc::add_pool`/
//! `remove_pool` (carving the leading free block and trailing used
//! sentinel out of a caller-supplied region, then compacting the pool
//! array on removal by swapping with the last live entry). The selection
//! passes below have no counterpart in that source — `spec.md` calls for
//! priority/policy-aware routing the original allocator never needed
//! because it only ever managed one implicit pool family.
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use super::{Allocator, Pool, MAX_POOL};
use crate::block::{BlockHdr, ALIGN_SIZE, BLOCK_HEADER_OVERHEAD, MIN_BLOCK_SIZE};
use crate::control::Control;
use crate::error::TlsfError;
use crate::lock::{Lockable, WAIT_FOREVER};
use crate::pool::{Policy, PoolConfig};

/// Overhead a pool's backing region loses to its leading block header and
/// trailing sentinel.
pub const POOL_OVERHEAD: usize = 2 * BLOCK_HEADER_OVERHEAD;

fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

fn align_up(value: usize, align: usize) -> usize {
    align_down(value + align - 1, align)
}

impl<L: Lockable> Allocator<L> {
    /// Register a new pool backed by `mem`, which must outlive the
    /// allocator (a `'static` borrow is the common embedded idiom: the
    /// region is usually a static array or a slice of memory the caller
    /// never reclaims).
    pub fn add_pool(
        &mut self,
        mem: &'static mut [MaybeUninit<u8>],
        config: PoolConfig,
    ) -> Result<usize, TlsfError> {
        if !self.lock.lock(WAIT_FOREVER) {
            return Err(TlsfError::InvalidArgument);
        }
        let result = self.add_pool_locked(mem, config);
        self.lock.unlock();
        result
    }

    fn add_pool_locked(
        &mut self,
        mem: &'static mut [MaybeUninit<u8>],
        config: PoolConfig,
    ) -> Result<usize, TlsfError> {
        if self.pool_count >= MAX_POOL {
            return Err(TlsfError::PoolFull);
        }
        if !config.preferred_alignment.is_power_of_two() {
            return Err(TlsfError::InvalidArgument);
        }

        let base_addr = mem.as_ptr() as usize;
        let aligned_addr = align_up(base_addr, ALIGN_SIZE);
        let lost_to_alignment = aligned_addr - base_addr;
        if mem.len() <= lost_to_alignment + POOL_OVERHEAD {
            return Err(TlsfError::InvalidArgument);
        }
        let usable = align_down(mem.len() - lost_to_alignment - POOL_OVERHEAD, ALIGN_SIZE);
        if usable < MIN_BLOCK_SIZE.max(config.min_block_size) {
            return Err(TlsfError::InvalidArgument);
        }

        let base = unsafe { NonNull::new_unchecked(aligned_addr as *mut u8) };
        let mut control = Control::new();
        unsafe {
            let lead = NonNull::new_unchecked(base.as_ptr() as *mut BlockHdr);
            (*lead.as_ptr()).size_and_flags = 0;
            (*lead.as_ptr()).prev_phys_block = None;
            (*lead.as_ptr()).set_size(usable);
            BlockHdr::mark_as_free(lead);
            control.insert(lead);
        }

        let index = self.next_free_slot();
        self.pools[index] = Some(Pool {
            base,
            size: usable,
            config,
            control,
            live_allocations: 0,
            lock: None,
        });
        self.pool_count += 1;
        Ok(index)
    }

    fn next_free_slot(&self) -> usize {
        self.pools
            .iter()
            .position(Option::is_none)
            .expect("pool_count tracked the array accurately")
    }

    /// Unregister the pool at `index`. Fails with [`TlsfError::PoolInUse`]
    /// if the pool still has outstanding allocations, matching
    /// `eAlloc::remove_pool`'s refusal to tear down a pool with live
    /// blocks.
    pub fn remove_pool(&mut self, index: usize) -> Result<(), TlsfError> {
        if !self.lock.lock(WAIT_FOREVER) {
            return Err(TlsfError::InvalidArgument);
        }
        let result = match self.pools.get(index) {
            None => Err(TlsfError::PoolNotFound),
            Some(None) => Err(TlsfError::PoolNotFound),
            Some(Some(pool)) if pool.live_allocations != 0 => Err(TlsfError::PoolInUse),
            Some(Some(_)) => {
                self.pools[index] = None;
                self.pool_count -= 1;
                Ok(())
            }
        };
        self.lock.unlock();
        result
    }

    /// Assign a per-pool [`Lockable`], used when
    /// [`Allocator::set_per_pool_locking`] is enabled.
    pub fn set_pool_lock(&mut self, index: usize, lock: &'static dyn Lockable) -> Result<(), TlsfError> {
        match self.pools.get_mut(index) {
            Some(Some(pool)) => {
                pool.lock = Some(lock);
                Ok(())
            }
            _ => Err(TlsfError::PoolNotFound),
        }
    }

    /// Grow or shrink the pool at `index` by delegating to the installed
    /// [`super::ResizeAllocationHandler`]. The handler is responsible for
    /// actually changing the backing region; this call only updates the
    /// bookkeeping once it reports success, and only ever shrinks/grows a
    /// pool that currently has no live allocations (a resize that must
    /// move memory out from under existing blocks isn't safe to do
    /// automatically).
    pub fn resize_pool(&mut self, index: usize, new_size: usize) -> Result<(), TlsfError> {
        let handler = self.resize_handler.ok_or(TlsfError::NoResizeHandler)?;
        let user_data = self.resize_handler_data;
        match self.pools.get(index) {
            None | Some(None) => return Err(TlsfError::PoolNotFound),
            Some(Some(pool)) if pool.live_allocations != 0 => return Err(TlsfError::PoolInUse),
            Some(Some(_)) => {}
        }
        if !handler(index, new_size, user_data) {
            return Err(TlsfError::OutOfMemory);
        }
        if let Some(Some(pool)) = self.pools.get_mut(index) {
            pool.size = new_size;
        }
        Ok(())
    }

    /// Three-pass priority/policy pool selection for a request of `size`
    /// bytes.
    ///
    /// Pass 1 ("strict") considers pools with `priority >= min_priority`
    /// whose `policy` matches (the policy filter is skipped entirely when
    /// `policy == Policy::Default`) and picks the one with the *maximum*
    /// `priority` among them; if that top pick can't actually service the
    /// request, every other pool meeting the same filter is tried next, in
    /// registration order. Pass 2 ("relaxed priority") repeats the same
    /// search with the priority requirement dropped. Pass 3 (fallback)
    /// iterates every pool in registration order and returns the first with
    /// enough room, ignoring policy and priority entirely.
    pub(crate) fn select_pool(
        &self,
        size: usize,
        min_priority: u8,
        policy: Policy,
    ) -> Option<usize> {
        let fits = |pool: &Pool| size >= pool.config.min_block_size && size <= pool.size;
        let matches = |pool: &Pool, require_priority: bool| {
            (!require_priority || pool.config.priority >= min_priority)
                && (policy == Policy::Default || pool.config.policy == policy)
        };

        let pass = |require_priority: bool| -> Option<usize> {
            let max_priority = self
                .pools
                .iter()
                .flatten()
                .filter(|p| matches(p, require_priority))
                .map(|p| p.config.priority)
                .max()?;

            self.pools
                .iter()
                .enumerate()
                .find(|(_, p)| {
                    p.as_ref()
                        .is_some_and(|p| matches(p, require_priority) && p.config.priority == max_priority && fits(p))
                })
                .or_else(|| {
                    self.pools.iter().enumerate().find(|(_, p)| {
                        p.as_ref().is_some_and(|p| {
                            matches(p, require_priority) && p.config.priority != max_priority && fits(p)
                        })
                    })
                })
                .map(|(index, _)| index)
        };

        pass(true).or_else(|| pass(false)).or_else(|| {
            self.pools
                .iter()
                .enumerate()
                .find(|(_, p)| p.as_ref().is_some_and(fits))
                .map(|(index, _)| index)
        })
    }
}
