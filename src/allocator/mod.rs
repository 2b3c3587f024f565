//! The multi-pool façade: the public surface callers actually touch.
//!
//! One [`Allocator`] fronts up to `MAX_POOL` independently-owned memory
//! regions. Each [`Pool`] keeps its own [`Control`] (its own segregated
//! free-list index), so the façade's job is purely about *which* pool a
//! request should be served from — the single-pool mechanics live in
//! [`crate::control`].
//!
//! Grounded on `eAlloc` (`examples/original_source/src/eAlloc.hpp`/`.cpp`)
//! for the pool registry, failure/resize hooks, and public API shape; the
//! priority/policy selection pass itself is a `spec.md`-only extension not
//! present in that source (see `DESIGN.md`).
mod api;
mod defrag;
mod integrity;
mod pools;
mod report;

pub use report::StorageReport;

use core::ptr::NonNull;

use crate::control::Control;
use crate::lock::{Lockable, NoopLock};
use crate::pool::PoolConfig;

/// Maximum number of pools a single [`Allocator`] may register.
pub const MAX_POOL: usize = 5;

/// Called when no pool can satisfy a request. Returning `Some` retries the
/// allocation against the memory the handler just made available (e.g. by
/// growing a pool); returning `None` gives up and propagates `None` to the
/// caller.
pub type AllocationFailureHandler = fn(requested: usize, user_data: usize) -> Option<NonNull<u8>>;

/// Called by `resize_pool` to ask the host environment to actually change
/// the backing memory region's size; returns whether the resize happened.
pub type ResizeAllocationHandler = fn(pool_index: usize, new_size: usize, user_data: usize) -> bool;

/// A walker invoked once per block during [`Allocator::walk_pool`], in
/// physical order. Arguments are `(payload_ptr, size, is_free)`.
pub type Walker = fn(NonNull<u8>, usize, bool, usize);

pub(crate) struct Pool {
    pub(crate) base: NonNull<u8>,
    pub(crate) size: usize,
    pub(crate) config: PoolConfig,
    pub(crate) control: Control,
    pub(crate) live_allocations: usize,
    pub(crate) lock: Option<&'static dyn Lockable>,
}

unsafe impl Send for Pool {}

/// A TLSF allocator fronting one or more caller-supplied memory pools.
///
/// `L` is the global lock guarding pool *selection* (registering pools,
/// choosing which pool services a request); individual pools may supply
/// their own [`Lockable`] for the data-structure mutation itself once a
/// pool has been chosen, via [`PoolConfig`]-adjacent `set_pool_lock`.
pub struct Allocator<L: Lockable = NoopLock> {
    pub(crate) pools: [Option<Pool>; MAX_POOL],
    pub(crate) pool_count: usize,
    pub(crate) lock: L,
    pub(crate) per_pool_locking: bool,
    pub(crate) failure_handler: Option<AllocationFailureHandler>,
    pub(crate) failure_handler_data: usize,
    pub(crate) resize_handler: Option<ResizeAllocationHandler>,
    pub(crate) resize_handler_data: usize,
    pub(crate) auto_defragment: bool,
    pub(crate) defragment_threshold: f32,
    pub(crate) alloc_count: usize,
}

impl Allocator<NoopLock> {
    /// A new allocator with no pools registered and no global lock (safe
    /// only for single-threaded use, matching `NoopLock`'s contract).
    pub const fn new() -> Self {
        Self::with_lock(NoopLock)
    }
}

impl Default for Allocator<NoopLock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Lockable> Allocator<L> {
    /// A new allocator guarded by `lock` for pool-selecting operations.
    pub const fn with_lock(lock: L) -> Self {
        Allocator {
            pools: [None, None, None, None, None],
            pool_count: 0,
            lock,
            per_pool_locking: false,
            failure_handler: None,
            failure_handler_data: 0,
            resize_handler: None,
            resize_handler_data: 0,
            auto_defragment: false,
            defragment_threshold: 0.75,
            alloc_count: 0,
        }
    }

    /// Install the handler invoked when every eligible pool is exhausted.
    pub fn set_allocation_failure_handler(
        &mut self,
        handler: AllocationFailureHandler,
        user_data: usize,
    ) {
        self.failure_handler = Some(handler);
        self.failure_handler_data = user_data;
    }

    /// Install the handler `resize_pool` delegates the actual resize to.
    pub fn set_resize_allocation_handler(
        &mut self,
        handler: ResizeAllocationHandler,
        user_data: usize,
    ) {
        self.resize_handler = Some(handler);
        self.resize_handler_data = user_data;
    }

    /// Enable or disable per-pool locking. When enabled, an operation that
    /// has already chosen its pool locks that pool's own `Lockable`
    /// (falling back to the global lock if the pool didn't configure one)
    /// instead of holding the global lock for the whole call.
    pub fn set_per_pool_locking(&mut self, enabled: bool) {
        self.per_pool_locking = enabled;
    }

    /// Enable or disable automatic defragmentation: every 10th successful
    /// allocation, the aggregate [`StorageReport::fragmentation_factor`] is
    /// checked against `threshold`, triggering [`Allocator::defragment`] if
    /// it's exceeded.
    pub fn set_auto_defragment(&mut self, enabled: bool, threshold: f32) {
        self.auto_defragment = enabled;
        self.defragment_threshold = threshold;
    }
}
