//! An optional `#[global_allocator]` adaptor over a single-pool
//! [`Allocator`], grounded on the teacher's `GlobalTlsf`
//! (`examples/yvt-rlsf/crates/rlsf/src/global.rs`): an `UnsafeCell`-wrapped
//! allocator whose `Lockable` provides the synchronization `GlobalAlloc`
//! itself doesn't.
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::lock::Lockable;
use crate::pool::PoolConfig;

/// A [`GlobalAlloc`] backed by a single TLSF pool.
///
/// Unlike [`Allocator`] itself (which callers may use directly, lock-free,
/// from a single thread), `GlobalTlsf` must be usable concurrently from
/// arbitrary call sites, so `L` is required to be `Sync` and every
/// operation takes the lock for its whole duration.
pub struct GlobalTlsf<L: Lockable + Sync> {
    inner: UnsafeCell<Allocator<L>>,
}

unsafe impl<L: Lockable + Sync> Sync for GlobalTlsf<L> {}

impl<L: Lockable + Sync> GlobalTlsf<L> {
    /// An empty allocator with no pool registered yet. Call
    /// [`Self::init`] before the first allocation.
    pub const fn new(lock: L) -> Self {
        GlobalTlsf {
            inner: UnsafeCell::new(Allocator::with_lock(lock)),
        }
    }

    /// Register the backing pool. Must be called exactly once, before any
    /// allocation is attempted through this instance.
    ///
    /// # Safety
    /// `mem` must not be accessed by anything else for the program's
    /// remaining lifetime.
    pub unsafe fn init(&self, mem: &'static mut [MaybeUninit<u8>]) {
        let allocator = unsafe { &mut *self.inner.get() };
        allocator
            .add_pool(mem, PoolConfig::new())
            .expect("GlobalTlsf::init pool registration failed");
    }
}

unsafe impl<L: Lockable + Sync> GlobalAlloc for GlobalTlsf<L> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let allocator = unsafe { &mut *self.inner.get() };
        if layout.align() <= crate::block::ALIGN_SIZE {
            allocator.malloc(layout.size())
        } else {
            allocator.memalign(layout.align(), layout.size())
        }
        .map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let allocator = unsafe { &mut *self.inner.get() };
        if let Some(ptr) = NonNull::new(ptr) {
            let _ = allocator.free(ptr);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        let allocator = unsafe { &mut *self.inner.get() };
        let ptr = NonNull::new(ptr);
        allocator
            .realloc(ptr, new_size)
            .map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }
}
