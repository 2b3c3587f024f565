//! A multi-pool TLSF (Two-Level Segregated Fit) dynamic memory allocator.
//!
//! Callers hand the allocator one or more caller-owned memory regions
//! ("pools"); [`Allocator`] serves `malloc`/`calloc`/`memalign`/`realloc`/
//! `free` requests out of whichever pool best matches a request's priority
//! and [`Policy`], splitting and coalescing blocks in O(1) via a
//! segregated free-list index.
//!
//! ```ignore
//! use core::mem::MaybeUninit;
//! use tlsf_pool::{Allocator, PoolConfig};
//!
//! static mut POOL: [MaybeUninit<u8>; 4096] = [MaybeUninit::uninit(); 4096];
//!
//! let mut alloc = Allocator::new();
//! alloc.add_pool(unsafe { &mut POOL }, PoolConfig::new()).unwrap();
//! let ptr = alloc.malloc(64).unwrap();
//! alloc.free(ptr).unwrap();
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

#[cfg(any(test, feature = "std"))]
extern crate std;

mod allocator;
mod bits;
mod block;
mod control;
pub mod error;
pub mod lock;
mod mapping;
pub mod pool;

#[cfg(feature = "std")]
pub mod global;

pub use allocator::{
    Allocator, AllocationFailureHandler, ResizeAllocationHandler, StorageReport, Walker, MAX_POOL,
};
pub use error::TlsfError;
pub use lock::{Lockable, NoopLock, SpinLock};
pub use pool::{Policy, PoolConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::MaybeUninit;

    #[test]
    fn smoke_malloc_free() {
        let mem: std::boxed::Box<[MaybeUninit<u8>]> =
            std::vec![MaybeUninit::<u8>::uninit(); 4096].into_boxed_slice();
        let mem: &'static mut [MaybeUninit<u8>] = std::boxed::Box::leak(mem);
        let mut alloc = Allocator::new();
        alloc.add_pool(mem, PoolConfig::new()).unwrap();
        let ptr = alloc.malloc(128).expect("allocation should succeed");
        alloc.free(ptr).expect("free should succeed");
        assert!(alloc.check().is_ok());
    }
}
