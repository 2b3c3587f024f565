//! The error taxonomy for the management surface (allocation itself stays
//! on `Option<NonNull<u8>>`, matching the teacher's hot-path idiom).
use core::fmt;

/// Failure modes reported by `add_pool`, `remove_pool`, `resize_pool`, and
/// the checked variant of `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsfError {
    /// An allocation request could not be satisfied by any eligible pool.
    OutOfMemory,
    /// A caller-supplied argument (size, alignment, pool handle) is invalid.
    InvalidArgument,
    /// `add_pool` was called when `MAX_POOL` pools are already registered.
    PoolFull,
    /// `remove_pool`/`resize_pool` was called on a pool that still has
    /// blocks allocated from it.
    PoolInUse,
    /// A pool handle did not match any registered pool.
    PoolNotFound,
    /// `check`/`check_pool` found the free-list index inconsistent.
    IntegrityViolation,
    /// `free` was called on a pointer whose block is already marked free.
    DoubleFree,
    /// `resize_pool` was called with no `ResizeAllocationHandler` installed.
    NoResizeHandler,
}

impl fmt::Display for TlsfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TlsfError::OutOfMemory => "no pool could satisfy the allocation request",
            TlsfError::InvalidArgument => "invalid argument",
            TlsfError::PoolFull => "maximum number of pools already registered",
            TlsfError::PoolInUse => "pool still has live allocations",
            TlsfError::PoolNotFound => "no such pool",
            TlsfError::IntegrityViolation => "free-list index failed an integrity check",
            TlsfError::DoubleFree => "pointer was already free",
            TlsfError::NoResizeHandler => "no resize handler installed",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TlsfError {}
