//! Block header layout and the pure metadata operations over it.
//!
//! Every block (free or used) starts with a [`BlockHdr`]. A free block's
//! header is extended with intrusive free-list links ([`FreeBlockHdr`]); a
//! used block has no need for them, so its payload starts right after
//! `size_and_flags`, a word earlier than a free block's payload would.
//! That's the "overlap trick" in spec terms: the `next_free`/`prev_free`
//! pair a free block needs is simply unallocated space borrowed from the
//! user's payload while the block is in use.
use core::{
    mem,
    ptr::NonNull,
};

/// Bit of [`BlockHdr::size_and_flags`] marking a block as free.
pub(crate) const SIZE_FREE: usize = 1;
/// Bit of [`BlockHdr::size_and_flags`] marking the *previous* physical block
/// as free.
pub(crate) const SIZE_PREV_FREE: usize = 2;
const SIZE_FLAG_MASK: usize = SIZE_FREE | SIZE_PREV_FREE;

/// Allocation granularity / alignment. The two low bits of every block size
/// are reserved for [`SIZE_FREE`] and [`SIZE_PREV_FREE`], so all sizes must
/// be a multiple of this.
pub(crate) const ALIGN_SIZE: usize = 4;
pub(crate) const ALIGN_SIZE_LOG2: u32 = 2;

/// The header common to every block, free or used.
///
/// `size_and_flags` is placed first so that a used block's payload (which
/// begins one word after this field) overlaps `prev_phys_block`'s storage.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct BlockHdr {
    pub size_and_flags: usize,
    /// Valid only when `is_free(self)` or `is_prev_free(next)`; otherwise
    /// the bytes are shared with the previous block's payload tail.
    pub prev_phys_block: Option<NonNull<BlockHdr>>,
}

/// The header of a block on a free list.
#[repr(C)]
pub(crate) struct FreeBlockHdr {
    pub common: BlockHdr,
    pub next_free: Option<NonNull<FreeBlockHdr>>,
    pub prev_free: Option<NonNull<FreeBlockHdr>>,
}

/// Header overhead counted against a block's advertised size: just the
/// `size_and_flags` word, per [`BlockHdr::next`]'s arithmetic.
pub(crate) const BLOCK_HEADER_OVERHEAD: usize = mem::size_of::<usize>();

/// Offset from the start of a block's header to its user payload.
pub(crate) const BLOCK_START_OFFSET: usize = BLOCK_HEADER_OVERHEAD;

/// The smallest size a block may have. Any block might become free (and
/// thus need [`FreeBlockHdr`]'s links) via a future merge, so the floor is
/// set by the larger header, not the smaller one.
pub(crate) const MIN_BLOCK_SIZE: usize = mem::size_of::<FreeBlockHdr>();

impl BlockHdr {
    #[inline]
    pub(crate) fn get_size(&self) -> usize {
        self.size_and_flags & !SIZE_FLAG_MASK
    }

    #[inline]
    pub(crate) fn set_size(&mut self, size: usize) {
        debug_assert_eq!(size & SIZE_FLAG_MASK, 0);
        self.size_and_flags = size | (self.size_and_flags & SIZE_FLAG_MASK);
    }

    #[inline]
    pub(crate) fn is_free(&self) -> bool {
        self.size_and_flags & SIZE_FREE != 0
    }

    #[inline]
    pub(crate) fn is_prev_free(&self) -> bool {
        self.size_and_flags & SIZE_PREV_FREE != 0
    }

    /// A block is the pool's trailing sentinel iff its size is zero.
    #[inline]
    pub(crate) fn is_last(&self) -> bool {
        self.get_size() == 0
    }

    #[inline]
    pub(crate) fn set_free(&mut self) {
        self.size_and_flags |= SIZE_FREE;
    }

    #[inline]
    pub(crate) fn set_used(&mut self) {
        self.size_and_flags &= !SIZE_FREE;
    }

    #[inline]
    pub(crate) fn set_prev_free(&mut self) {
        self.size_and_flags |= SIZE_PREV_FREE;
    }

    #[inline]
    pub(crate) fn set_prev_used(&mut self) {
        self.size_and_flags &= !SIZE_PREV_FREE;
    }

    /// The physically next block. Requires `!self.is_last()`.
    ///
    /// # Safety
    /// `self` must not be the trailing sentinel, and must be a valid,
    /// currently-initialized header.
    #[inline]
    pub(crate) unsafe fn next(this: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        debug_assert!(!this.as_ref().is_last());
        let size = this.as_ref().get_size();
        NonNull::new_unchecked(
            (this.as_ptr() as *mut u8).add(size - BLOCK_HEADER_OVERHEAD) as *mut BlockHdr,
        )
    }

    /// The physically previous block. Requires `self.is_prev_free()`.
    ///
    /// # Safety
    /// `self` must have `is_prev_free() == true`, and `prev_phys_block` must
    /// be a valid pointer (guaranteed whenever that flag is set).
    #[inline]
    pub(crate) unsafe fn prev(this: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        debug_assert!(this.as_ref().is_prev_free());
        this.as_ref()
            .prev_phys_block
            .unwrap_or_else(|| unreachable_prev())
    }

    /// Link `next(block).prev_phys_block` to `block` and return the
    /// neighbour. Requires `!block.is_last()`.
    ///
    /// # Safety
    /// Same as [`Self::next`].
    #[inline]
    pub(crate) unsafe fn link_next(mut this: NonNull<BlockHdr>) -> NonNull<BlockHdr> {
        let mut next = Self::next(this);
        next.as_mut().prev_phys_block = Some(this);
        let _ = &mut this;
        next
    }

    /// Flip `self` to free and propagate `PREV_FREE` to the next block.
    ///
    /// # Safety
    /// `!this.is_last()`.
    #[inline]
    pub(crate) unsafe fn mark_as_free(mut this: NonNull<BlockHdr>) {
        let mut next = Self::link_next(this);
        next.as_mut().set_prev_free();
        this.as_mut().set_free();
    }

    /// Flip `self` to used and clear `PREV_FREE` on the next block.
    ///
    /// # Safety
    /// `!this.is_last()`.
    #[inline]
    pub(crate) unsafe fn mark_as_used(mut this: NonNull<BlockHdr>) {
        let mut next = Self::next(this);
        next.as_mut().set_prev_used();
        this.as_mut().set_used();
    }

    /// The user-facing pointer for this block.
    ///
    /// # Safety
    /// `this` must point to a valid header.
    #[inline]
    pub(crate) unsafe fn to_ptr(this: NonNull<BlockHdr>) -> NonNull<u8> {
        NonNull::new_unchecked((this.as_ptr() as *mut u8).add(BLOCK_START_OFFSET))
    }

    /// Recover the block header from a user pointer previously returned by
    /// [`Self::to_ptr`].
    ///
    /// # Safety
    /// `ptr` must have been produced by `to_ptr` on a still-live header.
    #[inline]
    pub(crate) unsafe fn from_ptr(ptr: NonNull<u8>) -> NonNull<BlockHdr> {
        NonNull::new_unchecked(ptr.as_ptr().sub(BLOCK_START_OFFSET) as *mut BlockHdr)
    }
}

#[cold]
#[inline(never)]
fn unreachable_prev() -> ! {
    unreachable!("prev_phys_block must be Some when is_prev_free() holds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_flag_roundtrip() {
        let mut hdr = BlockHdr {
            size_and_flags: 0,
            prev_phys_block: None,
        };
        hdr.set_size(256);
        assert_eq!(hdr.get_size(), 256);
        assert!(!hdr.is_free());
        hdr.set_free();
        assert!(hdr.is_free());
        assert_eq!(hdr.get_size(), 256);
        hdr.set_prev_free();
        assert!(hdr.is_prev_free());
        hdr.set_size(512);
        assert_eq!(hdr.get_size(), 512);
        assert!(hdr.is_free());
        assert!(hdr.is_prev_free());
    }

    #[test]
    fn sentinel_is_last() {
        let mut hdr = BlockHdr {
            size_and_flags: 0,
            prev_phys_block: None,
        };
        hdr.set_used();
        assert!(hdr.is_last());
        hdr.set_size(16);
        assert!(!hdr.is_last());
    }
}
