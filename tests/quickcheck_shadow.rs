//! Property-based testing via a shadow allocator: a `BTreeMap`-based model
//! of the address space (free / used / untracked) checked against the
//! real allocator after a randomized sequence of allocator operations,
//! across more than one pool.
//!
//! Grounded on the teacher's `ShadowAllocator` technique in
//! `examples/yvt-rlsf/crates/rlsf/src/tlsf/tests.rs`.
use std::collections::BTreeMap;
use std::mem::MaybeUninit;

use quickcheck_macros::quickcheck;
use tlsf_pool::{Allocator, PoolConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Free,
    Used,
}

#[derive(Default)]
struct ShadowAllocator {
    regions: BTreeMap<usize, (usize, Region)>,
}

impl ShadowAllocator {
    fn insert(&mut self, addr: usize, size: usize, region: Region) {
        self.regions.insert(addr, (size, region));
    }

    fn remove(&mut self, addr: usize) -> Option<(usize, Region)> {
        self.regions.remove(&addr)
    }
}

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    Calloc(usize, usize),
    Memalign(usize, usize),
    Realloc(usize, usize),
    Free(usize),
}

impl quickcheck::Arbitrary for Op {
    fn arbitrary<G: quickcheck::Gen>(g: &mut G) -> Self {
        match u32::arbitrary(g) % 5 {
            0 => Op::Alloc(usize::arbitrary(g) % 512 + 1),
            1 => Op::Calloc(usize::arbitrary(g) % 8 + 1, usize::arbitrary(g) % 64 + 1),
            2 => {
                let shift = usize::arbitrary(g) % 6 + 2; // 4..=128
                Op::Memalign(1usize << shift, usize::arbitrary(g) % 256 + 1)
            }
            3 => Op::Realloc(usize::arbitrary(g) % 16, usize::arbitrary(g) % 512),
            _ => Op::Free(usize::arbitrary(g) % 16),
        }
    }
}

#[quickcheck]
fn shadow_model_agrees_with_allocator(ops: Vec<Op>) -> bool {
    let pool_a = Box::leak(vec![MaybeUninit::<u8>::uninit(); 1 << 19].into_boxed_slice());
    let pool_b = Box::leak(vec![MaybeUninit::<u8>::uninit(); 1 << 19].into_boxed_slice());

    let mut alloc = Allocator::new();
    alloc.add_pool(pool_a, PoolConfig::new()).unwrap();
    alloc.add_pool(pool_b, PoolConfig::new()).unwrap();
    let mut shadow = ShadowAllocator::default();
    let mut live: Vec<usize> = Vec::new();

    for op in ops {
        match op {
            Op::Alloc(size) => {
                if let Some(ptr) = alloc.malloc(size) {
                    let addr = ptr.as_ptr() as usize;
                    shadow.insert(addr, size, Region::Used);
                    live.push(addr);
                }
            }
            Op::Calloc(count, size) => {
                if let Some(ptr) = alloc.calloc(count, size) {
                    let addr = ptr.as_ptr() as usize;
                    shadow.insert(addr, count * size, Region::Used);
                    live.push(addr);
                }
            }
            Op::Memalign(align, size) => {
                if let Some(ptr) = alloc.memalign(align, size) {
                    let addr = ptr.as_ptr() as usize;
                    if addr % align != 0 {
                        return false;
                    }
                    shadow.insert(addr, size, Region::Used);
                    live.push(addr);
                }
            }
            Op::Realloc(index, new_size) => {
                if live.is_empty() {
                    continue;
                }
                let i = index % live.len();
                let old_addr = live[i];
                let old_ptr = unsafe { core::ptr::NonNull::new_unchecked(old_addr as *mut u8) };
                match alloc.realloc(Some(old_ptr), new_size) {
                    Some(new_ptr) => {
                        let new_addr = new_ptr.as_ptr() as usize;
                        if shadow.remove(old_addr).is_none() {
                            return false;
                        }
                        shadow.insert(new_addr, new_size, Region::Used);
                        live[i] = new_addr;
                    }
                    None => {
                        if new_size == 0 {
                            // realloc(ptr, 0) behaves like free(ptr).
                            if shadow.remove(old_addr).is_none() {
                                return false;
                            }
                            live.remove(i);
                        }
                        // Otherwise the request failed and the old block is
                        // untouched — nothing to update.
                    }
                }
            }
            Op::Free(index) => {
                if live.is_empty() {
                    continue;
                }
                let addr = live.remove(index % live.len());
                if alloc.free(unsafe { core::ptr::NonNull::new_unchecked(addr as *mut u8) }).is_err() {
                    return false;
                }
                if shadow.remove(addr).is_none() {
                    return false;
                }
            }
        }

        if alloc.check().is_err() {
            return false;
        }
        if alloc.check_pool(0).is_err() || alloc.check_pool(1).is_err() {
            return false;
        }
    }

    alloc.check().is_ok()
}
