//! Aggregate fragmentation/usage statistics, grounded on `eAlloc::report`
//! (which walks the free-list bitmaps rather than the physical block
//! chain, so the cost is proportional to the number of free blocks, not
//! pool size).
use super::{Allocator, Pool};
use crate::lock::Lockable;
use crate::mapping::{FL_INDEX_COUNT, SLI_COUNT};

/// A snapshot of a pool's (or the whole allocator's) free-space layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageReport {
    pub total_free_space: usize,
    pub largest_free_region: usize,
    pub smallest_free_region: usize,
    pub free_block_count: usize,
    pub average_free_block_size: usize,
    /// `1.0 - largest_free_region / total_free_space`, or `0.0` when there
    /// is no free space at all (an allocator that's simply full isn't
    /// "fragmented").
    pub fragmentation_factor: f32,
}

impl StorageReport {
    fn accumulate(&mut self, pool: &Pool) {
        for fl in 0..FL_INDEX_COUNT {
            let cabinet = &pool.control.cabinets[fl];
            for sl in 0..SLI_COUNT {
                let mut node = cabinet.shelves[sl];
                while let Some(n) = node {
                    unsafe {
                        let size = n.as_ref().common.get_size();
                        self.total_free_space += size;
                        self.largest_free_region = self.largest_free_region.max(size);
                        self.smallest_free_region = if self.free_block_count == 0 {
                            size
                        } else {
                            self.smallest_free_region.min(size)
                        };
                        self.free_block_count += 1;
                        node = n.as_ref().next_free;
                    }
                }
            }
        }
        if self.free_block_count > 0 {
            self.average_free_block_size = self.total_free_space / self.free_block_count;
        }
        self.fragmentation_factor = if self.total_free_space == 0 {
            0.0
        } else {
            1.0 - (self.largest_free_region as f32 / self.total_free_space as f32)
        };
    }
}

impl<L: Lockable> Allocator<L> {
    /// Aggregate free-space statistics across every registered pool.
    ///
    /// `fragmentation_factor` is each active pool's own ratio averaged
    /// across pools, not recomputed from the combined totals — a pool
    /// that's fully free and a pool that's badly fragmented shouldn't wash
    /// each other out just because they're reported together.
    pub fn report(&self) -> StorageReport {
        let mut report = StorageReport::default();
        let mut fragmentation_sum = 0.0f32;
        let mut active_pools = 0usize;
        let mut seen_free_block = false;
        for pool in self.pools.iter().flatten() {
            let mut per_pool = StorageReport::default();
            per_pool.accumulate(pool);

            report.total_free_space += per_pool.total_free_space;
            report.free_block_count += per_pool.free_block_count;
            if per_pool.free_block_count > 0 {
                report.largest_free_region = report.largest_free_region.max(per_pool.largest_free_region);
                report.smallest_free_region = if seen_free_block {
                    report.smallest_free_region.min(per_pool.smallest_free_region)
                } else {
                    per_pool.smallest_free_region
                };
                seen_free_block = true;
                fragmentation_sum += per_pool.fragmentation_factor;
                active_pools += 1;
            }
        }
        if report.free_block_count > 0 {
            report.average_free_block_size = report.total_free_space / report.free_block_count;
        }
        report.fragmentation_factor = if active_pools > 0 {
            fragmentation_sum / active_pools as f32
        } else {
            0.0
        };
        report
    }

    /// Statistics for a single pool.
    pub fn report_pool(&self, index: usize) -> Option<StorageReport> {
        let pool = self.pools.get(index)?.as_ref()?;
        let mut report = StorageReport::default();
        report.accumulate(pool);
        Some(report)
    }

    /// Emit the allocator-wide [`StorageReport`] via `log::info!`,
    /// matching `eAlloc::logStorageReport`.
    pub fn log_storage_report(&self) {
        let report = self.report();
        log::info!(
            "tlsf: free={} largest={} smallest={} blocks={} avg={} frag={:.3}",
            report.total_free_space,
            report.largest_free_region,
            report.smallest_free_region,
            report.free_block_count,
            report.average_free_block_size,
            report.fragmentation_factor
        );
    }
}
