//! Per-pool configuration: priority/policy routing knobs plus the
//! per-pool minimums the reference allocator's `PoolConfig` carries.
use crate::block::MIN_BLOCK_SIZE;

/// How a pool wants to be favored by the multi-pool selection pass.
///
/// Grounded structurally on `eAlloc::PoolConfig::priority` (present in the
/// reference allocator) generalized to the policy-aware selection this
/// crate's façade performs across pools, since the reference source
/// predates that feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// No particular routing preference; eligible for any request.
    #[default]
    Default,
    /// Reserved for allocations explicitly requesting this policy; skipped
    /// during relaxed/fallback passes unless no other pool qualifies.
    CriticalOnly,
    /// Tuned for latency-sensitive callers (e.g. DMA-capable memory).
    FastAccess,
    /// Tuned for long-lived allocations where fragmentation matters more
    /// than allocation speed.
    LowFragmentation,
}

/// Configuration supplied when registering a pool with [`crate::allocator::Allocator::add_pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Selection priority: higher values are preferred by the strict
    /// selection pass when a request names a minimum priority.
    pub priority: u8,
    /// The smallest block this pool will service; requests below this are
    /// rejected for this pool even if the global minimum would allow them.
    pub min_block_size: usize,
    /// Alignment this pool prefers payloads to start at, applied as a
    /// floor under any alignment an individual request specifies.
    pub preferred_alignment: usize,
    /// The routing policy this pool advertises.
    pub policy: Policy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            priority: 0,
            min_block_size: MIN_BLOCK_SIZE,
            preferred_alignment: crate::block::ALIGN_SIZE,
            policy: Policy::Default,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_block_size(mut self, min_block_size: usize) -> Self {
        self.min_block_size = min_block_size.max(MIN_BLOCK_SIZE);
        self
    }

    pub fn with_preferred_alignment(mut self, alignment: usize) -> Self {
        self.preferred_alignment = alignment.max(crate::block::ALIGN_SIZE);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}
