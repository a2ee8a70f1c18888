//! Hash-based offset allocation with linear probing

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::assignment::PortAssignment;
use crate::config::{PortsConfig, StaticWorktree};

/// Errors that can occur during port allocation
#[derive(Debug, Error)]
pub enum PortError {
    #[error("No free port offsets available (all {slots} ephemeral slots in use)")]
    Exhausted { slots: u32 },

    #[error("Invalid ephemeral range {min}-{max} step {step}")]
    InvalidRange { min: u16, max: u16, step: u16 },
}

/// The reserved ephemeral offset range, partitioned into fixed-width slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    min: u16,
    max: u16,
    step: u16,
}

impl SlotRange {
    pub fn new(min: u16, max: u16, step: u16) -> Result<Self, PortError> {
        if step == 0 || max < min {
            return Err(PortError::InvalidRange { min, max, step });
        }
        Ok(Self { min, max, step })
    }

    /// Number of slots in the range (both ends inclusive)
    pub fn slots(&self) -> u32 {
        u32::from(self.max - self.min) / u32::from(self.step) + 1
    }

    /// Offset for a slot index; the index must be below `slots()`
    pub fn offset(&self, slot: u32) -> u16 {
        debug_assert!(slot < self.slots());
        // slot * step never exceeds max - min, so the result fits in u16
        self.min + (slot * u32::from(self.step)) as u16
    }

    pub fn contains(&self, offset: u16) -> bool {
        offset >= self.min && offset <= self.max && (offset - self.min) % self.step == 0
    }
}

/// Snapshot of every offset currently in use
///
/// Built fresh for each allocation from the static table plus whatever the
/// caller discovers in existing worktrees. There is no locking: two separate
/// invocations allocating at the same moment can both pick the same slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedOffsetSet {
    offsets: BTreeSet<u16>,
}

impl UsedOffsetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the offsets reserved by static worktrees
    pub fn with_static(statics: &[StaticWorktree]) -> Self {
        let mut set = Self::new();
        for entry in statics {
            set.insert(entry.supabase_offset);
        }
        set
    }

    pub fn insert(&mut self, offset: u16) -> bool {
        self.offsets.insert(offset)
    }

    pub fn contains(&self, offset: u16) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.offsets.iter().copied()
    }
}

impl FromIterator<u16> for UsedOffsetSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}

/// Starting slot for a name: SHA-256 as a big-endian integer, modulo the slot count
pub fn base_slot(name: &str, slots: u32) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    let slots = u64::from(slots);
    let slot = digest.iter().fold(0u64, |acc, byte| (acc * 256 + u64::from(*byte)) % slots);
    slot as u32
}

/// Deterministic offset allocator
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: SlotRange,
    statics: Vec<StaticWorktree>,
    project_prefix: String,
}

impl PortAllocator {
    pub fn new(config: &PortsConfig) -> Result<Self, PortError> {
        debug!(?config, "PortAllocator::new: called");
        Ok(Self {
            range: SlotRange::new(config.ephemeral_min, config.ephemeral_max, config.ephemeral_step)?,
            statics: config.static_worktrees.clone(),
            project_prefix: config.project_prefix.clone(),
        })
    }

    pub fn range(&self) -> SlotRange {
        self.range
    }

    pub fn static_worktrees(&self) -> &[StaticWorktree] {
        &self.statics
    }

    pub fn project_prefix(&self) -> &str {
        &self.project_prefix
    }

    /// Seed set holding only the static offsets
    pub fn static_offsets(&self) -> UsedOffsetSet {
        UsedOffsetSet::with_static(&self.statics)
    }

    /// Supabase offset for `name` given the offsets already in use
    ///
    /// Static names resolve through the fixed table. Everything else starts at
    /// its hashed slot and probes forward, wrapping, until a free slot is found.
    pub fn allocate(&self, name: &str, used: &UsedOffsetSet) -> Result<u16, PortError> {
        debug!(%name, used = used.len(), "PortAllocator::allocate: called");
        if let Some(entry) = self.statics.iter().find(|s| s.name == name) {
            debug!(offset = entry.supabase_offset, "PortAllocator::allocate: static worktree");
            return Ok(entry.supabase_offset);
        }
        self.allocate_ephemeral(name, used)
    }

    /// Hashed slot allocation, ignoring the static table
    ///
    /// Used when provisioning a branch worktree whose branch happens to share
    /// a name with a static worktree.
    pub fn allocate_ephemeral(&self, name: &str, used: &UsedOffsetSet) -> Result<u16, PortError> {
        let slots = self.range.slots();
        let base = base_slot(name, slots);
        for probe in 0..slots {
            let candidate = self.range.offset((base + probe) % slots);
            if !used.contains(candidate) {
                debug!(base, probe, candidate, "PortAllocator::allocate_ephemeral: found free slot");
                return Ok(candidate);
            }
        }

        debug!(slots, "PortAllocator::allocate_ephemeral: range exhausted");
        Err(PortError::Exhausted { slots })
    }

    /// Full assignment for `name`
    pub fn assign(&self, name: &str, used: &UsedOffsetSet) -> Result<PortAssignment, PortError> {
        if let Some(entry) = self.statics.iter().find(|s| s.name == name) {
            return Ok(PortAssignment::from_static(entry));
        }
        let offset = self.allocate(name, used)?;
        Ok(PortAssignment::ephemeral(name, offset, &self.project_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PortAllocator {
        PortAllocator::new(&PortsConfig::default()).unwrap()
    }

    #[test]
    fn test_default_range_has_sixty_slots() {
        let range = allocator().range();
        assert_eq!(range.slots(), 60);
        assert_eq!(range.offset(0), 4000);
        assert_eq!(range.offset(59), 9900);
        assert!(range.contains(6900));
        assert!(!range.contains(6950));
        assert!(!range.contains(3000));
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(SlotRange::new(100, 50, 10), Err(PortError::InvalidRange { .. })));
        assert!(matches!(SlotRange::new(100, 200, 0), Err(PortError::InvalidRange { .. })));
    }

    #[test]
    fn test_hash_slot_for_known_branch() {
        // sha256("feat/x") mod 60 == 29
        assert_eq!(base_slot("feat/x", 60), 29);
        assert_eq!(base_slot("feat/y", 60), 22);

        let offset = allocator().allocate("feat/x", &UsedOffsetSet::new()).unwrap();
        assert_eq!(offset, 4000 + 29 * 100);
    }

    #[test]
    fn test_allocate_is_repeatable() {
        let alloc = allocator();
        let used = alloc.static_offsets();
        let first = alloc.allocate("feat/repeat", &used).unwrap();
        let second = alloc.allocate("feat/repeat", &used).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_linear_probe_on_collision() {
        // "main-ish" hashes to the same slot as "feat/x"
        let alloc = allocator();
        let mut used = alloc.static_offsets();
        used.insert(alloc.allocate("feat/x", &used).unwrap());

        let offset = alloc.allocate("main-ish", &used).unwrap();
        assert_eq!(offset, 7000);
    }

    #[test]
    fn test_probe_wraps_around() {
        let alloc = allocator();
        // Occupy every slot from 29 to the end; "feat/x" must wrap to slot 0
        let used: UsedOffsetSet = (29..60).map(|slot| alloc.range().offset(slot)).collect();

        let offset = alloc.allocate("feat/x", &used).unwrap();
        assert_eq!(offset, 4000);
    }

    #[test]
    fn test_exhausted_range_fails() {
        let alloc = allocator();
        let used: UsedOffsetSet = (0..60).map(|slot| alloc.range().offset(slot)).collect();

        let result = alloc.allocate("feat/x", &used);
        assert!(matches!(result, Err(PortError::Exhausted { slots: 60 })));
    }

    #[test]
    fn test_static_name_uses_table() {
        let alloc = allocator();
        let used: UsedOffsetSet = (0..60).map(|slot| alloc.range().offset(slot)).collect();

        // Static lookups never hash and never fail
        assert_eq!(alloc.allocate("PinPoint-Secondary", &used).unwrap(), 1000);

        let assignment = alloc.assign("PinPoint-review", &used).unwrap();
        assert!(assignment.is_static);
        assert_eq!(assignment.project_id, "pinpoint-review");
        assert_eq!(assignment.nextjs_offset, 200);
    }

    #[test]
    fn test_allocate_ephemeral_ignores_static_table() {
        let alloc = allocator();
        let offset = alloc.allocate_ephemeral("PinPoint", &alloc.static_offsets()).unwrap();
        assert!(alloc.range().contains(offset));
    }

    #[test]
    fn test_assign_ephemeral() {
        let alloc = allocator();
        let assignment = alloc.assign("feat/x", &alloc.static_offsets()).unwrap();

        assert_eq!(assignment.supabase_offset, 6900);
        assert_eq!(assignment.nextjs_offset, 690);
        assert_eq!(assignment.project_id, "pinpoint-feat-x");
        assert!(!assignment.is_static);
    }

    #[test]
    fn test_exhausted_message() {
        let err = PortError::Exhausted { slots: 60 };
        assert!(err.to_string().contains("all 60 ephemeral slots in use"));
    }
}
