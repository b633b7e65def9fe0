//! Bounded, sequence- and time-indexed history of world snapshots.
//!
//! Mirrors the shape of a fixed-size ring buffer: capacity `N`, a write
//! cursor, and a sequence counter that only ever grows. Sequence `s` always
//! lives at index `(s - 1) % N`, so `by_sequence` is an O(1) lookup rather
//! than the linear scan the spec allows — the index arithmetic falls out
//! for free once sequence and cursor advance in lockstep.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use glam::DVec2;

use crate::clock::{Clock, SystemClock};

pub type EntityId = u64;

/// One entity's replicated state within a [`WorldSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub position: DVec2,
    pub velocity: DVec2,
    pub components: HashMap<String, Vec<u8>>,
}

impl EntitySnapshot {
    pub fn new(entity_id: EntityId, position: DVec2, velocity: DVec2) -> Self {
        Self {
            entity_id,
            position,
            velocity,
            components: HashMap::new(),
        }
    }
}

/// A point-in-time view of all replicated entities.
///
/// `sequence` is assigned by the store on [`SnapshotStore::record`] and is
/// ignored on input; `timestamp` of `0` means "unset", and is stamped with
/// the store's clock at record time.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub timestamp: u64,
    pub sequence: u64,
    pub entities: HashMap<EntityId, EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            sequence: 0,
            entities: HashMap::new(),
        }
    }

    pub fn insert(&mut self, entity: EntitySnapshot) {
        self.entities.insert(entity.entity_id, entity);
    }
}

/// The result of [`SnapshotStore::delta`]: what changed between two recorded
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDelta {
    pub from_sequence: u64,
    pub to_sequence: u64,
    pub added: HashSet<EntityId>,
    pub removed: HashSet<EntityId>,
    pub changed: HashMap<EntityId, EntitySnapshot>,
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotStats {
    pub count: usize,
    pub oldest_timestamp: Option<u64>,
    pub newest_timestamp: Option<u64>,
    pub capacity: usize,
}

struct Inner {
    ring: Vec<Option<WorldSnapshot>>,
    len: usize,
    next_sequence: u64,
}

pub struct SnapshotStore {
    capacity: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl SnapshotStore {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        assert!(capacity > 0, "SnapshotStore capacity must be non-zero");
        Self {
            capacity,
            clock,
            inner: Mutex::new(Inner {
                ring: (0..capacity).map(|_| None).collect(),
                len: 0,
                next_sequence: 1,
            }),
        }
    }

    fn index_of(&self, sequence: u64) -> usize {
        ((sequence - 1) % self.capacity as u64) as usize
    }

    /// Assigns the next sequence, stamps `timestamp` with the clock if it is
    /// `0`, and inserts at the write cursor (overwriting the oldest entry
    /// once the ring is full). Returns the assigned sequence.
    pub fn record(&self, mut snapshot: WorldSnapshot) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        snapshot.sequence = sequence;
        if snapshot.timestamp == 0 {
            snapshot.timestamp = self.clock.now_ms();
        }
        let index = self.index_of(sequence);
        if inner.ring[index].is_none() {
            inner.len += 1;
        }
        inner.ring[index] = Some(snapshot);
        sequence
    }

    pub fn latest(&self) -> Option<WorldSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .ring
            .iter()
            .flatten()
            .max_by_key(|s| s.sequence)
            .cloned()
    }

    /// Linear scan bounded by capacity `N`, per the spec; in practice this is
    /// O(1) because `sequence` maps directly to a ring index.
    pub fn by_sequence(&self, sequence: u64) -> Option<WorldSnapshot> {
        if sequence == 0 {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let index = self.index_of(sequence);
        inner
            .ring
            .get(index)
            .and_then(|slot| slot.as_ref())
            .filter(|snap| snap.sequence == sequence)
            .cloned()
    }

    /// Closest snapshot to `t` by `|ts - t|`, ties broken toward the older
    /// (smaller-timestamp) entry.
    pub fn by_timestamp(&self, t: u64) -> Option<WorldSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .ring
            .iter()
            .flatten()
            .min_by_key(|s| (s.timestamp.abs_diff(t), s.timestamp))
            .cloned()
    }

    fn ordered_snapshots(inner: &Inner) -> Vec<WorldSnapshot> {
        let mut snapshots: Vec<WorldSnapshot> = inner.ring.iter().flatten().cloned().collect();
        snapshots.sort_by_key(|s| s.sequence);
        snapshots
    }

    /// The two adjacent (by insertion order) snapshots `(s1, s2)` such that
    /// `s1.ts <= t <= s2.ts`. Absent if `t` falls outside the stored range,
    /// or fewer than two snapshots are stored.
    pub fn bracketing_pair(&self, t: u64) -> Option<(WorldSnapshot, WorldSnapshot)> {
        let inner = self.inner.lock().unwrap();
        let snapshots = Self::ordered_snapshots(&inner);
        snapshots
            .windows(2)
            .find(|pair| pair[0].timestamp <= t && t <= pair[1].timestamp)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
    }

    /// Linearly interpolates one entity's position and velocity between the
    /// bracketing pair at `t`. Component bytes are never blended: if both
    /// sides carry the entity, `s2`'s components win verbatim.
    pub fn interpolate_entity(&self, entity_id: EntityId, t: u64) -> Option<EntitySnapshot> {
        let (s1, s2) = self.bracketing_pair(t)?;
        let e1 = s1.entities.get(&entity_id);
        let e2 = s2.entities.get(&entity_id);
        match (e1, e2) {
            (Some(e1), Some(e2)) => {
                let span = s2.timestamp.saturating_sub(s1.timestamp);
                let u = if span == 0 {
                    0.0
                } else {
                    ((t.saturating_sub(s1.timestamp)) as f64 / span as f64).clamp(0.0, 1.0)
                };
                let mut blended = e2.clone();
                blended.position = e1.position.lerp(e2.position, u);
                blended.velocity = e1.velocity.lerp(e2.velocity, u);
                Some(blended)
            }
            (Some(e1), None) => Some(e1.clone()),
            (None, Some(e2)) => Some(e2.clone()),
            (None, None) => None,
        }
    }

    /// Added/removed/changed entity sets between two recorded sequences.
    /// Absent if either sequence is not currently in the ring.
    pub fn delta(&self, from_sequence: u64, to_sequence: u64) -> Option<SnapshotDelta> {
        let from = self.by_sequence(from_sequence)?;
        let to = self.by_sequence(to_sequence)?;

        let mut added = HashSet::new();
        let mut changed = HashMap::new();
        for (id, entity) in &to.entities {
            match from.entities.get(id) {
                None => {
                    added.insert(*id);
                }
                Some(prior) if prior != entity => {
                    changed.insert(*id, entity.clone());
                }
                Some(_) => {}
            }
        }
        let removed = from
            .entities
            .keys()
            .filter(|id| !to.entities.contains_key(id))
            .copied()
            .collect();

        Some(SnapshotDelta {
            from_sequence,
            to_sequence,
            added,
            removed,
            changed,
        })
    }

    pub fn stats(&self) -> SnapshotStats {
        let inner = self.inner.lock().unwrap();
        let timestamps: Vec<u64> = inner.ring.iter().flatten().map(|s| s.timestamp).collect();
        SnapshotStats {
            count: inner.len,
            oldest_timestamp: timestamps.iter().min().copied(),
            newest_timestamp: timestamps.iter().max().copied(),
            capacity: self.capacity,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        for slot in inner.ring.iter_mut() {
            *slot = None;
        }
        inner.len = 0;
        inner.next_sequence = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: EntityId, x: f64, vx: f64) -> EntitySnapshot {
        EntitySnapshot::new(id, DVec2::new(x, 0.0), DVec2::new(vx, 0.0))
    }

    #[test]
    fn capacity_overwrites_oldest() {
        let store = SnapshotStore::new(64);
        for _ in 0..100 {
            store.record(WorldSnapshot::new(1));
        }
        let stats = store.stats();
        assert_eq!(stats.count, 64);
        assert_eq!(stats.capacity, 64);
        assert!(store.by_sequence(30).is_none());
        assert!(store.by_sequence(100).is_some());
        assert_eq!(store.by_sequence(100).unwrap().sequence, 100);
    }

    #[test]
    fn sequence_is_contiguous_and_increasing() {
        let store = SnapshotStore::new(10);
        let mut last = 0;
        for _ in 0..5 {
            let seq = store.record(WorldSnapshot::new(1));
            assert!(seq > last);
            last = seq;
        }
    }

    #[test]
    fn interpolation_midpoint_matches_scenario() {
        let store = SnapshotStore::new(10);
        let mut a = WorldSnapshot::new(0);
        a.insert(entity(1, 0.0, 10.0));
        store.record(a);

        let mut b = WorldSnapshot::new(100);
        b.insert(entity(1, 10.0, 10.0));
        store.record(b);

        let mid = store.interpolate_entity(1, 50).unwrap();
        assert_eq!(mid.position, DVec2::new(5.0, 0.0));
        assert_eq!(mid.velocity, DVec2::new(10.0, 0.0));
    }

    #[test]
    fn interpolation_out_of_range_is_absent() {
        let store = SnapshotStore::new(10);
        let mut a = WorldSnapshot::new(0);
        a.insert(entity(1, 0.0, 0.0));
        store.record(a);
        let mut b = WorldSnapshot::new(100);
        b.insert(entity(1, 10.0, 0.0));
        store.record(b);

        assert!(store.interpolate_entity(1, 500).is_none());
    }

    #[test]
    fn interpolation_single_sided_entity_passes_through() {
        let store = SnapshotStore::new(10);
        let mut a = WorldSnapshot::new(0);
        a.insert(entity(1, 0.0, 0.0));
        a.insert(entity(2, 1.0, 0.0));
        store.record(a);

        let mut b = WorldSnapshot::new(100);
        b.insert(entity(1, 10.0, 0.0));
        store.record(b);

        let e2 = store.interpolate_entity(2, 50).unwrap();
        assert_eq!(e2.position, DVec2::new(1.0, 0.0));
    }

    #[test]
    fn delta_matches_scenario() {
        let store = SnapshotStore::new(10);
        let mut a = WorldSnapshot::new(1);
        a.insert(entity(1, 0.0, 0.0));
        a.insert(entity(2, 1.0, 0.0));
        let seq_a = store.record(a);

        let mut b = WorldSnapshot::new(2);
        b.insert(entity(1, 0.0, 0.0));
        b.insert(entity(3, 2.0, 0.0));
        let seq_b = store.record(b);

        let delta = store.delta(seq_a, seq_b).unwrap();
        assert_eq!(delta.added, HashSet::from([3]));
        assert_eq!(delta.removed, HashSet::from([2]));
        assert!(delta.changed.is_empty());
    }

    #[test]
    fn delta_disjoint_sets() {
        let store = SnapshotStore::new(10);
        let mut a = WorldSnapshot::new(1);
        a.insert(entity(1, 0.0, 0.0));
        let seq_a = store.record(a);

        let mut b = WorldSnapshot::new(2);
        b.insert(entity(1, 5.0, 0.0));
        b.insert(entity(2, 1.0, 0.0));
        let seq_b = store.record(b);

        let delta = store.delta(seq_a, seq_b).unwrap();
        assert!(delta.added.is_disjoint(&delta.removed));
        assert!(delta.added.is_disjoint(&delta.changed.keys().copied().collect()));
        assert!(delta.removed.is_disjoint(&delta.changed.keys().copied().collect()));
        assert!(delta.changed.contains_key(&1));
    }

    #[test]
    fn delta_missing_sequence_is_absent() {
        let store = SnapshotStore::new(10);
        assert!(store.delta(1, 2).is_none());
    }

    #[test]
    fn clear_resets_sequences() {
        let store = SnapshotStore::new(4);
        store.record(WorldSnapshot::new(1));
        store.clear();
        let stats = store.stats();
        assert_eq!(stats.count, 0);
        let seq = store.record(WorldSnapshot::new(1));
        assert_eq!(seq, 1);
    }
}
