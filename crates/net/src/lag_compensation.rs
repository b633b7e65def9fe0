//! Server-side historical rewind and hit validation.
//!
//! Answers "what did this client see when it acted?" by looking up the
//! [`SnapshotStore`] at `now - clamp(latency, min, max)`, and validates a
//! claimed hit position against the entity's position in that rewound view.
//! Clamping keeps a client from buying arbitrary rewind depth by reporting
//! an inflated latency.

use std::sync::Arc;
use std::time::Duration;

use glam::DVec2;

use crate::clock::{Clock, SystemClock};
use crate::snapshot::{EntityId, SnapshotStore, WorldSnapshot};

#[derive(Debug, Clone)]
pub struct RewindResult {
    pub success: bool,
    pub snapshot: Option<WorldSnapshot>,
    /// May be negative: `now - clamped_latency` can fall before any stored
    /// snapshot when latency is clamped down hard.
    pub compensated_time: i64,
    pub actual_latency: Duration,
    pub was_clamped: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LagCompensationConfig {
    pub min_compensation: Duration,
    pub max_compensation: Duration,
}

impl Default for LagCompensationConfig {
    fn default() -> Self {
        Self {
            min_compensation: Duration::from_millis(10),
            max_compensation: Duration::from_millis(500),
        }
    }
}

impl LagCompensationConfig {
    /// Looser clamp for deployments that expect long-haul connections.
    pub fn high_latency_profile() -> Self {
        Self {
            min_compensation: Duration::from_millis(10),
            max_compensation: Duration::from_millis(5000),
        }
    }
}

pub struct LagCompensator {
    store: SnapshotStore,
    config: LagCompensationConfig,
    clock: Arc<dyn Clock>,
}

impl LagCompensator {
    pub fn new(store: SnapshotStore, config: LagCompensationConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: SnapshotStore,
        config: LagCompensationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn record(&self, snapshot: WorldSnapshot) -> u64 {
        self.store.record(snapshot)
    }

    pub fn rewind(&self, latency: Duration) -> RewindResult {
        let clamped = latency.clamp(self.config.min_compensation, self.config.max_compensation);
        let was_clamped = clamped != latency;
        let now = self.clock.now_ms() as i64;
        let compensated_time = now - clamped.as_millis() as i64;

        let snapshot = if compensated_time >= 0 {
            self.store.by_timestamp(compensated_time as u64)
        } else {
            None
        };

        RewindResult {
            success: snapshot.is_some(),
            snapshot,
            compensated_time,
            actual_latency: latency,
            was_clamped,
        }
    }

    /// Rewinds using `shooter_latency`, then checks that `claimed_hit_position`
    /// is within `hit_radius` of `target_id`'s position in that rewound view.
    pub fn validate_hit(
        &self,
        shooter_id: EntityId,
        target_id: EntityId,
        claimed_hit_position: DVec2,
        shooter_latency: Duration,
        hit_radius: f64,
    ) -> (bool, &'static str) {
        let rewind = self.rewind(shooter_latency);
        let Some(snapshot) = rewind.snapshot else {
            return (false, "no-snapshot");
        };

        if !snapshot.entities.contains_key(&shooter_id) || !snapshot.entities.contains_key(&target_id)
        {
            return (false, "entity-missing");
        }

        let target = &snapshot.entities[&target_id];
        let distance = (target.position - claimed_hit_position).length();
        if distance <= hit_radius {
            (true, "")
        } else {
            (false, "out-of-range")
        }
    }

    pub fn position_at(&self, entity_id: EntityId, t: u64) -> Option<DVec2> {
        self.store
            .by_timestamp(t)
            .and_then(|snap| snap.entities.get(&entity_id).map(|e| e.position))
    }

    pub fn interpolated_position_at(&self, entity_id: EntityId, t: u64) -> Option<DVec2> {
        self.store
            .interpolate_entity(entity_id, t)
            .map(|e| e.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::snapshot::EntitySnapshot;

    fn store_with_linear_motion() -> SnapshotStore {
        let store = SnapshotStore::new(16);
        for (t, x) in [(0u64, 0.0), (50, 25.0), (100, 50.0), (150, 75.0), (200, 100.0)] {
            let mut snap = WorldSnapshot::new(t);
            snap.insert(EntitySnapshot::new(1, DVec2::new(x, 0.0), DVec2::new(50.0, 0.0)));
            store.record(snap);
        }
        store
    }

    #[test]
    fn fair_hit_within_clamp() {
        let clock = Arc::new(FixedClock::new(250));
        let compensator = LagCompensator::with_clock(
            store_with_linear_motion(),
            LagCompensationConfig::default(),
            clock,
        );

        let (hit, reason) = compensator.validate_hit(
            0,
            1,
            DVec2::new(75.0, 0.0),
            Duration::from_millis(100),
            5.0,
        );
        assert!(hit, "expected a hit, got reason {reason}");
    }

    #[test]
    fn clamped_exploitation_yields_no_snapshot() {
        let clock = Arc::new(FixedClock::new(250));
        let compensator = LagCompensator::with_clock(
            store_with_linear_motion(),
            LagCompensationConfig::default(),
            clock,
        );

        let rewind = compensator.rewind(Duration::from_millis(10_000));
        assert!(rewind.was_clamped);
        assert_eq!(rewind.compensated_time, 250 - 500);
        assert!(!rewind.success);

        let (hit, reason) = compensator.validate_hit(
            0,
            1,
            DVec2::new(75.0, 0.0),
            Duration::from_millis(10_000),
            5.0,
        );
        assert!(!hit);
        assert_eq!(reason, "no-snapshot");
    }

    #[test]
    fn clamping_is_reported_exactly_at_boundary_conditions() {
        let clock = Arc::new(FixedClock::new(1000));
        let compensator = LagCompensator::with_clock(
            SnapshotStore::new(4),
            LagCompensationConfig::default(),
            clock,
        );

        assert!(compensator.rewind(Duration::from_millis(1)).was_clamped);
        assert!(!compensator.rewind(Duration::from_millis(100)).was_clamped);
        assert!(compensator.rewind(Duration::from_millis(501)).was_clamped);
    }

    #[test]
    fn hit_impossible_when_entity_missing() {
        let store = SnapshotStore::new(4);
        let clock = Arc::new(FixedClock::new(100));
        let mut snap = WorldSnapshot::new(50);
        snap.insert(EntitySnapshot::new(1, DVec2::ZERO, DVec2::ZERO));
        store.record(snap);

        let compensator = LagCompensator::with_clock(store, LagCompensationConfig::default(), clock);
        let (hit, reason) = compensator.validate_hit(
            2, // shooter absent from the snapshot
            1,
            DVec2::ZERO,
            Duration::from_millis(10),
            5.0,
        );
        assert!(!hit);
        assert_eq!(reason, "entity-missing");
    }
}
