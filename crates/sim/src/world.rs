//! A minimal authoritative world: just enough entity state for the server
//! host to have something to replicate. This stands in for the real
//! Entity-Component-System simulation the networking core is written
//! against; it owns no networking concerns of its own.

use std::collections::HashMap;

use glam::DVec2;

use crate::intent::MoveIntent;
use crate::kinematics::apply;

pub type EntityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Npc,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: DVec2,
    pub velocity: DVec2,
    pub hp: i32,
    pub intent: MoveIntent,
}

impl Entity {
    fn new(id: EntityId, kind: EntityKind, position: DVec2) -> Self {
        Self {
            id,
            kind,
            position,
            velocity: DVec2::ZERO,
            hp: 100,
            intent: MoveIntent::NONE,
        }
    }
}

/// Owns every replicated entity. `tick` applies each entity's most recently
/// received intent via the shared [`apply`] kinematics function.
#[derive(Default)]
pub struct World {
    entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn spawn(&mut self, kind: EntityKind, position: DVec2) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(id, Entity::new(id, kind, position));
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn set_intent(&mut self, id: EntityId, intent: MoveIntent) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.intent = intent;
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Applies every entity's last-received intent over `dt`.
    pub fn tick(&mut self, dt: f64) {
        for entity in self.entities.values_mut() {
            let (position, velocity) = apply(entity.position, entity.velocity, &entity.intent, dt);
            entity.position = position;
            entity.velocity = velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_despawn() {
        let mut world = World::new();
        let id = world.spawn(EntityKind::Player, DVec2::ZERO);
        assert_eq!(world.entity_count(), 1);
        assert!(world.despawn(id).is_some());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn tick_moves_entity_by_its_intent() {
        let mut world = World::new();
        let id = world.spawn(EntityKind::Player, DVec2::ZERO);
        world.set_intent(
            id,
            MoveIntent {
                direction: DVec2::new(1.0, 0.0),
                sprint: false,
                fire: false,
            },
        );
        world.tick(1.0);
        let entity = world.get(id).unwrap();
        assert!(entity.position.x > 0.0);
    }
}
