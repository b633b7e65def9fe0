//! The opaque simulation layer the networking core is written against: a
//! tiny top-down world of moving entities. Real games plug in an ECS here;
//! this crate exists so the server and client hosts have something to
//! replicate and predict without reaching into `dual`'s internals.

pub mod components;
mod intent;
mod kinematics;
mod world;

pub use intent::MoveIntent;
pub use kinematics::{apply, BASE_SPEED, SPRINT_MULTIPLIER};
pub use world::{Entity, EntityId, EntityKind, World};
