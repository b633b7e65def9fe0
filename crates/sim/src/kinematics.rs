//! The pure `apply(position, velocity, input, dt) -> (position, velocity)`
//! function the networking core's `Predictor` treats as an external
//! dependency (see the "Input application function" design note). Both the
//! authoritative server tick and the client predictor call this same
//! function, so prediction matches the server under identical inputs.

use glam::DVec2;

use crate::intent::MoveIntent;

pub const BASE_SPEED: f64 = 4.0;
pub const SPRINT_MULTIPLIER: f64 = 1.8;

pub fn apply(position: DVec2, _velocity: DVec2, intent: &MoveIntent, dt: f64) -> (DVec2, DVec2) {
    let speed = if intent.sprint {
        BASE_SPEED * SPRINT_MULTIPLIER
    } else {
        BASE_SPEED
    };

    let velocity = if intent.direction.length_squared() > 0.0 {
        intent.direction.normalize() * speed
    } else {
        DVec2::ZERO
    };

    (position + velocity * dt, velocity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_intent_zeroes_velocity() {
        let (pos, vel) = apply(DVec2::new(1.0, 1.0), DVec2::new(5.0, 0.0), &MoveIntent::NONE, 0.5);
        assert_eq!(pos, DVec2::new(1.0, 1.0));
        assert_eq!(vel, DVec2::ZERO);
    }

    #[test]
    fn sprint_multiplies_speed() {
        let intent = MoveIntent {
            direction: DVec2::new(1.0, 0.0),
            sprint: true,
            fire: false,
        };
        let (_, vel) = apply(DVec2::ZERO, DVec2::ZERO, &intent, 1.0);
        assert_eq!(vel.x, BASE_SPEED * SPRINT_MULTIPLIER);
    }

    #[test]
    fn diagonal_intent_is_normalized() {
        let intent = MoveIntent {
            direction: DVec2::new(1.0, 1.0),
            sprint: false,
            fire: false,
        };
        let (_, vel) = apply(DVec2::ZERO, DVec2::ZERO, &intent, 1.0);
        assert!((vel.length() - BASE_SPEED).abs() < 1e-9);
    }
}
