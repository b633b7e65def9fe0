//! Client-side prediction with server reconciliation.
//!
//! The predictor hides round-trip latency by applying local input to a
//! locally-held state immediately, then correcting that state when an
//! authoritative [`StateUpdate`](crate::codec::StateUpdate) disagrees. Input
//! application itself is external: this module only ever calls a supplied
//! `apply(position, velocity, input, dt) -> (position, velocity)` function,
//! so the same kinematics used by the authoritative simulation can be handed
//! to both sides.

use std::collections::VecDeque;
use std::sync::Mutex;

use glam::DVec2;

/// A state produced by [`Predictor::predict`], indexed by the input
/// sequence that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub sequence: u32,
    pub timestamp: u64,
    pub position: DVec2,
    pub velocity: DVec2,
}

/// Below this absolute difference (applied independently to x and y, for
/// both position and velocity) a server correction is treated as a match
/// and discarded rather than applied, to suppress floating-point jitter.
pub const DEFAULT_EPSILON: f64 = 0.01;

struct HistoryEntry<I> {
    sequence: u32,
    timestamp: u64,
    input: I,
    dt: f64,
    state: PredictedState,
}

struct Inner<I> {
    history: VecDeque<HistoryEntry<I>>,
    current: PredictedState,
    last_acknowledged_sequence: u32,
    next_sequence: u32,
    max_history: usize,
}

/// `I` is the caller's input type (must be `Clone` to support replay); `F`
/// is the pure kinematics function supplied by the simulation layer.
pub struct Predictor<I, F>
where
    F: Fn(DVec2, DVec2, &I, f64) -> (DVec2, DVec2) + Send + Sync,
{
    apply: F,
    epsilon: f64,
    inner: Mutex<Inner<I>>,
}

impl<I, F> Predictor<I, F>
where
    I: Clone,
    F: Fn(DVec2, DVec2, &I, f64) -> (DVec2, DVec2) + Send + Sync,
{
    pub const DEFAULT_MAX_HISTORY: usize = 128;

    pub fn new(apply: F) -> Self {
        Self::with_initial_state(apply, PredictedState {
            sequence: 0,
            timestamp: 0,
            position: DVec2::ZERO,
            velocity: DVec2::ZERO,
        })
    }

    pub fn with_initial_state(apply: F, initial: PredictedState) -> Self {
        Self {
            apply,
            epsilon: DEFAULT_EPSILON,
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(Self::DEFAULT_MAX_HISTORY),
                current: initial,
                last_acknowledged_sequence: 0,
                next_sequence: 1,
                max_history: Self::DEFAULT_MAX_HISTORY,
            }),
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_history(self, max_history: usize) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.max_history = max_history;
        }
        self
    }

    /// Applies `input` over `delta_time` to the current state, assigns it
    /// the next input sequence, records it in history (evicting the oldest
    /// entry if the history bound is exceeded), and returns the new state.
    pub fn predict(&self, input: I, timestamp: u64, delta_time: f64) -> PredictedState {
        let mut inner = self.inner.lock().unwrap();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let (position, velocity) =
            (self.apply)(inner.current.position, inner.current.velocity, &input, delta_time);
        let state = PredictedState {
            sequence,
            timestamp,
            position,
            velocity,
        };

        if inner.history.len() >= inner.max_history {
            inner.history.pop_front();
        }
        inner.history.push_back(HistoryEntry {
            sequence,
            timestamp,
            input,
            dt: delta_time,
            state,
        });
        inner.current = state;
        state
    }

    /// Corrects predicted state against an authoritative server update.
    pub fn reconcile(&self, server_sequence: u32, server_position: DVec2, server_velocity: DVec2) {
        let mut inner = self.inner.lock().unwrap();

        if server_sequence <= inner.last_acknowledged_sequence {
            return;
        }

        let found = inner
            .history
            .iter()
            .position(|entry| entry.sequence == server_sequence);

        let Some(index) = found else {
            // Older than our oldest retained history: trust the server
            // outright and drop everything we had predicted.
            inner.current = PredictedState {
                sequence: server_sequence,
                timestamp: inner.current.timestamp,
                position: server_position,
                velocity: server_velocity,
            };
            inner.history.clear();
            inner.last_acknowledged_sequence = server_sequence;
            return;
        };

        let local = inner.history[index].state;
        let close_enough = (local.position - server_position).abs().max_element() <= self.epsilon
            && (local.velocity - server_velocity).abs().max_element() <= self.epsilon;

        if close_enough {
            inner.last_acknowledged_sequence = server_sequence;
            return;
        }

        let mut position = server_position;
        let mut velocity = server_velocity;
        let mut replay_timestamp = inner.history[index].timestamp;

        // Replay every input issued after the corrected sequence, in the
        // exact order they were originally applied.
        let replay: Vec<(u32, I, f64, u64)> = inner
            .history
            .iter()
            .skip(index + 1)
            .map(|entry| (entry.sequence, entry.input.clone(), entry.dt, entry.timestamp))
            .collect();

        let mut last_sequence = server_sequence;
        for (sequence, input, dt, timestamp) in replay {
            let (p, v) = (self.apply)(position, velocity, &input, dt);
            position = p;
            velocity = v;
            replay_timestamp = timestamp;
            last_sequence = sequence;
        }

        inner.current = PredictedState {
            sequence: last_sequence,
            timestamp: replay_timestamp,
            position,
            velocity,
        };
        inner.history.retain(|entry| entry.sequence > server_sequence);
        inner.last_acknowledged_sequence = server_sequence;
    }

    pub fn current_state(&self) -> PredictedState {
        self.inner.lock().unwrap().current
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.history.clear();
        inner.last_acknowledged_sequence = 0;
        inner.next_sequence = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn move_x_by_one(position: DVec2, velocity: DVec2, _input: &(), _dt: f64) -> (DVec2, DVec2) {
        (position + DVec2::new(1.0, 0.0), velocity)
    }

    #[test]
    fn reconciliation_replay_matches_scenario() {
        let predictor = Predictor::new(move_x_by_one);
        predictor.predict((), 1, 1.0);
        predictor.predict((), 2, 1.0);
        predictor.predict((), 3, 1.0);
        assert_eq!(predictor.current_state().position.x, 3.0);

        predictor.reconcile(1, DVec2::new(2.0, 0.0), DVec2::ZERO);
        assert_eq!(predictor.current_state().position.x, 4.0);
    }

    #[test]
    fn stale_reconciliation_is_ignored() {
        let predictor = Predictor::new(move_x_by_one);
        predictor.predict((), 1, 1.0);
        predictor.reconcile(1, DVec2::new(5.0, 0.0), DVec2::ZERO);
        let after_first = predictor.current_state();

        predictor.reconcile(0, DVec2::new(99.0, 0.0), DVec2::ZERO);
        assert_eq!(predictor.current_state(), after_first);
    }

    #[test]
    fn idempotent_reconciliation() {
        let predictor = Predictor::new(move_x_by_one);
        predictor.predict((), 1, 1.0);
        predictor.predict((), 2, 1.0);

        predictor.reconcile(1, DVec2::new(10.0, 0.0), DVec2::ZERO);
        let once = predictor.current_state();
        predictor.reconcile(1, DVec2::new(10.0, 0.0), DVec2::ZERO);
        let twice = predictor.current_state();
        assert_eq!(once, twice);
    }

    #[test]
    fn no_op_when_within_epsilon() {
        let predictor = Predictor::new(move_x_by_one);
        predictor.predict((), 1, 1.0);
        let before = predictor.current_state();
        // Server agrees within epsilon: no replay should occur.
        predictor.reconcile(1, DVec2::new(1.0 + 0.001, 0.0), DVec2::ZERO);
        assert_eq!(predictor.current_state(), before);
    }

    #[test]
    fn replay_is_deterministic_across_instances() {
        let a = Predictor::new(move_x_by_one);
        let b = Predictor::new(move_x_by_one);
        for seq in 1..=5u64 {
            a.predict((), seq, 1.0);
            b.predict((), seq, 1.0);
        }
        a.reconcile(2, DVec2::new(1.5, 0.0), DVec2::ZERO);
        b.reconcile(2, DVec2::new(1.5, 0.0), DVec2::ZERO);
        assert_eq!(a.current_state(), b.current_state());
    }

    #[test]
    fn reset_on_sequence_older_than_history() {
        let predictor = Predictor::new(move_x_by_one);
        predictor.predict((), 1, 1.0);
        predictor.predict((), 2, 1.0);
        // Server sequence far newer than anything retained.
        predictor.reconcile(50, DVec2::new(7.0, 0.0), DVec2::new(1.0, 0.0));
        let state = predictor.current_state();
        assert_eq!(state.position, DVec2::new(7.0, 0.0));
        assert_eq!(state.velocity, DVec2::new(1.0, 0.0));
    }
}
