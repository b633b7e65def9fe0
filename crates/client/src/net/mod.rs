//! Wraps [`dual::ClientTransport`] with the pieces a playable client needs:
//! a [`Predictor`] for local movement prediction and reconciliation, and a
//! [`SnapshotStore`] that accumulates remote entities into a history usable
//! for interpolated playback, same as the server-side lag compensator uses
//! to look backward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use dual::{
    ClientConfig as TransportConfig, ClientError, ClientTransport, EntitySnapshot, PredictedState,
    Predictor, SnapshotStore, StateUpdate, TransportError, WorldSnapshot,
};
use dual_sim::{components, MoveIntent};
use glam::DVec2;
use tokio::sync::mpsc;

type MovePredictor = Predictor<MoveIntent, fn(DVec2, DVec2, &MoveIntent, f64) -> (DVec2, DVec2)>;

pub struct NetworkClient {
    transport: Arc<ClientTransport>,
    predictor: MovePredictor,
    remote: SnapshotStore,
    latest_entities: Mutex<HashMap<u64, EntitySnapshot>>,
    self_entity: AtomicU64,
}

impl NetworkClient {
    pub fn new(config: TransportConfig, snapshot_capacity: usize) -> Self {
        Self {
            transport: Arc::new(ClientTransport::new(config)),
            predictor: Predictor::new(
                dual_sim::apply as fn(DVec2, DVec2, &MoveIntent, f64) -> (DVec2, DVec2),
            ),
            remote: SnapshotStore::new(snapshot_capacity),
            latest_entities: Mutex::new(HashMap::new()),
            self_entity: AtomicU64::new(0),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await.context("connecting to server")
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn latency(&self) -> Duration {
        self.transport.latency()
    }

    pub fn self_entity(&self) -> Option<u64> {
        match self.self_entity.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn predicted_state(&self) -> PredictedState {
        self.predictor.current_state()
    }

    /// Applies `intent` locally for immediate feedback, then forwards it to
    /// the server for authoritative replay.
    pub fn send_intent(
        &self,
        intent: MoveIntent,
        timestamp: u64,
        dt: f64,
    ) -> Result<PredictedState, ClientError> {
        let predicted = self.predictor.predict(intent, timestamp, dt);
        self.transport.send_input("move", intent.encode())?;
        Ok(predicted)
    }

    pub fn state_update_channel(&self) -> Option<mpsc::Receiver<StateUpdate>> {
        self.transport.state_update_channel()
    }

    pub fn error_channel(&self) -> Option<mpsc::Receiver<TransportError>> {
        self.transport.error_channel()
    }

    /// Folds one incoming `StateUpdate` into the remote entity history,
    /// reconciling the local predictor when the update describes our own
    /// entity.
    pub fn ingest(&self, update: StateUpdate) {
        if update.components.iter().any(|c| c.type_name == components::OWNER_ACK) {
            self.self_entity.store(update.entity_id, Ordering::SeqCst);
            return;
        }

        let position = update
            .components
            .iter()
            .find(|c| c.type_name == components::POSITION)
            .and_then(|c| components::decode_vec2(&c.data))
            .unwrap_or_default();
        let velocity = update
            .components
            .iter()
            .find(|c| c.type_name == components::VELOCITY)
            .and_then(|c| components::decode_vec2(&c.data))
            .unwrap_or_default();

        if self.self_entity.load(Ordering::SeqCst) == update.entity_id {
            self.predictor.reconcile(update.sequence, position, velocity);
        }

        let mut entity = EntitySnapshot::new(update.entity_id, position, velocity);
        for component in &update.components {
            entity
                .components
                .insert(component.type_name.clone(), component.data.clone());
        }

        let mut entities = self.latest_entities.lock().unwrap();
        entities.insert(update.entity_id, entity);

        let mut snapshot = WorldSnapshot::new(update.timestamp);
        for entity in entities.values() {
            snapshot.insert(entity.clone());
        }
        self.remote.record(snapshot);
    }

    pub fn interpolated_remote(&self, entity_id: u64, t: u64) -> Option<EntitySnapshot> {
        self.remote.interpolate_entity(entity_id, t)
    }

    pub fn remote_entities(&self) -> Vec<u64> {
        self.latest_entities.lock().unwrap().keys().copied().collect()
    }
}
