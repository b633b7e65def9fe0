//! The authoritative game loop: owns the [`dual::ServerTransport`], the
//! [`dual_sim::World`] it replicates, and the [`dual::LagCompensator`] used
//! to validate fire commands against what a laggy client actually saw.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dual::{Clock, InputCommand, LagCompensator, PlayerId, ServerTransport, StateUpdate};
use dual_sim::{components, EntityId, EntityKind, MoveIntent, World};
use glam::DVec2;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::events::ServerEvent;

const HIT_RADIUS: f64 = 1.5;
const SPAWN_RADIUS: f64 = 8.0;

#[derive(Debug, Clone, Copy)]
pub struct ServerStats {
    pub tick: u64,
    pub player_count: usize,
    pub entity_count: usize,
}

/// Per-player bookkeeping the world itself doesn't need to know about.
struct PlayerState {
    entity_id: EntityId,
    /// Rough one-way latency estimate derived from the gap between a
    /// command's claimed timestamp and the server's receipt time. Stands in
    /// for a dedicated ping/pong exchange (see DESIGN.md).
    latency: Duration,
}

pub struct GameServer {
    transport: Arc<ServerTransport>,
    world: World,
    compensator: LagCompensator,
    config: ServerConfig,
    players: HashMap<PlayerId, PlayerState>,
    tick: u64,
    sequence: u32,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let transport = Arc::new(ServerTransport::new(config.transport_config()));
        let store = dual::SnapshotStore::new(config.snapshot_capacity);
        let compensator = LagCompensator::new(store, config.lag_compensation_config());

        Self {
            transport,
            world: World::new(),
            compensator,
            config,
            players: HashMap::new(),
            tick: 0,
            sequence: 0,
        }
    }

    pub fn transport(&self) -> Arc<ServerTransport> {
        self.transport.clone()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.tick,
            player_count: self.players.len(),
            entity_count: self.world.entity_count(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.transport.start().await.context("binding server transport")
    }

    pub async fn stop(&self) {
        self.transport.stop().await;
    }

    /// Runs the tick loop until the transport's channels are all closed.
    /// Drains join/leave/input/error events as they arrive and advances the
    /// world once per tick, broadcasting a `StateUpdate` per entity after.
    pub async fn run(&mut self, events: mpsc::Sender<ServerEvent>) -> Result<()> {
        let mut join_rx = self
            .transport
            .join_channel()
            .context("join channel already taken")?;
        let mut leave_rx = self
            .transport
            .leave_channel()
            .context("leave channel already taken")?;
        let mut input_rx = self
            .transport
            .input_channel()
            .context("input channel already taken")?;
        let mut error_rx = self
            .transport
            .error_channel()
            .context("error channel already taken")?;

        let mut interval = tokio::time::interval(self.config.tick_duration());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&events).await;
                }
                Some(player_id) = join_rx.recv() => {
                    self.handle_join(player_id, &events).await;
                }
                Some(player_id) = leave_rx.recv() => {
                    self.handle_leave(player_id, &events).await;
                }
                Some(command) = input_rx.recv() => {
                    self.handle_input(command);
                }
                Some(err) = error_rx.recv() => {
                    warn!("transport error: {err}");
                    let _ = events.send(ServerEvent::Error { message: err.to_string() }).await;
                }
                else => break,
            }
        }

        Ok(())
    }

    async fn handle_join(&mut self, player_id: PlayerId, events: &mpsc::Sender<ServerEvent>) {
        let angle = (player_id as f64) * 0.9;
        let spawn = DVec2::new(angle.cos(), angle.sin()) * SPAWN_RADIUS;
        let entity_id = self.world.spawn(EntityKind::Player, spawn);
        self.players.insert(
            player_id,
            PlayerState {
                entity_id,
                latency: Duration::ZERO,
            },
        );
        info!("player {player_id} joined as entity {entity_id}");

        // Told only to this player: lets it tell its own entity apart from
        // the ones it receives on the broadcast channel like everyone else.
        let ack = StateUpdate {
            timestamp: 0,
            entity_id,
            priority: 0,
            sequence: 0,
            components: vec![dual::ComponentData::new(components::OWNER_ACK, Vec::new())],
        };
        if let Err(err) = self.transport.send_to(player_id, &ack) {
            warn!("failed to send owner ack to player {player_id}: {err}");
        }

        let _ = events
            .send(ServerEvent::PlayerJoined { player_id, entity_id })
            .await;
    }

    async fn handle_leave(&mut self, player_id: PlayerId, events: &mpsc::Sender<ServerEvent>) {
        if let Some(state) = self.players.remove(&player_id) {
            self.world.despawn(state.entity_id);
        }
        let _ = events.send(ServerEvent::PlayerLeft { player_id }).await;
    }

    fn handle_input(&mut self, command: InputCommand) {
        let now = self
            .compensator
            .store()
            .stats()
            .newest_timestamp
            .unwrap_or(command.timestamp);
        let Some(state) = self.players.get_mut(&command.player_id) else {
            return;
        };
        state.latency = Duration::from_millis(now.saturating_sub(command.timestamp));

        match command.input_type.as_str() {
            "move" => {
                if let Some(intent) = MoveIntent::decode(&command.data) {
                    self.world.set_intent(state.entity_id, intent);
                    if intent.fire {
                        self.resolve_fire(command.player_id, state.entity_id, state.latency);
                    }
                }
            }
            other => warn!(
                "unrecognized input_type {other:?} from player {}",
                command.player_id
            ),
        }
    }

    /// A claimed hit is checked against where the target *actually was* at
    /// the shooter's rewound point in time, not where it is now.
    fn resolve_fire(&self, shooter_player: PlayerId, shooter_entity: EntityId, latency: Duration) {
        let Some(shooter) = self.world.get(shooter_entity) else {
            return;
        };
        let claimed_position = shooter.position;

        let Some(target) = self
            .world
            .entities()
            .filter(|e| e.id != shooter_entity)
            .min_by(|a, b| {
                a.position
                    .distance_squared(claimed_position)
                    .total_cmp(&b.position.distance_squared(claimed_position))
            })
        else {
            return;
        };

        let (hit, reason) = self.compensator.validate_hit(
            shooter_entity,
            target.id,
            claimed_position,
            latency,
            HIT_RADIUS,
        );
        if hit {
            info!("player {shooter_player} hit entity {}", target.id);
        } else if !reason.is_empty() {
            info!("player {shooter_player} fire rejected: {reason}");
        }
    }

    async fn tick(&mut self, events: &mpsc::Sender<ServerEvent>) {
        self.tick += 1;
        self.world.tick(self.config.tick_duration().as_secs_f64());

        let snapshot = self.build_snapshot();
        let timestamp = snapshot.timestamp;
        self.compensator.record(snapshot);

        self.sequence = self.sequence.wrapping_add(1);
        for entity in self.world.entities() {
            let update = StateUpdate {
                timestamp,
                entity_id: entity.id,
                priority: 0,
                sequence: self.sequence,
                components: vec![
                    dual::ComponentData::new(components::POSITION, components::encode_vec2(entity.position)),
                    dual::ComponentData::new(components::VELOCITY, components::encode_vec2(entity.velocity)),
                    dual::ComponentData::new(components::HP, components::encode_hp(entity.hp)),
                ],
            };
            if let Err(err) = self.transport.broadcast(&update) {
                warn!("broadcast failed: {err}");
                let _ = events
                    .send(ServerEvent::Error { message: err.to_string() })
                    .await;
            }
        }
    }

    fn build_snapshot(&self) -> dual::WorldSnapshot {
        let now = dual::SystemClock.now_ms();
        let mut snapshot = dual::WorldSnapshot::new(now);
        for entity in self.world.entities() {
            snapshot.insert(dual::EntitySnapshot::new(
                entity.id,
                entity.position,
                entity.velocity,
            ));
        }
        snapshot
    }
}
