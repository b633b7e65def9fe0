use std::time::Duration;

use dual::{LagCompensationConfig, ServerConfig as TransportConfig, SnapshotStore};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub tick_rate: u32,
    pub max_players: usize,
    pub snapshot_capacity: usize,
    pub per_session_queue_size: usize,
    pub high_latency_profile: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7777".to_string(),
            tick_rate: 20,
            max_players: 64,
            snapshot_capacity: SnapshotStore::DEFAULT_CAPACITY,
            per_session_queue_size: 256,
            high_latency_profile: false,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            bind_address: self.bind_address.clone(),
            max_players: self.max_players,
            per_session_queue_size: self.per_session_queue_size,
            tick_rate: self.tick_rate,
            ..Default::default()
        }
    }

    pub fn lag_compensation_config(&self) -> LagCompensationConfig {
        if self.high_latency_profile {
            LagCompensationConfig::high_latency_profile()
        } else {
            LagCompensationConfig::default()
        }
    }
}
