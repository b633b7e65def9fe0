use std::time::Duration;

use dual::{ClientConfig as TransportConfig, SnapshotStore};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_address: String,
    pub connect_timeout: Duration,
    pub snapshot_capacity: usize,
    /// How far behind "now" remote entities are rendered, trading latency
    /// for a steady supply of bracketing snapshots to interpolate between.
    pub interpolation_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7777".to_string(),
            connect_timeout: Duration::from_secs(5),
            snapshot_capacity: SnapshotStore::DEFAULT_CAPACITY,
            interpolation_delay: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            server_address: self.server_address.clone(),
            connect_timeout: self.connect_timeout,
            ..Default::default()
        }
    }
}
