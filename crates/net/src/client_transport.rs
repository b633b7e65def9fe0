//! Owns a single connection to a [`ServerTransport`](crate::server_transport::ServerTransport).
//!
//! ```text
//!   connect() --> spawns recv + send tasks --> Connected
//!       |                                          |
//!   send_input()  --(queue)-->  send task  --write--> server
//!       |                                          |
//!   state_updates <--(channel)-- recv task <--read-- server
//!       |                                          |
//!   disconnect() --> abort tasks, close channels --> Disconnected
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{decode_state_update, encode_input_command, InputCommand, StateUpdate};
use crate::error::{ClientError, TransportError};
use crate::framing::{read_frame, write_frame};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_address: String,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub max_latency: Duration,
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7777".to_string(),
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_millis(250),
            max_latency: Duration::from_millis(500),
            buffer_size: 256,
        }
    }
}

struct OutboundInput {
    input_type: String,
    data: Vec<u8>,
    sequence: u32,
    timestamp: u64,
}

struct ActiveConnection {
    outbound: mpsc::Sender<OutboundInput>,
    recv_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

/// Establishes and maintains one server connection. `player_id` is set
/// externally once the (out-of-scope) authentication handshake completes;
/// the transport itself treats it as an opaque tag stamped on outgoing
/// input commands.
pub struct ClientTransport {
    config: ClientConfig,
    connected: Arc<AtomicBool>,
    player_id: AtomicU64,
    input_sequence: AtomicU32,
    last_state_sequence_seen: AtomicU32,
    latency_ms: AtomicU64,
    active: Mutex<Option<ActiveConnection>>,
    state_tx: mpsc::Sender<StateUpdate>,
    state_rx: Mutex<Option<mpsc::Receiver<StateUpdate>>>,
    error_tx: mpsc::Sender<TransportError>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
}

impl ClientTransport {
    pub fn new(config: ClientConfig) -> Self {
        let (state_tx, state_rx) = mpsc::channel(config.buffer_size);
        let (error_tx, error_rx) = mpsc::channel(64);
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            player_id: AtomicU64::new(0),
            input_sequence: AtomicU32::new(0),
            last_state_sequence_seen: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            active: Mutex::new(None),
            state_tx,
            state_rx: Mutex::new(Some(state_rx)),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub fn set_player_id(&self, player_id: u64) {
        self.player_id.store(player_id, Ordering::SeqCst);
    }

    pub fn player_id(&self) -> u64 {
        self.player_id.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::SeqCst))
    }

    /// Called by whatever latency-measurement mechanism the caller wires up
    /// (the wire format for it is left unspecified; see the crate docs).
    pub fn record_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        let addr: SocketAddr = self
            .config
            .server_address
            .parse()
            .map_err(|_| ClientError::DialFailed(std::io::ErrorKind::InvalidInput.into()))?;

        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::DialFailed(err));
            }
            Err(_) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::DialTimeout);
            }
        };

        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.buffer_size);

        let connected = self.connected.clone();
        let state_tx = self.state_tx.clone();
        let error_tx = self.error_tx.clone();
        let recv_task = tokio::spawn(async move {
            receive_loop(read_half, state_tx, error_tx, connected).await;
        });

        let connected_send = self.connected.clone();
        let error_tx_send = self.error_tx.clone();
        let send_task = tokio::spawn(async move {
            send_loop(write_half, outbound_rx, error_tx_send, connected_send).await;
        });

        *self.active.lock().unwrap() = Some(ActiveConnection {
            outbound: outbound_tx,
            recv_task,
            send_task,
        });

        Ok(())
    }

    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(active) = self.active.lock().unwrap().take() {
            active.recv_task.abort();
            active.send_task.abort();
        }
    }

    /// Assigns the next input sequence and enqueues the input. Rejects with
    /// `Backpressure` rather than blocking when the outbound queue is full
    /// — dropped input frames are expected to be tolerable to callers.
    pub fn send_input(&self, input_type: impl Into<String>, data: Vec<u8>) -> Result<(), ClientError> {
        let active = self.active.lock().unwrap();
        let Some(active) = active.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        let sequence = self.input_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let timestamp = now_ms();
        active
            .outbound
            .try_send(OutboundInput {
                input_type: input_type.into(),
                data,
                sequence,
                timestamp,
            })
            .map_err(|_| ClientError::Backpressure)
    }

    pub fn last_state_sequence_seen(&self) -> u32 {
        self.last_state_sequence_seen.load(Ordering::SeqCst)
    }

    pub fn state_update_channel(&self) -> Option<mpsc::Receiver<StateUpdate>> {
        self.state_rx.lock().unwrap().take()
    }

    pub fn error_channel(&self) -> Option<mpsc::Receiver<TransportError>> {
        self.error_rx.lock().unwrap().take()
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn receive_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    state_tx: mpsc::Sender<StateUpdate>,
    error_tx: mpsc::Sender<TransportError>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let body = match read_frame(&mut reader).await {
            Ok(body) => body,
            Err(err) => {
                let _ = error_tx
                    .send(match err {
                        crate::error::FrameError::Io(io_err) => TransportError::Io(io_err),
                        crate::error::FrameError::TooLarge(claimed, max) => {
                            TransportError::Protocol(crate::error::CodecError::BadLength {
                                field: "frame",
                                claimed: claimed as usize,
                                available: max as usize,
                            })
                        }
                    })
                    .await;
                break;
            }
        };
        match decode_state_update(&body) {
            Ok(update) => {
                if state_tx.send(update).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = error_tx.send(TransportError::Protocol(err)).await;
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

async fn send_loop(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<OutboundInput>,
    error_tx: mpsc::Sender<TransportError>,
    connected: Arc<AtomicBool>,
) {
    // player_id is stamped by the caller via InputCommand defaults; the
    // server overwrites it anyway, so the client's own value is advisory.
    while let Some(pending) = outbound_rx.recv().await {
        let command = InputCommand {
            player_id: 0,
            timestamp: pending.timestamp,
            sequence: pending.sequence,
            input_type: pending.input_type,
            data: pending.data,
        };
        let bytes = match encode_input_command(&command) {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = error_tx.send(TransportError::Protocol(err)).await;
                continue;
            }
        };
        if let Err(err) = write_frame(&mut writer, &bytes).await {
            let _ = error_tx
                .send(match err {
                    crate::error::FrameError::Io(io_err) => TransportError::Io(io_err),
                    crate::error::FrameError::TooLarge(claimed, max) => {
                        TransportError::Protocol(crate::error::CodecError::BadLength {
                            field: "frame",
                            claimed: claimed as usize,
                            available: max as usize,
                        })
                    }
                })
                .await;
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_transport::{ServerConfig, ServerTransport};

    #[tokio::test]
    async fn connect_and_send_input_round_trip() {
        let server = ServerTransport::new(ServerConfig {
            bind_address: "127.0.0.1:27401".to_string(),
            ..Default::default()
        });
        let mut input_rx = server.input_channel().unwrap();
        server.start().await.unwrap();

        let client = ClientTransport::new(ClientConfig {
            server_address: "127.0.0.1:27401".to_string(),
            ..Default::default()
        });
        client.connect().await.unwrap();
        assert!(client.is_connected());

        client.send_input("move", vec![1, 2, 3]).unwrap();
        let received = input_rx.recv().await.unwrap();
        assert_eq!(received.input_type, "move");
        assert_eq!(received.data, vec![1, 2, 3]);
        assert_eq!(received.sequence, 1);

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let server = ServerTransport::new(ServerConfig {
            bind_address: "127.0.0.1:27402".to_string(),
            ..Default::default()
        });
        server.start().await.unwrap();

        let client = ClientTransport::new(ClientConfig {
            server_address: "127.0.0.1:27402".to_string(),
            ..Default::default()
        });
        client.connect().await.unwrap();
        let second = client.connect().await;
        assert!(matches!(second, Err(ClientError::AlreadyConnected)));

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn send_input_without_connection_is_not_connected() {
        let client = ClientTransport::new(ClientConfig::default());
        let result = client.send_input("move", vec![]);
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn backpressure_rejects_rather_than_blocks() {
        let server = ServerTransport::new(ServerConfig {
            bind_address: "127.0.0.1:27403".to_string(),
            ..Default::default()
        });
        server.start().await.unwrap();

        let client = ClientTransport::new(ClientConfig {
            server_address: "127.0.0.1:27403".to_string(),
            buffer_size: 2,
            ..Default::default()
        });
        client.connect().await.unwrap();

        let mut last_result = Ok(());
        for _ in 0..1000 {
            last_result = client.send_input("spam", vec![0; 64]);
            if last_result.is_err() {
                break;
            }
        }
        assert!(matches!(last_result, Err(ClientError::Backpressure)));

        client.disconnect().await;
        server.stop().await;
    }
}
