//! Accepts client connections, demultiplexes their input onto a shared
//! channel, and fans authoritative state back out.
//!
//! Each accepted connection gets its own receive and send task. The two
//! communicate with the rest of the transport only through bounded
//! channels and a session map guarded by a plain mutex — no cross-session
//! lock is ever held across an `.await`, so one slow or dead peer cannot
//! stall another.
//!
//! ```text
//!           accept task
//!                |
//!      +---------+---------+
//!      |                   |
//!  recv task           send task      (per session)
//!      |                   |
//!   input_commands    outbound queue
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::codec::{decode_input_command, encode_state_update, InputCommand, StateUpdate};
use crate::error::{CodecError, ServerError, TransportError};
use crate::framing::{read_frame, write_frame};

pub type PlayerId = u64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub max_players: usize,
    pub per_session_queue_size: usize,
    pub tick_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7777".to_string(),
            max_players: 64,
            per_session_queue_size: 256,
            tick_rate: 20,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
        }
    }
}

struct Session {
    outbound: mpsc::Sender<Vec<u8>>,
    recv_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

struct ServerState {
    config: ServerConfig,
    sessions: Mutex<HashMap<PlayerId, Session>>,
    next_player_id: AtomicU64,
    input_tx: mpsc::Sender<InputCommand>,
    join_tx: mpsc::Sender<PlayerId>,
    leave_tx: mpsc::Sender<PlayerId>,
    error_tx: mpsc::Sender<TransportError>,
}

impl ServerState {
    /// Removes a session and emits `player_leave`, if the session was still
    /// present. Safe to call from both the receive and send task: only the
    /// first caller for a given player actually does anything.
    async fn close_session(self: &Arc<Self>, player_id: PlayerId) {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.remove(&player_id)
        };
        let Some(session) = removed else {
            return;
        };
        session.recv_task.abort();
        session.send_task.abort();
        let _ = self.leave_tx.send(player_id).await;
        info!("player {player_id} disconnected");
    }
}

/// Accepts connections and owns zero or more active client sessions.
pub struct ServerTransport {
    state: Arc<ServerState>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    input_rx: Mutex<Option<mpsc::Receiver<InputCommand>>>,
    join_rx: Mutex<Option<mpsc::Receiver<PlayerId>>>,
    leave_rx: Mutex<Option<mpsc::Receiver<PlayerId>>>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
}

impl ServerTransport {
    pub fn new(config: ServerConfig) -> Self {
        let (input_tx, input_rx) = mpsc::channel(1024);
        let (join_tx, join_rx) = mpsc::channel(64);
        let (leave_tx, leave_rx) = mpsc::channel(64);
        let (error_tx, error_rx) = mpsc::channel(256);

        let state = Arc::new(ServerState {
            config,
            sessions: Mutex::new(HashMap::new()),
            next_player_id: AtomicU64::new(1),
            input_tx,
            join_tx,
            leave_tx,
            error_tx,
        });

        Self {
            state,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            accept_task: Mutex::new(None),
            input_rx: Mutex::new(Some(input_rx)),
            join_rx: Mutex::new(Some(join_rx)),
            leave_rx: Mutex::new(Some(leave_rx)),
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub async fn start(&self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.state.config.bind_address)
            .await
            .map_err(ServerError::BindFailed)?;

        let state = self.state.clone();
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                accept_connection(&state, stream, addr).await;
                            }
                            Err(err) => {
                                warn!("accept failed: {err}");
                                let _ = state.error_tx.send(TransportError::Io(err)).await;
                            }
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.accept_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();

        if let Some(handle) = self.accept_task.lock().unwrap().take() {
            let _ = handle.await;
        }

        let sessions: Vec<(PlayerId, Session)> =
            self.state.sessions.lock().unwrap().drain().collect();
        for (player_id, session) in sessions {
            session.recv_task.abort();
            session.send_task.abort();
            let _ = self.state.leave_tx.send(player_id).await;
        }
    }

    pub fn player_count(&self) -> usize {
        self.state.sessions.lock().unwrap().len()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.state.sessions.lock().unwrap().keys().copied().collect()
    }

    /// Serializes `update` once and enqueues it on every session's outbound
    /// queue. A session whose queue is full is dropped rather than allowed
    /// to stall the broadcast.
    pub fn broadcast(&self, update: &StateUpdate) -> Result<(), ServerError> {
        let bytes = encode_state_update(update)?;
        let mut overflowed = Vec::new();
        {
            let sessions = self.state.sessions.lock().unwrap();
            for (player_id, session) in sessions.iter() {
                if session.outbound.try_send(bytes.clone()).is_err() {
                    overflowed.push(*player_id);
                }
            }
        }
        for player_id in overflowed {
            let state = self.state.clone();
            tokio::spawn(async move {
                let _ = state
                    .error_tx
                    .send(TransportError::QueueOverflow)
                    .await;
                state.close_session(player_id).await;
            });
        }
        Ok(())
    }

    pub fn send_to(&self, player_id: PlayerId, update: &StateUpdate) -> Result<(), ServerError> {
        let bytes = encode_state_update(update)?;
        let sessions = self.state.sessions.lock().unwrap();
        let session = sessions
            .get(&player_id)
            .ok_or(ServerError::UnknownPlayer(player_id))?;
        if session.outbound.try_send(bytes).is_err() {
            let state = self.state.clone();
            tokio::spawn(async move { state.close_session(player_id).await });
        }
        Ok(())
    }

    pub fn input_channel(&self) -> Option<mpsc::Receiver<InputCommand>> {
        self.input_rx.lock().unwrap().take()
    }

    pub fn join_channel(&self) -> Option<mpsc::Receiver<PlayerId>> {
        self.join_rx.lock().unwrap().take()
    }

    pub fn leave_channel(&self) -> Option<mpsc::Receiver<PlayerId>> {
        self.leave_rx.lock().unwrap().take()
    }

    pub fn error_channel(&self) -> Option<mpsc::Receiver<TransportError>> {
        self.error_rx.lock().unwrap().take()
    }
}

async fn accept_connection(state: &Arc<ServerState>, stream: TcpStream, addr: SocketAddr) {
    if state.sessions.lock().unwrap().len() >= state.config.max_players {
        warn!("rejecting {addr}: server full");
        drop(stream);
        return;
    }

    let player_id = state.next_player_id.fetch_add(1, Ordering::SeqCst);
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.per_session_queue_size);

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        receive_loop(recv_state, player_id, read_half).await;
    });

    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        send_loop(send_state, player_id, write_half, outbound_rx).await;
    });

    state.sessions.lock().unwrap().insert(
        player_id,
        Session {
            outbound: outbound_tx,
            recv_task,
            send_task,
        },
    );

    let _ = state.join_tx.send(player_id).await;
    info!("player {player_id} connected from {addr}");
}

async fn receive_loop(state: Arc<ServerState>, player_id: PlayerId, mut reader: tokio::net::tcp::OwnedReadHalf) {
    loop {
        let body = match read_frame(&mut reader).await {
            Ok(body) => body,
            Err(err) => {
                let _ = state.error_tx.send(err.into()).await;
                break;
            }
        };
        match decode_input_command(&body) {
            Ok(mut command) => {
                // Server is authoritative over identity: never trust the
                // PlayerId embedded on the wire.
                command.player_id = player_id;
                if state.input_tx.send(command).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = state.error_tx.send(TransportError::Protocol(err)).await;
                break;
            }
        }
    }
    state.close_session(player_id).await;
}

async fn send_loop(
    state: Arc<ServerState>,
    player_id: PlayerId,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(body) = outbound_rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &body).await {
            let _ = state.error_tx.send(err.into()).await;
            break;
        }
    }
    state.close_session(player_id).await;
}

impl From<crate::error::FrameError> for TransportError {
    fn from(err: crate::error::FrameError) -> Self {
        match err {
            crate::error::FrameError::Io(io_err) => TransportError::Io(io_err),
            crate::error::FrameError::TooLarge(claimed, max) => {
                TransportError::Protocol(CodecError::BadLength {
                    field: "frame",
                    claimed: claimed as usize,
                    available: max as usize,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ComponentData;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream as ClientStream;

    fn test_config(port: u16) -> ServerConfig {
        ServerConfig {
            bind_address: format!("127.0.0.1:{port}"),
            max_players: 2,
            per_session_queue_size: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn join_and_leave_fidelity() {
        let transport = ServerTransport::new(test_config(27301));
        let mut join_rx = transport.join_channel().unwrap();
        let mut leave_rx = transport.leave_channel().unwrap();
        transport.start().await.unwrap();

        let stream = ClientStream::connect("127.0.0.1:27301").await.unwrap();
        let player_id = join_rx.recv().await.unwrap();
        assert_eq!(player_id, 1);
        assert_eq!(transport.player_count(), 1);

        drop(stream);
        let left = leave_rx.recv().await.unwrap();
        assert_eq!(left, player_id);

        transport.stop().await;
    }

    #[tokio::test]
    async fn input_commands_carry_authoritative_player_id() {
        let transport = ServerTransport::new(test_config(27302));
        let mut join_rx = transport.join_channel().unwrap();
        let mut input_rx = transport.input_channel().unwrap();
        transport.start().await.unwrap();

        let mut stream = ClientStream::connect("127.0.0.1:27302").await.unwrap();
        let assigned = join_rx.recv().await.unwrap();

        let spoofed = crate::codec::InputCommand {
            player_id: 999,
            timestamp: 1,
            sequence: 1,
            input_type: "move".to_string(),
            data: vec![],
        };
        let body = crate::codec::encode_input_command(&spoofed).unwrap();
        let mut framed = (body.len() as u32).to_le_bytes().to_vec();
        framed.extend_from_slice(&body);
        stream.write_all(&framed).await.unwrap();

        let received = input_rx.recv().await.unwrap();
        assert_eq!(received.player_id, assigned);

        transport.stop().await;
    }

    #[tokio::test]
    async fn max_players_rejects_over_capacity_connection() {
        let transport = ServerTransport::new(test_config(27303));
        let mut join_rx = transport.join_channel().unwrap();
        transport.start().await.unwrap();

        let _a = ClientStream::connect("127.0.0.1:27303").await.unwrap();
        join_rx.recv().await.unwrap();
        let _b = ClientStream::connect("127.0.0.1:27303").await.unwrap();
        join_rx.recv().await.unwrap();

        // Third connection exceeds max_players(2) and should be closed
        // without ever showing up on the join channel.
        let mut c = ClientStream::connect("127.0.0.1:27303").await.unwrap();
        let mut buf = [0u8; 1];
        let closed = tokio::time::timeout(Duration::from_millis(500), c.read(&mut buf))
            .await
            .map(|res| matches!(res, Ok(0)))
            .unwrap_or(false);
        assert!(closed);

        transport.stop().await;
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let transport = ServerTransport::new(test_config(27304));
        let mut join_rx = transport.join_channel().unwrap();
        transport.start().await.unwrap();

        let mut a = ClientStream::connect("127.0.0.1:27304").await.unwrap();
        join_rx.recv().await.unwrap();
        let mut b = ClientStream::connect("127.0.0.1:27304").await.unwrap();
        join_rx.recv().await.unwrap();

        let update = StateUpdate {
            timestamp: 1,
            entity_id: 1,
            priority: 0,
            sequence: 1,
            components: vec![ComponentData::new("hp", vec![1, 2])],
        };
        transport.broadcast(&update).unwrap();

        for stream in [&mut a, &mut b] {
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await.unwrap();
            let decoded = crate::codec::decode_state_update(&body).unwrap();
            assert_eq!(decoded, update);
        }

        transport.stop().await;
    }
}
