//! Authoritative networking core for a procedural action-RPG: wire codec,
//! TCP transports for server and client, client-side prediction with
//! reconciliation, snapshot-based interpolation, and server-side lag
//! compensation.
//!
//! Modules are ordered leaves-first: [`codec`] and [`framing`] have no
//! dependency on anything else here; [`snapshot`], [`predictor`] and
//! [`lag_compensation`] build on them; [`server_transport`] and
//! [`client_transport`] tie the wire format to live sockets.

pub mod client_transport;
pub mod clock;
pub mod codec;
pub mod error;
pub mod framing;
pub mod lag_compensation;
pub mod predictor;
pub mod server_transport;
pub mod snapshot;

pub use client_transport::{ClientConfig, ClientTransport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{
    decode_input_command, decode_state_update, encode_input_command, encode_state_update,
    ComponentData, InputCommand, StateUpdate,
};
pub use error::{ClientError, CodecError, FrameError, ServerError, TransportError};
pub use framing::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use lag_compensation::{LagCompensationConfig, LagCompensator, RewindResult};
pub use predictor::{PredictedState, Predictor, DEFAULT_EPSILON};
pub use server_transport::{PlayerId, ServerConfig, ServerTransport};
pub use snapshot::{
    EntityId, EntitySnapshot, SnapshotDelta, SnapshotStats, SnapshotStore, WorldSnapshot,
};
