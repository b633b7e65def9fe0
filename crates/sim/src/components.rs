//! Byte layouts for the named [`ComponentData`](../../net/src/codec.rs)
//! blobs this simulation attaches to `StateUpdate`s. The wire codec never
//! interprets these bytes; this module is the one place both the server
//! (encoding) and the client (decoding) agree on what "position", "velocity"
//! and "hp" mean.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::DVec2;
use std::io::Cursor;

pub const POSITION: &str = "position";
pub const VELOCITY: &str = "velocity";
pub const HP: &str = "hp";

/// Sentinel component name on the one targeted `StateUpdate` a server sends
/// right after spawning a player's entity, so the owning client can tell
/// which of the (otherwise anonymous) broadcast entities is its own.
pub const OWNER_ACK: &str = "owner_ack";

pub fn encode_vec2(v: DVec2) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.write_f64::<LittleEndian>(v.x).unwrap();
    out.write_f64::<LittleEndian>(v.y).unwrap();
    out
}

pub fn decode_vec2(bytes: &[u8]) -> Option<DVec2> {
    let mut cur = Cursor::new(bytes);
    let x = cur.read_f64::<LittleEndian>().ok()?;
    let y = cur.read_f64::<LittleEndian>().ok()?;
    Some(DVec2::new(x, y))
}

pub fn encode_hp(hp: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    out.write_i32::<LittleEndian>(hp).unwrap();
    out
}

pub fn decode_hp(bytes: &[u8]) -> Option<i32> {
    Cursor::new(bytes).read_i32::<LittleEndian>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_round_trips() {
        let v = DVec2::new(1.5, -2.25);
        assert_eq!(decode_vec2(&encode_vec2(v)), Some(v));
    }

    #[test]
    fn hp_round_trips() {
        assert_eq!(decode_hp(&encode_hp(-7)), Some(-7));
    }
}
