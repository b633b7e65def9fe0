//! Wire-level encoding for a player's movement intent.
//!
//! This is deliberately separate from [`dual::codec`](../../net/src/codec.rs):
//! the networking core treats `InputCommand::data` as an opaque blob, and
//! this is simply the simulation layer's chosen schema for that blob when
//! `input_type == "move"`. A different simulation could pick any other
//! layout without touching the wire protocol.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::DVec2;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveIntent {
    pub direction: DVec2,
    pub sprint: bool,
    pub fire: bool,
}

impl MoveIntent {
    pub const NONE: MoveIntent = MoveIntent {
        direction: DVec2::ZERO,
        sprint: false,
        fire: false,
    };

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(17);
        out.write_f64::<LittleEndian>(self.direction.x).unwrap();
        out.write_f64::<LittleEndian>(self.direction.y).unwrap();
        let flags = (self.sprint as u8) | ((self.fire as u8) << 1);
        out.write_u8(flags).unwrap();
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<MoveIntent> {
        let mut cur = Cursor::new(bytes);
        let x = cur.read_f64::<LittleEndian>().ok()?;
        let y = cur.read_f64::<LittleEndian>().ok()?;
        let flags = cur.read_u8().ok()?;
        Some(MoveIntent {
            direction: DVec2::new(x, y),
            sprint: flags & 0x1 != 0,
            fire: flags & 0x2 != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let intent = MoveIntent {
            direction: DVec2::new(0.5, -1.0),
            sprint: true,
            fire: false,
        };
        assert_eq!(MoveIntent::decode(&intent.encode()), Some(intent));
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        assert_eq!(MoveIntent::decode(&[0u8; 4]), None);
    }
}
