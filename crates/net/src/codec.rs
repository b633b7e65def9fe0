//! Bit-exact wire encoding for [`StateUpdate`] and [`InputCommand`].
//!
//! Pure functions, no I/O. Every multi-byte scalar is little-endian; strings
//! are UTF-8 prefixed by a `u16` length; byte arrays are prefixed by a `u32`
//! length. See the module-level layout tables on each `encode_*` function for
//! the exact byte sequence. Framing (the 4-byte body length prefix) lives in
//! [`crate::framing`], one layer up — these functions only see the body.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

const MAX_STR_LEN: usize = u16::MAX as usize;
const MAX_BLOB_LEN: usize = u32::MAX as usize;

/// A named, opaque byte blob. The codec never interprets `data`; higher
/// layers dispatch on `type_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentData {
    pub type_name: String,
    pub data: Vec<u8>,
}

impl ComponentData {
    pub fn new(type_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            type_name: type_name.into(),
            data: data.into(),
        }
    }
}

/// Server-to-client announcement of one entity's state at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub timestamp: u64,
    pub entity_id: u64,
    pub priority: u8,
    pub sequence: u32,
    pub components: Vec<ComponentData>,
}

/// Client-to-server intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCommand {
    pub player_id: u64,
    pub timestamp: u64,
    pub sequence: u32,
    pub input_type: String,
    pub data: Vec<u8>,
}

fn write_string(out: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_STR_LEN {
        return Err(CodecError::FieldTooLarge {
            field,
            len: bytes.len(),
            max: MAX_STR_LEN,
        });
    }
    out.write_u16::<LittleEndian>(bytes.len() as u16).unwrap();
    out.write_all(bytes).unwrap();
    Ok(())
}

fn write_blob(out: &mut Vec<u8>, field: &'static str, data: &[u8]) -> Result<(), CodecError> {
    if data.len() > MAX_BLOB_LEN {
        return Err(CodecError::FieldTooLarge {
            field,
            len: data.len(),
            max: MAX_BLOB_LEN,
        });
    }
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.write_all(data).unwrap();
    Ok(())
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    cur.get_ref().len() - cur.position() as usize
}

fn read_u8(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, CodecError> {
    cur.read_u8().map_err(|_| CodecError::ShortRead { field })
}

fn read_u16(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<u16, CodecError> {
    cur.read_u16::<LittleEndian>()
        .map_err(|_| CodecError::ShortRead { field })
}

fn read_u32(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<u32, CodecError> {
    cur.read_u32::<LittleEndian>()
        .map_err(|_| CodecError::ShortRead { field })
}

fn read_u64(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<u64, CodecError> {
    cur.read_u64::<LittleEndian>()
        .map_err(|_| CodecError::ShortRead { field })
}

fn read_string(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<String, CodecError> {
    let len = read_u16(cur, field)? as usize;
    let available = remaining(cur);
    if len > available {
        return Err(CodecError::BadLength {
            field,
            claimed: len,
            available,
        });
    }
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)
        .map_err(|_| CodecError::ShortRead { field })?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8 { field })
}

fn read_blob(cur: &mut Cursor<&[u8]>, field: &'static str) -> Result<Vec<u8>, CodecError> {
    let len = read_u32(cur, field)? as usize;
    let available = remaining(cur);
    if len > available {
        return Err(CodecError::BadLength {
            field,
            claimed: len,
            available,
        });
    }
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)
        .map_err(|_| CodecError::ShortRead { field })?;
    Ok(buf)
}

fn finish(cur: &Cursor<&[u8]>) -> Result<(), CodecError> {
    let trailing = remaining(cur);
    if trailing > 0 {
        return Err(CodecError::TrailingBytes { trailing });
    }
    Ok(())
}

/// ```text
/// u64 timestamp
/// u64 entity_id
/// u8  priority
/// u32 sequence
/// u16 component_count
/// repeat component_count:
///    u16 type_len
///    u8  type_bytes[type_len]
///    u32 data_len
///    u8  data_bytes[data_len]
/// ```
pub fn encode_state_update(update: &StateUpdate) -> Result<Vec<u8>, CodecError> {
    if update.components.len() > MAX_STR_LEN {
        return Err(CodecError::FieldTooLarge {
            field: "component_count",
            len: update.components.len(),
            max: MAX_STR_LEN,
        });
    }
    let mut out = Vec::with_capacity(23 + update.components.len() * 16);
    out.write_u64::<LittleEndian>(update.timestamp).unwrap();
    out.write_u64::<LittleEndian>(update.entity_id).unwrap();
    out.write_u8(update.priority).unwrap();
    out.write_u32::<LittleEndian>(update.sequence).unwrap();
    out.write_u16::<LittleEndian>(update.components.len() as u16)
        .unwrap();
    for component in &update.components {
        write_string(&mut out, "component.type", &component.type_name)?;
        write_blob(&mut out, "component.data", &component.data)?;
    }
    Ok(out)
}

pub fn decode_state_update(bytes: &[u8]) -> Result<StateUpdate, CodecError> {
    let mut cur = Cursor::new(bytes);
    let timestamp = read_u64(&mut cur, "timestamp")?;
    let entity_id = read_u64(&mut cur, "entity_id")?;
    let priority = read_u8(&mut cur, "priority")?;
    let sequence = read_u32(&mut cur, "sequence")?;
    let component_count = read_u16(&mut cur, "component_count")?;
    let mut components = Vec::with_capacity(component_count as usize);
    for _ in 0..component_count {
        let type_name = read_string(&mut cur, "component.type")?;
        let data = read_blob(&mut cur, "component.data")?;
        components.push(ComponentData { type_name, data });
    }
    finish(&cur)?;
    Ok(StateUpdate {
        timestamp,
        entity_id,
        priority,
        sequence,
        components,
    })
}

/// ```text
/// u64 player_id
/// u64 timestamp
/// u32 sequence
/// u16 input_type_len
/// u8  input_type_bytes[input_type_len]
/// u32 data_len
/// u8  data_bytes[data_len]
/// ```
pub fn encode_input_command(command: &InputCommand) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(22 + command.input_type.len() + command.data.len());
    out.write_u64::<LittleEndian>(command.player_id).unwrap();
    out.write_u64::<LittleEndian>(command.timestamp).unwrap();
    out.write_u32::<LittleEndian>(command.sequence).unwrap();
    write_string(&mut out, "input_type", &command.input_type)?;
    write_blob(&mut out, "data", &command.data)?;
    Ok(out)
}

pub fn decode_input_command(bytes: &[u8]) -> Result<InputCommand, CodecError> {
    let mut cur = Cursor::new(bytes);
    let player_id = read_u64(&mut cur, "player_id")?;
    let timestamp = read_u64(&mut cur, "timestamp")?;
    let sequence = read_u32(&mut cur, "sequence")?;
    let input_type = read_string(&mut cur, "input_type")?;
    let data = read_blob(&mut cur, "data")?;
    finish(&cur)?;
    Ok(InputCommand {
        player_id,
        timestamp,
        sequence,
        input_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state_update() -> StateUpdate {
        StateUpdate {
            timestamp: 1000,
            entity_id: 42,
            priority: 128,
            sequence: 7,
            components: vec![
                ComponentData::new(
                    "position",
                    vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
                ),
                ComponentData::new("health", vec![0x64, 0x00]),
            ],
        }
    }

    #[test]
    fn state_update_round_trip() {
        let update = sample_state_update();
        let encoded = encode_state_update(&update).unwrap();
        assert_eq!(encoded.len(), 59);
        let decoded = decode_state_update(&encoded).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn state_update_truncated_buffer_is_short_read() {
        let encoded = encode_state_update(&sample_state_update()).unwrap();
        let truncated = &encoded[..encoded.len() - 4];
        assert!(decode_state_update(truncated).is_err());
    }

    #[test]
    fn state_update_overclaimed_length_is_bad_length() {
        let mut encoded = encode_state_update(&sample_state_update()).unwrap();
        // The first component's data_len field sits right after its 8-byte
        // type ("position" + 2-byte prefix). Bump it past the buffer.
        let data_len_offset = 8 + 8 + 1 + 4 + 2 + 2 + "position".len();
        encoded[data_len_offset..data_len_offset + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        match decode_state_update(&encoded) {
            Err(CodecError::BadLength { field, .. }) => assert_eq!(field, "component.data"),
            other => panic!("expected BadLength, got {other:?}"),
        }
    }

    #[test]
    fn input_command_round_trip() {
        let command = InputCommand {
            player_id: 9,
            timestamp: 55,
            sequence: 3,
            input_type: "move".to_string(),
            data: vec![0xAB, 0xCD],
        };
        let encoded = encode_input_command(&command).unwrap();
        let decoded = decode_input_command(&encoded).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn input_command_rejects_trailing_bytes() {
        let command = InputCommand {
            player_id: 1,
            timestamp: 1,
            sequence: 1,
            input_type: "x".to_string(),
            data: vec![],
        };
        let mut encoded = encode_input_command(&command).unwrap();
        encoded.push(0xFF);
        match decode_input_command(&encoded) {
            Err(CodecError::TrailingBytes { trailing: 1 }) => {}
            other => panic!("expected TrailingBytes, got {other:?}"),
        }
    }

    #[test]
    fn empty_components_round_trip() {
        let update = StateUpdate {
            timestamp: 0,
            entity_id: 0,
            priority: 0,
            sequence: 0,
            components: vec![],
        };
        let encoded = encode_state_update(&update).unwrap();
        assert_eq!(decode_state_update(&encoded).unwrap(), update);
    }
}
