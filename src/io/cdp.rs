//! CDP datagram codec
//!
//! Frame: [Magic u32][Sequence u32][String 8B][Serial u32] then data items
//! [Type u16][Size u16][Payload], repeated to the end of the datagram.
//! All integers are little-endian.
//!
//! Only the items the gateway needs are understood: Position V3 inbound and
//! Set Diagnostic LED outbound. Unknown item types are skipped.

use crate::domain::types::{LedCommand, LedState, PositionReport, Rgb, TagId};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const MAGIC: u32 = 0x3230_434C;
pub const HEADER_STRING: &[u8; 8] = b"CDP0002\0";
pub const HEADER_LEN: usize = 20;
const ITEM_HEADER_LEN: usize = 4;
/// Largest datagram accepted
pub const MAX_FRAME_LEN: usize = 65_536;

pub const POSITION_V3_TYPE: u16 = 0x0135;
pub const POSITION_V3_LEN: usize = 30;
pub const SET_DIAGNOSTIC_LED_TYPE: u16 = 0x8017;
const LED_STATE_LEN: usize = 15;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("incomplete packet: {actual} bytes, header needs {}", HEADER_LEN)]
    Incomplete { actual: usize },

    #[error("packet size error: {0} bytes exceeds {}", MAX_FRAME_LEN)]
    Oversized(usize),

    #[error("bad magic word {0:#010X}")]
    BadMagic(u32),

    #[error("unrecognized header string {0:02X?}")]
    UnrecognizedString([u8; 8]),

    #[error("item {item_type:#06X} declares {declared} bytes, {remaining} remain")]
    ItemOverrun { item_type: u16, declared: usize, remaining: usize },

    #[error("item {item_type:#06X} has size {actual}, expected {expected}")]
    ItemSize { item_type: u16, expected: usize, actual: usize },

    #[error("LED command has too many states ({0})")]
    TooManyStates(usize),
}

/// Full Position V3 item as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionV3 {
    pub serial: u32,
    pub network_time: u64,
    /// Millimetres
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub quality: u16,
    pub anchor_count: u8,
    pub flags: u8,
    pub smoothing: u16,
}

impl PositionV3 {
    fn read(mut buf: &[u8]) -> Self {
        Self {
            serial: buf.get_u32_le(),
            network_time: buf.get_u64_le(),
            x: buf.get_i32_le(),
            y: buf.get_i32_le(),
            z: buf.get_i32_le(),
            quality: buf.get_u16_le(),
            anchor_count: buf.get_u8(),
            flags: buf.get_u8(),
            smoothing: buf.get_u16_le(),
        }
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u32_le(self.serial);
        out.put_u64_le(self.network_time);
        out.put_i32_le(self.x);
        out.put_i32_le(self.y);
        out.put_i32_le(self.z);
        out.put_u16_le(self.quality);
        out.put_u8(self.anchor_count);
        out.put_u8(self.flags);
        out.put_u16_le(self.smoothing);
    }

    pub fn to_report(&self) -> PositionReport {
        PositionReport {
            tag_id: TagId(u64::from(self.serial)),
            x: f64::from(self.x),
            y: f64::from(self.y),
            network_time: self.network_time,
        }
    }
}

/// Decode every Position V3 item in a datagram
pub fn decode_positions(frame: &[u8]) -> Result<Vec<PositionReport>, CodecError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(CodecError::Oversized(frame.len()));
    }
    if frame.len() < HEADER_LEN {
        return Err(CodecError::Incomplete { actual: frame.len() });
    }

    let mut buf = frame;
    let magic = buf.get_u32_le();
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let _sequence = buf.get_u32_le();
    let mut string = [0u8; 8];
    buf.copy_to_slice(&mut string);
    if &string != HEADER_STRING {
        return Err(CodecError::UnrecognizedString(string));
    }
    let _source_serial = buf.get_u32_le();

    let mut reports = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < ITEM_HEADER_LEN {
            return Err(CodecError::ItemOverrun {
                item_type: 0,
                declared: ITEM_HEADER_LEN,
                remaining: buf.remaining(),
            });
        }
        let item_type = buf.get_u16_le();
        let size = buf.get_u16_le() as usize;
        if size > buf.remaining() {
            return Err(CodecError::ItemOverrun { item_type, declared: size, remaining: buf.remaining() });
        }
        let (payload, rest) = buf.split_at(size);
        buf = rest;

        if item_type == POSITION_V3_TYPE {
            if size != POSITION_V3_LEN {
                return Err(CodecError::ItemSize { item_type, expected: POSITION_V3_LEN, actual: size });
            }
            reports.push(PositionV3::read(payload).to_report());
        }
    }

    Ok(reports)
}

/// Stateful encoder stamping each packet with the next sequence number
#[derive(Debug)]
pub struct Encoder {
    source_serial: u32,
    sequence: u32,
}

impl Encoder {
    pub fn new(source_serial: u32) -> Self {
        Self { source_serial, sequence: 0 }
    }

    fn header(&mut self, out: &mut BytesMut) {
        out.put_u32_le(MAGIC);
        out.put_u32_le(self.sequence);
        out.put_slice(HEADER_STRING);
        out.put_u32_le(self.source_serial);
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Set Diagnostic LED packet; an empty command resets the LED
    pub fn led_command(&mut self, tag_id: TagId, command: &LedCommand) -> Result<Bytes, CodecError> {
        let size = 4 + command.states.len() * LED_STATE_LEN;
        if size > usize::from(u16::MAX) {
            return Err(CodecError::TooManyStates(command.states.len()));
        }

        let mut out = BytesMut::with_capacity(HEADER_LEN + ITEM_HEADER_LEN + size);
        self.header(&mut out);
        out.put_u16_le(SET_DIAGNOSTIC_LED_TYPE);
        out.put_u16_le(size as u16);
        // Serial numbers on the wire are 32 bits
        out.put_u32_le(tag_id.0 as u32);
        for state in &command.states {
            out.put_u32_le(state.start_offset_ms);
            out.put_u32_le(state.duration_ms);
            out.put_u32_le(state.cycle_length_ms);
            out.put_u8(state.color.r);
            out.put_u8(state.color.g);
            out.put_u8(state.color.b);
        }
        Ok(out.freeze())
    }

    /// Position packet carrying the given items
    pub fn positions(&mut self, items: &[PositionV3]) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + items.len() * (ITEM_HEADER_LEN + POSITION_V3_LEN));
        self.header(&mut out);
        for item in items {
            out.put_u16_le(POSITION_V3_TYPE);
            out.put_u16_le(POSITION_V3_LEN as u16);
            item.write(&mut out);
        }
        out.freeze()
    }
}

/// Decode the payload of a Set Diagnostic LED packet (used by tests and the simulator)
pub fn decode_led_command(frame: &[u8]) -> Option<(TagId, LedCommand)> {
    if frame.len() < HEADER_LEN + ITEM_HEADER_LEN + 4 {
        return None;
    }
    let mut buf = &frame[HEADER_LEN..];
    if buf.get_u16_le() != SET_DIAGNOSTIC_LED_TYPE {
        return None;
    }
    let size = buf.get_u16_le() as usize;
    if size < 4 || size > buf.remaining() || (size - 4) % LED_STATE_LEN != 0 {
        return None;
    }
    let tag_id = TagId(u64::from(buf.get_u32_le()));
    let states = (0..(size - 4) / LED_STATE_LEN)
        .map(|_| LedState {
            start_offset_ms: buf.get_u32_le(),
            duration_ms: buf.get_u32_le(),
            cycle_length_ms: buf.get_u32_le(),
            color: Rgb::new(buf.get_u8(), buf.get_u8(), buf.get_u8()),
        })
        .collect();
    Some((tag_id, LedCommand { states }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&7u32.to_le_bytes());
        out.extend_from_slice(HEADER_STRING);
        out.extend_from_slice(&0x0100_0001u32.to_le_bytes());
    }

    fn position_item(out: &mut Vec<u8>, serial: u32, time: u64, x: i32, y: i32) {
        out.extend_from_slice(&POSITION_V3_TYPE.to_le_bytes());
        out.extend_from_slice(&(POSITION_V3_LEN as u16).to_le_bytes());
        out.extend_from_slice(&serial.to_le_bytes());
        out.extend_from_slice(&time.to_le_bytes());
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
        out.extend_from_slice(&250i32.to_le_bytes());
        out.extend_from_slice(&[0x10, 0x00, 4, 0, 0, 0]);
    }

    #[test]
    fn test_decode_hand_built_frame() {
        let mut frame = Vec::new();
        header(&mut frame);
        position_item(&mut frame, 0xABCD, 123_456, 5000, -1200);
        // Unknown item type is skipped
        frame.extend_from_slice(&0x0999u16.to_le_bytes());
        frame.extend_from_slice(&2u16.to_le_bytes());
        frame.extend_from_slice(&[1, 2]);
        position_item(&mut frame, 0xABCE, 123_457, 1, 2);

        let reports = decode_positions(&frame).unwrap();
        assert_eq!(
            reports,
            vec![
                PositionReport { tag_id: TagId(0xABCD), x: 5000.0, y: -1200.0, network_time: 123_456 },
                PositionReport { tag_id: TagId(0xABCE), x: 1.0, y: 2.0, network_time: 123_457 },
            ]
        );
    }

    #[test]
    fn test_header_only_frame_has_no_reports() {
        let mut frame = Vec::new();
        header(&mut frame);
        assert!(decode_positions(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_truncated_header() {
        assert_eq!(decode_positions(&[0x4C, 0x43]), Err(CodecError::Incomplete { actual: 2 }));
    }

    #[test]
    fn test_rejects_oversized() {
        let frame = vec![0u8; MAX_FRAME_LEN + 1];
        assert_eq!(decode_positions(&frame), Err(CodecError::Oversized(MAX_FRAME_LEN + 1)));
    }

    #[test]
    fn test_rejects_bad_magic_and_string() {
        let mut frame = Vec::new();
        header(&mut frame);
        frame[0] = 0;
        assert!(matches!(decode_positions(&frame), Err(CodecError::BadMagic(_))));

        let mut frame = Vec::new();
        header(&mut frame);
        frame[8] = b'X';
        assert!(matches!(decode_positions(&frame), Err(CodecError::UnrecognizedString(_))));
    }

    #[test]
    fn test_rejects_truncated_item() {
        let mut frame = Vec::new();
        header(&mut frame);
        position_item(&mut frame, 1, 1, 1, 1);
        frame.truncate(frame.len() - 3);
        assert!(matches!(
            decode_positions(&frame),
            Err(CodecError::ItemOverrun { item_type: POSITION_V3_TYPE, declared: 30, remaining: 27 })
        ));
    }

    #[test]
    fn test_rejects_wrong_position_size() {
        let mut frame = Vec::new();
        header(&mut frame);
        frame.extend_from_slice(&POSITION_V3_TYPE.to_le_bytes());
        frame.extend_from_slice(&4u16.to_le_bytes());
        frame.extend_from_slice(&[0; 4]);
        assert!(matches!(decode_positions(&frame), Err(CodecError::ItemSize { actual: 4, .. })));
    }

    #[test]
    fn test_led_command_layout() {
        let mut encoder = Encoder::new(1);
        let command = LedCommand::round_robin([Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)], 500);
        let bytes = encoder.led_command(TagId(0x0102_0304), &command).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 4 + 4 + 2 * LED_STATE_LEN);
        assert_eq!(&bytes[20..22], &SET_DIAGNOSTIC_LED_TYPE.to_le_bytes());
        assert_eq!(&bytes[22..24], &(4u16 + 30).to_le_bytes());
        assert_eq!(&bytes[24..28], &[0x04, 0x03, 0x02, 0x01]);
        // Second state: offset 500, duration 500, cycle 1000, blue
        assert_eq!(&bytes[43..47], &500u32.to_le_bytes());
        assert_eq!(&bytes[51..55], &1000u32.to_le_bytes());
        assert_eq!(&bytes[55..58], &[0, 0, 255]);

        assert_eq!(decode_led_command(&bytes), Some((TagId(0x0102_0304), command)));
    }

    #[test]
    fn test_clear_command_has_no_states() {
        let mut encoder = Encoder::new(1);
        let bytes = encoder.led_command(TagId(9), &LedCommand::clear()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(decode_led_command(&bytes), Some((TagId(9), LedCommand::clear())));
    }

    #[test]
    fn test_sequence_increments() {
        let mut encoder = Encoder::new(1);
        let first = encoder.positions(&[]);
        let second = encoder.positions(&[]);
        assert_eq!(&first[4..8], &0u32.to_le_bytes());
        assert_eq!(&second[4..8], &1u32.to_le_bytes());
    }

    #[test]
    fn test_encoded_positions_decode() {
        let item = PositionV3 {
            serial: 42,
            network_time: 99,
            x: 1500,
            y: 2500,
            z: 0,
            quality: 100,
            anchor_count: 4,
            flags: 0,
            smoothing: 0,
        };
        let bytes = Encoder::new(1).positions(&[item]);
        assert_eq!(decode_positions(&bytes).unwrap(), vec![item.to_report()]);
    }
}
