//! Wire codec for the radio module's API-frame protocol.
//!
//! Every frame on the serial link looks like:
//!
//! ```text
//! +------+--------+--------+-----------------------+----------+
//! | 0x7E | len_hi | len_lo | body (type + payload) | checksum |
//! +------+--------+--------+-----------------------+----------+
//! ```
//!
//! The length covers the body only (frame-type byte plus payload), all
//! multi-byte integers are big-endian, and the checksum is `0xFF` minus the
//! byte sum of the body mod 256. This module provides the integer
//! pack/unpack helpers, the checksum, and builders for every outbound frame
//! the gateway produces.

/// Start-of-frame delimiter.
pub const START_DELIM: u8 = 0x7E;

// Frame types
pub const FT_AT_COMMAND: u8 = 0x08;
pub const FT_TRANSMIT_REQUEST: u8 = 0x10;
pub const FT_REMOTE_AT_COMMAND: u8 = 0x17;
pub const FT_AT_COMMAND_RESPONSE: u8 = 0x88;
pub const FT_TRANSMIT_STATUS: u8 = 0x8B;
pub const FT_RECEIVE_PACKET: u8 = 0x90;
pub const FT_EXPLICIT_RX_IND: u8 = 0x91;
pub const FT_REMOTE_COMMAND_RESPONSE: u8 = 0x97;

// Two-letter AT command identifiers, big-endian ASCII pairs
pub const AT_CMD_SH: u16 = 0x5348;
pub const AT_CMD_SL: u16 = 0x534C;
pub const AT_CMD_ID: u16 = 0x4944;
pub const AT_CMD_ND: u16 = 0x4E44;
pub const AT_CMD_NI: u16 = 0x4E49;

/// Network address meaning broadcast or not-yet-known.
pub const BROADCAST_NET_ADDRESS: u16 = 0xFFFE;

/// Longest node identifier the radio accepts.
pub const MAX_NODE_ID: usize = 20;

/// Upper bound on the body length we will accept from the wire. Real frames
/// top out well below this; anything larger is treated as stream corruption.
pub const MAX_FRAME_BODY: usize = 512;

/// Remote AT command option: apply changes and acknowledge.
const REMOTE_AT_APPLY_ACK: u8 = 0x02;

pub fn put_u16(buf: &mut Vec<u8>, val: u16) {
    buf.extend_from_slice(&val.to_be_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, val: u32) {
    buf.extend_from_slice(&val.to_be_bytes());
}

pub fn put_u64(buf: &mut Vec<u8>, val: u64) {
    buf.extend_from_slice(&val.to_be_bytes());
}

/// Insert a big-endian u16 at `pos` rather than appending.
pub fn put_u16_at(buf: &mut Vec<u8>, pos: usize, val: u16) {
    let bytes = val.to_be_bytes();
    buf.splice(pos..pos, bytes.iter().copied());
}

pub fn get_u16(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn get_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn get_u64(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes = buf.get(pos..pos + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_be_bytes(raw))
}

/// Frame checksum: sum of the body bytes mod 256, subtracted from 0xFF.
/// The body is the frame-type byte through the end of the payload; the
/// delimiter, length field and the checksum byte itself are excluded.
pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// Wrap a body in delimiter, length and checksum.
fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(START_DELIM);
    put_u16(&mut out, body.len() as u16);
    let cksum = checksum(&body);
    out.extend_from_slice(&body);
    out.push(cksum);
    out
}

/// Build a local AT command query frame (no parameter data).
pub fn at_command(frame_id: u8, cmd: u16) -> Vec<u8> {
    at_command_with_data(frame_id, cmd, &[])
}

/// Build a local AT command frame carrying parameter data (e.g. an `NI` write).
pub fn at_command_with_data(frame_id: u8, cmd: u16, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + data.len());
    body.push(FT_AT_COMMAND);
    body.push(frame_id);
    put_u16(&mut body, cmd);
    body.extend_from_slice(data);
    frame(body)
}

/// Build a remote AT command frame addressed by both the 64-bit and the
/// last-known 16-bit address, with the apply-and-acknowledge option set.
pub fn remote_at_command(
    frame_id: u8,
    address: u64,
    net_address: u16,
    cmd: u16,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(15 + data.len());
    body.push(FT_REMOTE_AT_COMMAND);
    body.push(frame_id);
    put_u64(&mut body, address);
    put_u16(&mut body, net_address);
    body.push(REMOTE_AT_APPLY_ACK);
    put_u16(&mut body, cmd);
    body.extend_from_slice(data);
    frame(body)
}

/// Build a transmit request frame carrying an opaque payload to a node.
pub fn transmit_request(frame_id: u8, address: u64, net_address: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(14 + payload.len());
    body.push(FT_TRANSMIT_REQUEST);
    body.push(frame_id);
    put_u64(&mut body, address);
    put_u16(&mut body, net_address);
    body.push(0x00); // broadcast radius: maximum hops
    body.push(0x00); // transmit options
    body.extend_from_slice(payload);
    frame(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nd_query_frame_matches_reference_bytes() {
        let frame = at_command(1, AT_CMD_ND);
        assert_eq!(frame, vec![0x7E, 0x00, 0x04, 0x08, 0x01, 0x4E, 0x44, 0x64]);
    }

    #[test]
    fn checksum_rejects_single_bit_flips() {
        let body = vec![FT_TRANSMIT_REQUEST, 0x05, 0xDE, 0xAD, 0xBE, 0xEF];
        let good = checksum(&body);
        for byte in 0..body.len() {
            for bit in 0..8 {
                let mut flipped = body.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(checksum(&flipped), good, "flip at byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn integer_roundtrip() {
        let mut buf = Vec::new();
        put_u16(&mut buf, 0xBEEF);
        put_u32(&mut buf, 0xDEADBEEF);
        put_u64(&mut buf, 0x0013A20040A1B2C3);
        assert_eq!(get_u16(&buf, 0), Some(0xBEEF));
        assert_eq!(get_u32(&buf, 2), Some(0xDEADBEEF));
        assert_eq!(get_u64(&buf, 6), Some(0x0013A20040A1B2C3));
        // out of range reads are total, never panicking
        assert_eq!(get_u64(&buf, 7), None);
        assert_eq!(get_u16(&buf, 13), None);
    }

    #[test]
    fn insert_at_position() {
        let mut buf = vec![0x7E];
        put_u16_at(&mut buf, 1, 0x0004);
        assert_eq!(buf, vec![0x7E, 0x00, 0x04]);
    }

    #[test]
    fn transmit_request_layout() {
        let frame = transmit_request(7, 0x0013A200AABBCCDD, 0xFFFE, b"hi");
        assert_eq!(frame[0], START_DELIM);
        assert_eq!(get_u16(&frame, 1), Some(16)); // 14 byte header + 2 payload
        assert_eq!(frame[3], FT_TRANSMIT_REQUEST);
        assert_eq!(frame[4], 7);
        assert_eq!(get_u64(&frame, 5), Some(0x0013A200AABBCCDD));
        assert_eq!(get_u16(&frame, 13), Some(0xFFFE));
        assert_eq!(&frame[17..19], b"hi");
        let body = &frame[3..frame.len() - 1];
        assert_eq!(checksum(body), frame[frame.len() - 1]);
    }

    #[test]
    fn remote_at_layout() {
        let frame = remote_at_command(3, 0x0102030405060708, 0x1234, AT_CMD_NI, b"node-7");
        assert_eq!(get_u16(&frame, 1), Some(15 + 6));
        assert_eq!(frame[3], FT_REMOTE_AT_COMMAND);
        assert_eq!(get_u64(&frame, 5), Some(0x0102030405060708));
        assert_eq!(get_u16(&frame, 13), Some(0x1234));
        assert_eq!(frame[15], 0x02); // apply and acknowledge
        assert_eq!(get_u16(&frame, 16), Some(AT_CMD_NI));
    }
}
