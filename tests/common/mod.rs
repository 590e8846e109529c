//! Shared helpers for building inbound wire frames in tests.
#![allow(dead_code)]

use zbgate::config::GatewayConfig;
use zbgate::radio::codec::{self, FT_AT_COMMAND_RESPONSE};
use zbgate::radio::{RadioController, RadioEvent};

/// Wrap a frame body in delimiter, length and checksum.
pub fn wire(body: &[u8]) -> Vec<u8> {
    let mut out = vec![codec::START_DELIM];
    codec::put_u16(&mut out, body.len() as u16);
    out.extend_from_slice(body);
    out.push(codec::checksum(body));
    out
}

/// A controller with a short discovery window (5 ticks) for fast tests.
pub fn controller() -> (
    RadioController,
    tokio::sync::mpsc::UnboundedReceiver<RadioEvent>,
) {
    let config = GatewayConfig {
        tick_interval_ms: 50,
        discovery_timeout_ms: 250,
        tx_queue_limit: 50,
        debug_dump: false,
    };
    RadioController::new(&config)
}

/// Local AT command response body: type, frame id, command, status, data.
pub fn at_response(frame_id: u8, cmd: u16, status: u8, data: &[u8]) -> Vec<u8> {
    let mut body = vec![FT_AT_COMMAND_RESPONSE, frame_id];
    codec::put_u16(&mut body, cmd);
    body.push(status);
    body.extend_from_slice(data);
    wire(&body)
}

/// ND response arrives as an AT command response for `ND` whose data is the
/// discovered node's self-report.
#[allow(clippy::too_many_arguments)]
pub fn nd_response(
    net_address: u16,
    address: u64,
    node_id: &str,
    parent: u16,
    device_type: u8,
    profile: u16,
    manufacturer: u16,
) -> Vec<u8> {
    let mut data = Vec::new();
    codec::put_u16(&mut data, net_address);
    codec::put_u64(&mut data, address);
    data.extend_from_slice(node_id.as_bytes());
    data.push(0); // NUL terminator
    codec::put_u16(&mut data, parent);
    data.push(device_type);
    data.push(0); // discovery status
    codec::put_u16(&mut data, profile);
    codec::put_u16(&mut data, manufacturer);
    at_response(1, codec::AT_CMD_ND, 0, &data)
}

pub fn transmit_status(frame_id: u8, net_address: u16, delivery: u8, discovery: u8) -> Vec<u8> {
    let mut body = vec![codec::FT_TRANSMIT_STATUS, frame_id];
    codec::put_u16(&mut body, net_address);
    body.push(0); // retry count
    body.push(delivery);
    body.push(discovery);
    wire(&body)
}

pub fn receive_packet(address: u64, net_address: u16, options: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![codec::FT_RECEIVE_PACKET];
    codec::put_u64(&mut body, address);
    codec::put_u16(&mut body, net_address);
    body.push(options);
    body.extend_from_slice(payload);
    wire(&body)
}

pub fn explicit_rx(address: u64, net_address: u16, options: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![codec::FT_EXPLICIT_RX_IND];
    codec::put_u64(&mut body, address);
    codec::put_u16(&mut body, net_address);
    body.push(0xE8); // source endpoint
    body.push(0xE8); // destination endpoint
    codec::put_u16(&mut body, 0x0011); // cluster
    codec::put_u16(&mut body, 0xC105); // profile
    body.push(options);
    body.extend_from_slice(payload);
    wire(&body)
}

pub fn remote_at_response(
    frame_id: u8,
    address: u64,
    net_address: u16,
    cmd: u16,
    status: u8,
) -> Vec<u8> {
    let mut body = vec![codec::FT_REMOTE_COMMAND_RESPONSE, frame_id];
    codec::put_u64(&mut body, address);
    codec::put_u16(&mut body, net_address);
    codec::put_u16(&mut body, cmd);
    body.push(status);
    wire(&body)
}

/// Feed SH/SL responses establishing the given local address.
pub fn learn_local_address(controller: &RadioController, address: u64) {
    let mut high = Vec::new();
    codec::put_u32(&mut high, (address >> 32) as u32);
    let mut low = Vec::new();
    codec::put_u32(&mut low, address as u32);
    controller.feed_bytes(&at_response(1, codec::AT_CMD_SH, 0, &high));
    controller.feed_bytes(&at_response(2, codec::AT_CMD_SL, 0, &low));
}
