//! Outbound queue behavior, frame-id allocation over long runs, and
//! reassembly invariance under arbitrary transport fragmentation.

mod common;

use common::*;
use zbgate::radio::codec;
use zbgate::radio::{RadioEvent, SendError};

const NODE_A: u64 = 0x0013_A200_0000_00AA;

#[test]
fn queue_overflow_evicts_the_oldest_frame() {
    let (controller, _events) = controller(); // queue limit 50
    for i in 0..55u32 {
        let payload = format!("msg-{}", i);
        controller.send_data(NODE_A, payload.as_bytes()).unwrap();
    }

    let mut frames = Vec::new();
    while let Some(frame) = controller.tick() {
        frames.push(frame);
    }
    assert_eq!(frames.len(), 50);
    // wire layout: delimiter, length(2), frame type, frame id
    assert_eq!(frames[0][3], codec::FT_TRANSMIT_REQUEST);
    assert_eq!(frames[0][4], 6, "ids 1-5 were evicted");
    assert_eq!(frames[49][4], 55);
}

#[test]
fn senders_never_fail_on_queue_pressure() {
    let (controller, _events) = controller();
    for _ in 0..500 {
        controller.send_data(NODE_A, b"x").unwrap();
    }
}

#[test]
fn oversize_payload_is_rejected_synchronously() {
    let (controller, _events) = controller();
    let payload = vec![0u8; 0xFFFF];
    match controller.send_data(NODE_A, &payload) {
        Err(SendError::PayloadTooLarge(n)) => assert_eq!(n, 0xFFFF),
        other => panic!("expected PayloadTooLarge, got {:?}", other),
    }
    assert!(controller.tick().is_none());
}

#[test]
fn frame_ids_wrap_without_reusing_zero() {
    let (controller, _events) = controller();
    for _ in 0..300 {
        controller.send_data(NODE_A, b"x").unwrap();
    }
    // 1..=255 then wrapping back to 1: the 300th allocation is 45
    assert_eq!(controller.stats()[1].last_frame_id, 45);

    let mut seen_zero = false;
    while let Some(frame) = controller.tick() {
        seen_zero |= frame[4] == 0;
    }
    assert!(!seen_zero);
}

#[test]
fn reassembly_is_invariant_under_fragmentation() {
    let frame = receive_packet(NODE_A, 0x0001, 0x01, b"telemetry");
    for split in 1..frame.len() {
        let (controller, mut events) = controller();
        controller.feed_bytes(&frame[..split]);
        controller.feed_bytes(&frame[split..]);
        match events.try_recv() {
            Ok(RadioEvent::DataReceived { payload, .. }) => {
                assert_eq!(payload, b"telemetry", "split at {}", split)
            }
            other => panic!("split at {}: expected DataReceived, got {:?}", split, other),
        }
        assert!(events.try_recv().is_err(), "split at {}: extra event", split);
    }
}

#[test]
fn byte_at_a_time_delivery_still_yields_one_event() {
    let (controller, mut events) = controller();
    let frame = receive_packet(NODE_A, 0x0001, 0x01, b"drip");
    for &byte in &frame {
        controller.feed_bytes(&[byte]);
    }
    assert!(matches!(
        events.try_recv(),
        Ok(RadioEvent::DataReceived { .. })
    ));
    assert!(events.try_recv().is_err());
}

#[test]
fn corrupted_frame_does_not_poison_the_stream() {
    let (controller, mut events) = controller();
    let mut bad = receive_packet(NODE_A, 0x0001, 0x01, b"mangled");
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;

    controller.feed_bytes(&bad);
    assert!(events.try_recv().is_err());

    controller.feed_bytes(&receive_packet(NODE_A, 0x0001, 0x01, b"clean"));
    match events.try_recv() {
        Ok(RadioEvent::DataReceived { payload, .. }) => assert_eq!(payload, b"clean"),
        other => panic!("expected DataReceived, got {:?}", other),
    }
}
