//! Incremental reassembly of API frames from an arbitrarily-chunked byte
//! stream.
//!
//! The serial layer hands us whatever the OS buffered, so the framer is an
//! explicit per-byte state machine that can be fed one byte or one kilobyte
//! at a time and yields identical frames either way. Corrupt input (oversize
//! length, bad checksum) is logged and dropped; the machine then hunts for
//! the next start delimiter rather than surfacing an error.

use bytes::BytesMut;
use log::{debug, warn};
use std::collections::VecDeque;

use super::codec::{self, MAX_FRAME_BODY, START_DELIM};
use crate::logutil::hex_dump;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekStartDelimiter,
    ReadLengthHigh,
    ReadLengthLow,
    ReadFrameType,
    ReadPayload,
    ReadChecksum,
}

/// Frame reassembler. `push` bytes in, take validated frame bodies
/// (frame-type byte + payload, checksum already verified and stripped) out
/// with `next_frame`.
pub struct Framer {
    state: State,
    body_len: usize,
    body: BytesMut,
    ready: VecDeque<Vec<u8>>,
}

impl Framer {
    pub fn new() -> Self {
        Framer {
            state: State::SeekStartDelimiter,
            body_len: 0,
            body: BytesMut::with_capacity(MAX_FRAME_BODY),
            ready: VecDeque::new(),
        }
    }

    /// Feed raw bytes from the transport.
    pub fn push(&mut self, data: &[u8]) {
        for &byte in data {
            self.step(byte);
        }
    }

    /// Take the next fully validated frame body, if one has been assembled.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            State::SeekStartDelimiter => {
                if byte == START_DELIM {
                    self.state = State::ReadLengthHigh;
                }
                // anything else is inter-frame garbage, silently dropped
            }
            State::ReadLengthHigh => {
                self.body_len = (byte as usize) << 8;
                self.state = State::ReadLengthLow;
            }
            State::ReadLengthLow => {
                self.body_len |= byte as usize;
                if self.body_len == 0 || self.body_len > MAX_FRAME_BODY {
                    warn!(
                        "Discarding frame with implausible length {}, resynchronizing",
                        self.body_len
                    );
                    self.reset();
                } else {
                    self.state = State::ReadFrameType;
                }
            }
            State::ReadFrameType => {
                self.body.clear();
                self.body.extend_from_slice(&[byte]);
                // the type byte is counted in the length field
                self.state = if self.body_len == 1 {
                    State::ReadChecksum
                } else {
                    State::ReadPayload
                };
            }
            State::ReadPayload => {
                self.body.extend_from_slice(&[byte]);
                if self.body.len() == self.body_len {
                    self.state = State::ReadChecksum;
                }
            }
            State::ReadChecksum => {
                let expected = codec::checksum(&self.body);
                if byte == expected {
                    self.ready.push_back(self.body.to_vec());
                } else {
                    warn!(
                        "Bad checksum (got 0x{:02X}, expected 0x{:02X}), dropping frame",
                        byte, expected
                    );
                    debug!("Dropped frame body: {}", hex_dump(&self.body));
                }
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.state = State::SeekStartDelimiter;
        self.body_len = 0;
        self.body.clear();
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
