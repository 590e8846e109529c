//! # Radio Gateway Engine
//!
//! Communication with the mesh-radio module attached over a serial link.
//! The radio speaks a binary API-frame protocol; this module owns the whole
//! conversation: reassembling frames from the byte stream, dispatching them
//! by type, correlating transmit requests with their status responses,
//! maintaining the node table, and running timed node-discovery sweeps.
//!
//! ## Structure
//!
//! - [`codec`] - big-endian pack/unpack, checksum, outbound frame builders
//! - [`framer`] - per-byte frame reassembly state machine
//! - [`nodes`] - node records and the engine's guarded state aggregate
//! - [`RadioController`] - lifecycle (open/close, background tasks) plus the
//!   protocol engine itself
//!
//! ## Tasks and locking
//!
//! Two background tokio tasks run while the device is open: a reader that
//! pulls bytes off the serial port into the framer, and a scheduler that
//! wakes every tick (50 ms by default) to write at most one queued frame
//! and to count down an armed discovery sweep. Three independently guarded
//! resources exist - the outbound queue, the framer, and the node/state
//! aggregate - and no code path holds more than one of those locks at a
//! time.
//!
//! ## Events
//!
//! Consumers (the bus bridge, the console) receive typed [`RadioEvent`]s
//! over an unbounded channel handed out by [`RadioController::new`]:
//! data received from a node, the local radio's 64-bit address becoming
//! known, and the result list of a completed discovery sweep.

pub mod codec;
pub mod framer;
pub mod nodes;

pub use nodes::{DeviceType, LongAddress, NetworkAddress, NodeRecord};

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "serial")]
use serialport::SerialPort;

use crate::config::{GatewayConfig, SerialConfig};
use crate::logutil::{escape_log, hex_dump};
use codec::{
    AT_CMD_ID, AT_CMD_ND, AT_CMD_NI, AT_CMD_SH, AT_CMD_SL, BROADCAST_NET_ADDRESS,
    FT_AT_COMMAND_RESPONSE, FT_EXPLICIT_RX_IND, FT_RECEIVE_PACKET, FT_REMOTE_COMMAND_RESPONSE,
    FT_TRANSMIT_STATUS, MAX_NODE_ID,
};
use framer::Framer;
use nodes::RadioState;

/// Baud rates the radio module supports.
pub const SUPPORTED_BAUDS: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

const ADDRESS_LOW: u64 = 0x0000_0000_FFFF_FFFF;
const ADDRESS_HIGH: u64 = 0xFFFF_FFFF_0000_0000;

// largest complete wire frame the scheduler will hand to the transport
const MAX_WIRE_FRAME: usize = 0xFFFF;

/// Typed events published to subscribers.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A node sent us a payload.
    DataReceived {
        address: LongAddress,
        payload: Vec<u8>,
    },
    /// Both halves of the local radio's 64-bit address have been learned.
    LocalAddressKnown(LongAddress),
    /// A discovery sweep timed out; the list holds the local radio plus
    /// every node observed during this sweep.
    DiscoveryCompleted(Vec<NodeRecord>),
}

/// Failures opening or starting the device, surfaced synchronously.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no serial port configured")]
    NoPort,
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error("device is not open")]
    NotOpen,
    #[error("run loop is already active")]
    AlreadyRunning,
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Failures accepting a send request. Queue pressure is never an error;
/// overflow evicts the oldest queued frame instead.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// State shared between the controller, its background tasks, and handles.
struct Shared {
    tick_interval: Duration,
    /// Discovery sweep duration expressed in scheduler ticks.
    discover_ticks: u32,
    tx_queue_limit: usize,
    debug_dump: bool,
    tx_q: Mutex<VecDeque<Vec<u8>>>,
    framer: Mutex<Framer>,
    state: Mutex<RadioState>,
    event_tx: mpsc::UnboundedSender<RadioEvent>,
    stop: AtomicBool,
}

impl Shared {
    // ---------- outbound queue ----------

    fn enqueue_frame(&self, frame: Vec<u8>) {
        let mut queue = self.tx_q.lock().unwrap();
        if queue.len() >= self.tx_queue_limit {
            // never block a sender: drop the oldest queued frame instead
            queue.pop_front();
        }
        queue.push_back(frame);
    }

    /// One scheduler step: dequeue at most one frame for the transport and
    /// advance the discovery countdown. Returns the frame to write, if any;
    /// empty or oversize items are skipped without touching the transport.
    fn tick(&self) -> Option<Vec<u8>> {
        let frame = { self.tx_q.lock().unwrap().pop_front() };
        let frame = frame.filter(|f| !f.is_empty() && f.len() <= MAX_WIRE_FRAME);
        if let Some(ref f) = frame {
            if self.debug_dump {
                debug!("TX frame: {}", hex_dump(f));
            }
            self.state.lock().unwrap().local_tx_count += 1;
        }
        self.advance_discovery();
        frame
    }

    fn advance_discovery(&self) {
        let completed = {
            let mut state = self.state.lock().unwrap();
            if state.discover_wait == 0 {
                None
            } else {
                state.discover_wait -= 1;
                if state.discover_wait == 0 {
                    Some(state.discovery_snapshot())
                } else {
                    None
                }
            }
        };
        if let Some(list) = completed {
            info!("Node discovery sweep finished with {} entries", list.len());
            let _ = self.event_tx.send(RadioEvent::DiscoveryCompleted(list));
        }
    }

    // ---------- requests from callers ----------

    fn send_data(&self, address: LongAddress, payload: &[u8]) -> Result<(), SendError> {
        // 14 bytes of transmit-request header share the 16-bit length field
        if payload.len() + 14 > MAX_WIRE_FRAME {
            return Err(SendError::PayloadTooLarge(payload.len()));
        }
        let (frame_id, net_address) = {
            let mut state = self.state.lock().unwrap();
            let frame_id = state.next_frame_id();
            let net_address = state.node_for_send(address, frame_id).net_address;
            state.pending_set(frame_id, address);
            (frame_id, net_address)
        };
        self.enqueue_frame(codec::transmit_request(
            frame_id,
            address,
            net_address,
            payload,
        ));
        Ok(())
    }

    fn request_node_discover(&self) {
        let frame_id = {
            let mut state = self.state.lock().unwrap();
            // only one sweep in flight; a request mid-sweep is a no-op
            if state.discover_wait > 0 {
                return;
            }
            state.discover_sequence += 1;
            state.discover_wait = self.discover_ticks;
            state.next_frame_id()
        };
        info!("Starting node discovery sweep");
        self.enqueue_frame(codec::at_command(frame_id, AT_CMD_ND));
    }

    fn request_node_id_change(&self, address: LongAddress, node_id: &str) {
        if node_id.len() > MAX_NODE_ID {
            warn!(
                "Rename to '{}' rejected: longer than {} bytes",
                escape_log(node_id),
                MAX_NODE_ID
            );
            return;
        }
        let mut state = self.state.lock().unwrap();
        if address == state.local_address {
            if state.local_node_id == node_id {
                return;
            }
            state.new_local_node_id = Some(node_id.to_owned());
            let frame_id = state.next_frame_id();
            drop(state);
            self.enqueue_frame(codec::at_command_with_data(
                frame_id,
                AT_CMD_NI,
                node_id.as_bytes(),
            ));
        } else {
            let net_address = match state.node_mut(address) {
                Some(record) => {
                    if record.node_id == node_id {
                        return;
                    }
                    record.new_node_id = Some(node_id.to_owned());
                    record.net_address
                }
                None => {
                    warn!("Rename requested for unknown node {:016X}", address);
                    return;
                }
            };
            let frame_id = state.next_frame_id();
            drop(state);
            self.enqueue_frame(codec::remote_at_command(
                frame_id,
                address,
                net_address,
                AT_CMD_NI,
                node_id.as_bytes(),
            ));
        }
    }

    /// Post the AT queries that teach us the local radio's identity:
    /// serial-high, serial-low, PAN id and node identifier.
    fn query_local_radio(&self) {
        let frame_ids = {
            let mut state = self.state.lock().unwrap();
            state.local_address = 0;
            state.pan_id = 0;
            state.local_node_id.clear();
            [
                state.next_frame_id(),
                state.next_frame_id(),
                state.next_frame_id(),
                state.next_frame_id(),
            ]
        };
        for (frame_id, cmd) in frame_ids
            .into_iter()
            .zip([AT_CMD_SH, AT_CMD_SL, AT_CMD_ID, AT_CMD_NI])
        {
            self.enqueue_frame(codec::at_command(frame_id, cmd));
        }
    }

    // ---------- inbound path ----------

    fn feed_bytes(&self, data: &[u8]) {
        let mut frames = Vec::new();
        {
            let mut framer = self.framer.lock().unwrap();
            framer.push(data);
            while let Some(frame) = framer.next_frame() {
                frames.push(frame);
            }
        }
        if frames.is_empty() {
            return;
        }
        self.state.lock().unwrap().local_rx_count += frames.len() as u32;
        for frame in &frames {
            if self.debug_dump {
                debug!("RX frame: {}", hex_dump(frame));
            }
            self.dispatch_frame(frame);
        }
    }

    fn dispatch_frame(&self, body: &[u8]) {
        let Some(&frame_type) = body.first() else {
            return;
        };
        let event = match frame_type {
            FT_AT_COMMAND_RESPONSE => self.handle_at_response(body),
            FT_TRANSMIT_STATUS => {
                self.handle_transmit_status(body);
                None
            }
            FT_RECEIVE_PACKET => self.handle_receive(body, 11, 12),
            FT_EXPLICIT_RX_IND => self.handle_receive(body, 17, 18),
            FT_REMOTE_COMMAND_RESPONSE => {
                self.handle_remote_at_response(body);
                None
            }
            other => {
                debug!("Unhandled frame type 0x{:02X}: {}", other, hex_dump(body));
                None
            }
        };
        if let Some(event) = event {
            let _ = self.event_tx.send(event);
        }
    }

    fn handle_at_response(&self, body: &[u8]) -> Option<RadioEvent> {
        if body.len() < 5 {
            debug!("AT response too short: {}", hex_dump(body));
            return None;
        }
        if body[4] != 0 {
            debug!("AT response bad status: {}", hex_dump(body));
            return None;
        }
        let cmd = codec::get_u16(body, 2)?;
        match cmd {
            AT_CMD_SH if body.len() == 9 => {
                let high = codec::get_u32(body, 5)? as u64;
                let mut state = self.state.lock().unwrap();
                state.local_address = (state.local_address & ADDRESS_LOW) | (high << 32);
                self.local_address_event(&state)
            }
            AT_CMD_SL if body.len() == 9 => {
                let low = codec::get_u32(body, 5)? as u64;
                let mut state = self.state.lock().unwrap();
                state.local_address = (state.local_address & ADDRESS_HIGH) | low;
                self.local_address_event(&state)
            }
            AT_CMD_ID if body.len() == 13 => {
                self.state.lock().unwrap().pan_id = codec::get_u64(body, 5)?;
                None
            }
            AT_CMD_ND => {
                self.handle_nd_response(body);
                None
            }
            AT_CMD_NI => {
                self.handle_local_ni_response(body);
                None
            }
            _ => {
                debug!("Unhandled AT response: {}", hex_dump(body));
                None
            }
        }
    }

    /// Emit only once both 32-bit halves of the address are known.
    fn local_address_event(&self, state: &RadioState) -> Option<RadioEvent> {
        let address = state.local_address;
        if address & ADDRESS_LOW != 0 && address & ADDRESS_HIGH != 0 {
            Some(RadioEvent::LocalAddressKnown(address))
        } else {
            None
        }
    }

    fn handle_local_ni_response(&self, body: &[u8]) {
        let mut state = self.state.lock().unwrap();
        if body.len() == 5 {
            // write acknowledgement carries no data: commit the staged rename
            if let Some(name) = state.new_local_node_id.take() {
                info!("Local node id changed to '{}'", escape_log(&name));
                state.local_node_id = name;
            }
        } else {
            let raw = &body[5..];
            let end = raw
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(raw.len())
                .min(MAX_NODE_ID);
            let name = String::from_utf8_lossy(&raw[..end]).into_owned();
            if !name.is_empty() && name != " " {
                state.local_node_id = name;
            }
        }
    }

    fn handle_nd_response(&self, body: &[u8]) {
        let Some(record) = parse_nd_record(body) else {
            debug!("Bad ND response: {}", hex_dump(body));
            return;
        };
        debug!(
            "ND response: {:016X} net {:04X} '{}'",
            record.address,
            record.net_address,
            escape_log(&record.node_id)
        );
        let mut state = self.state.lock().unwrap();
        let mut record = record;
        // attribute to the sweep currently in flight
        record.discovery_sequence = state.discover_sequence;
        state.upsert_discovered(record);
    }

    fn handle_transmit_status(&self, body: &[u8]) {
        if body.len() < 7 {
            debug!("Transmit status too short: {}", hex_dump(body));
            return;
        }
        let frame_id = body[1];
        let Some(net_address) = codec::get_u16(body, 2) else {
            return;
        };
        let mut state = self.state.lock().unwrap();
        // a stale or unknown status response is ignored, never an error
        let Some(address) = state.pending_peek(frame_id) else {
            return;
        };
        let Some(record) = state.node_mut(address) else {
            return;
        };
        if record.net_address == 0 || record.net_address == BROADCAST_NET_ADDRESS {
            record.net_address = net_address;
        }
        record.last_delivery_status = body[5];
        record.last_discovery_status = body[6];
        record.tx_count += 1;
        state.pending_clear(frame_id);
    }

    /// Shared handler for the plain (0x90) and explicit (0x91) receive
    /// shapes; they differ only in header length.
    fn handle_receive(
        &self,
        body: &[u8],
        options_at: usize,
        payload_at: usize,
    ) -> Option<RadioEvent> {
        if body.len() < payload_at {
            debug!("Receive packet too short: {}", hex_dump(body));
            return None;
        }
        let address = codec::get_u64(body, 1)?;
        let net_address = codec::get_u16(body, 9)?;
        let options = body[options_at];
        {
            let mut state = self.state.lock().unwrap();
            let record = state.node_for_receive(address, net_address);
            record.last_receive_options = options;
            record.rx_count += 1;
        }
        Some(RadioEvent::DataReceived {
            address,
            payload: body[payload_at..].to_vec(),
        })
    }

    fn handle_remote_at_response(&self, body: &[u8]) {
        if body.len() < 15 {
            debug!("Remote AT response too short: {}", hex_dump(body));
            return;
        }
        if body[14] != 0 {
            debug!("Remote AT response bad status: {}", hex_dump(body));
            return;
        }
        let (Some(address), Some(net_address), Some(cmd)) = (
            codec::get_u64(body, 2),
            codec::get_u16(body, 10),
            codec::get_u16(body, 12),
        ) else {
            return;
        };
        match cmd {
            AT_CMD_NI => {
                let mut state = self.state.lock().unwrap();
                if let Some(record) = state.node_mut(address) {
                    record.net_address = net_address;
                    if let Some(name) = record.new_node_id.take() {
                        info!(
                            "Node {:016X} renamed to '{}'",
                            address,
                            escape_log(&name)
                        );
                        record.node_id = name;
                    }
                }
            }
            _ => {
                debug!("Unhandled remote AT response: {}", hex_dump(body));
            }
        }
    }
}

/// Parse an ND response body into a fresh record. Returns `None` on any
/// shortfall so a malformed response never partially mutates the table.
fn parse_nd_record(body: &[u8]) -> Option<NodeRecord> {
    // type(1) id(1) cmd(2) status(1) net(2) addr(8) id-terminator(1)
    // parent(2) type(1) status(1) profile(2) mfg(2) = 24 minimum, but the
    // radio never reports fewer than 25 body bytes
    if body.len() < 25 {
        return None;
    }
    let net_address = codec::get_u16(body, 5)?;
    let address = codec::get_u64(body, 7)?;

    let mut pos = 15;
    while pos < body.len() && body[pos] != 0 {
        pos += 1;
    }
    if pos >= body.len() {
        return None; // node id never terminated
    }
    // fixed fields after the terminator: parent(2) type(1) status(1)
    // profile(2) manufacturer(2)
    if body.len() < pos + 9 {
        return None;
    }
    let mut node_id = String::from_utf8_lossy(&body[15..pos]).into_owned();
    if node_id == " " {
        node_id.clear();
    }

    let mut record = NodeRecord::new(address, 0, net_address, 0);
    record.node_id = node_id;
    record.parent_net_address = codec::get_u16(body, pos + 1)?;
    record.device_type = DeviceType::from_wire(body[pos + 3])?;
    // body[pos + 4] is the discovery status byte, not recorded
    record.profile_id = codec::get_u16(body, pos + 5)?;
    record.manufacturer_id = codec::get_u16(body, pos + 7)?;
    Some(record)
}

/// Cloneable handle for callers that only issue requests and read
/// snapshots: the bus bridge, UIs, tests.
#[derive(Clone)]
pub struct RadioHandle {
    shared: Arc<Shared>,
}

impl RadioHandle {
    /// Queue a payload for transmission to a node. Never blocks; queue
    /// overflow evicts the oldest undelivered frame.
    pub fn send_data(&self, address: LongAddress, payload: &[u8]) -> Result<(), SendError> {
        self.shared.send_data(address, payload)
    }

    /// Start a discovery sweep. A no-op while one is already in flight.
    pub fn request_node_discover(&self) {
        self.shared.request_node_discover();
    }

    /// Ask a node (or the local radio) to take a new node identifier. The
    /// table is updated only once the radio acknowledges the change.
    pub fn request_node_id_change(&self, address: LongAddress, node_id: &str) {
        self.shared.request_node_id_change(address, node_id);
    }

    /// Point-in-time copy of every known node, the synthetic local-radio
    /// record first.
    pub fn stats(&self) -> Vec<NodeRecord> {
        self.shared.state.lock().unwrap().snapshot()
    }

    /// The synthetic record describing the radio attached to this gateway.
    pub fn local_radio(&self) -> NodeRecord {
        self.shared.state.lock().unwrap().local_radio()
    }
}

/// Owner of the device lifecycle and the protocol engine.
///
/// Construction hands back the event receiver; `open_device` plus
/// `start_run_loop` bring up the serial link and the background tasks.
/// All request/snapshot operations are also available on cloneable
/// [`RadioHandle`]s for other threads and tasks.
pub struct RadioController {
    shared: Arc<Shared>,
    #[cfg(feature = "serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
    running: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl RadioController {
    pub fn new(config: &GatewayConfig) -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
        let discover_ticks =
            (config.discovery_timeout_ms / config.tick_interval_ms.max(1)).max(1) as u32;
        let shared = Arc::new(Shared {
            tick_interval,
            discover_ticks,
            tx_queue_limit: config.tx_queue_limit.max(1),
            debug_dump: config.debug_dump,
            tx_q: Mutex::new(VecDeque::new()),
            framer: Mutex::new(Framer::new()),
            state: Mutex::new(RadioState::new()),
            event_tx,
            stop: AtomicBool::new(false),
        });
        (
            RadioController {
                shared,
                #[cfg(feature = "serial")]
                port: None,
                running: false,
                tasks: Vec::new(),
            },
            event_rx,
        )
    }

    /// Open the serial device. Fails synchronously on a missing port name,
    /// an unsupported baud rate, or an OS-level open error.
    #[cfg(feature = "serial")]
    pub fn open_device(&mut self, serial: &SerialConfig) -> Result<(), OpenError> {
        if self.running {
            return Err(OpenError::AlreadyRunning);
        }
        if serial.port.is_empty() {
            return Err(OpenError::NoPort);
        }
        if !SUPPORTED_BAUDS.contains(&serial.baud) {
            return Err(OpenError::UnsupportedBaud(serial.baud));
        }
        let port = serialport::new(&serial.port, serial.baud)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()?;
        info!("Opened {} at {} baud", serial.port, serial.baud);
        self.port = Some(Arc::new(Mutex::new(port)));
        // a fresh link invalidates any outstanding correlation state
        self.shared.state.lock().unwrap().reset_correlation();
        Ok(())
    }

    #[cfg(not(feature = "serial"))]
    pub fn open_device(&mut self, _serial: &SerialConfig) -> Result<(), OpenError> {
        Err(OpenError::NoPort)
    }

    pub fn is_open(&self) -> bool {
        #[cfg(feature = "serial")]
        {
            self.port.is_some()
        }
        #[cfg(not(feature = "serial"))]
        {
            false
        }
    }

    /// Spawn the reader and scheduler tasks and post the initial local
    /// radio query plus a first discovery sweep.
    pub fn start_run_loop(&mut self) -> Result<(), OpenError> {
        if self.running {
            return Err(OpenError::AlreadyRunning);
        }
        #[cfg(feature = "serial")]
        {
            let port = self.port.as_ref().ok_or(OpenError::NotOpen)?.clone();
            self.shared.stop.store(false, Ordering::Relaxed);
            self.shared.query_local_radio();
            self.shared.request_node_discover();
            self.tasks
                .push(tokio::spawn(reader_loop(self.shared.clone(), port.clone())));
            self.tasks
                .push(tokio::spawn(scheduler_loop(self.shared.clone(), port)));
            self.running = true;
            Ok(())
        }
        #[cfg(not(feature = "serial"))]
        {
            Err(OpenError::NotOpen)
        }
    }

    /// Signal the background tasks to exit and wait for them with bounded
    /// polling. Advisory only: a stuck task is logged, never killed.
    pub async fn stop_run_loop(&mut self) {
        if !self.running {
            return;
        }
        self.shared.stop.store(true, Ordering::Relaxed);
        for mut task in self.tasks.drain(..) {
            let mut finished = false;
            for _ in 0..4 {
                match tokio::time::timeout(Duration::from_millis(500), &mut task).await {
                    Ok(_) => {
                        finished = true;
                        break;
                    }
                    Err(_) => info!("Waiting for radio task to finish..."),
                }
            }
            if !finished {
                warn!("Radio task did not exit in time, detaching");
            }
        }
        self.running = false;
    }

    /// Stop the run loop, drop the port, and discard any frames still
    /// queued for transmission.
    pub async fn close_device(&mut self) {
        self.stop_run_loop().await;
        #[cfg(feature = "serial")]
        {
            self.port = None;
        }
        self.shared.tx_q.lock().unwrap().clear();
    }

    /// A cloneable request/snapshot handle for other tasks.
    pub fn handle(&self) -> RadioHandle {
        RadioHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn send_data(&self, address: LongAddress, payload: &[u8]) -> Result<(), SendError> {
        self.shared.send_data(address, payload)
    }

    pub fn request_node_discover(&self) {
        self.shared.request_node_discover();
    }

    pub fn request_node_id_change(&self, address: LongAddress, node_id: &str) {
        self.shared.request_node_id_change(address, node_id);
    }

    pub fn stats(&self) -> Vec<NodeRecord> {
        self.shared.state.lock().unwrap().snapshot()
    }

    pub fn local_radio(&self) -> NodeRecord {
        self.shared.state.lock().unwrap().local_radio()
    }

    /// Post the local-radio identity queries (serial-high/low, PAN id,
    /// node identifier). Called automatically by `start_run_loop`.
    pub fn query_local_radio(&self) {
        self.shared.query_local_radio();
    }

    /// Feed raw transport bytes into the reassembler and dispatch every
    /// completed frame. The serial reader task calls this; embedders that
    /// drive their own transport (and tests) may call it directly.
    pub fn feed_bytes(&self, data: &[u8]) {
        self.shared.feed_bytes(data);
    }

    /// Perform one scheduler step and return the frame that should be
    /// written to the transport, if any. The scheduler task calls this at
    /// the configured tick interval; embedders driving their own transport
    /// may call it directly.
    pub fn tick(&self) -> Option<Vec<u8>> {
        self.shared.tick()
    }
}

#[cfg(feature = "serial")]
async fn reader_loop(shared: Arc<Shared>, port: Arc<Mutex<Box<dyn SerialPort>>>) {
    use std::io::Read;
    info!("Radio reader task started");
    let mut interval = tokio::time::interval(Duration::from_millis(10));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut buffer = [0u8; 1024];
    while !shared.stop.load(Ordering::Relaxed) {
        interval.tick().await;
        let read = {
            let mut port = port.lock().unwrap();
            port.read(&mut buffer)
        };
        match read {
            Ok(n) if n > 0 => shared.feed_bytes(&buffer[..n]),
            Ok(_) => {}
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("Serial read failed: {} - continuing", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    info!("Radio reader task stopped");
}

#[cfg(feature = "serial")]
async fn scheduler_loop(shared: Arc<Shared>, port: Arc<Mutex<Box<dyn SerialPort>>>) {
    use std::io::Write;
    info!("Radio scheduler task started");
    let mut interval = tokio::time::interval(shared.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while !shared.stop.load(Ordering::Relaxed) {
        interval.tick().await;
        if let Some(frame) = shared.tick() {
            let result = {
                let mut port = port.lock().unwrap();
                port.write_all(&frame)
            };
            if let Err(e) = result {
                warn!("Serial write failed: {}", e);
            }
        }
    }
    info!("Radio scheduler task stopped");
}
