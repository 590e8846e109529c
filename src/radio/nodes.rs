//! Node table and the shared mutable state of the protocol engine.
//!
//! Everything the frame handlers mutate lives in one guarded aggregate,
//! [`RadioState`]: the per-node records keyed by 64-bit address, the
//! pending-frame correlation slots, the frame-id counter, the local radio's
//! own identity fields, and the active discovery session. Callers take
//! point-in-time copies via [`RadioState::snapshot`]; the table itself is
//! never exposed by reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::codec::BROADCAST_NET_ADDRESS;

/// 64-bit globally unique radio identity, assigned at manufacture.
pub type LongAddress = u64;

/// 16-bit mesh-local address; may change when a node rejoins.
pub type NetworkAddress = u16;

/// Device role reported by node discovery. `LocalRadio` is synthesized for
/// the radio attached to this gateway and never arrives over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Coordinator,
    Router,
    Endpoint,
    LocalRadio,
}

impl DeviceType {
    /// Map an ND response device-type byte. Unknown values yield `None` and
    /// the caller drops the record with a diagnostic.
    pub fn from_wire(byte: u8) -> Option<DeviceType> {
        match byte {
            0x00 => Some(DeviceType::Coordinator),
            0x01 => Some(DeviceType::Router),
            0x02 => Some(DeviceType::Endpoint),
            _ => None,
        }
    }
}

/// Everything the gateway knows about one node, refined as observations
/// arrive and never deleted for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub address: LongAddress,
    pub net_address: NetworkAddress,
    /// Text label from discovery or an acknowledged rename, at most 20 bytes.
    pub node_id: String,
    /// Rename staged by a request and committed only on a matching
    /// successful response.
    pub new_node_id: Option<String>,
    pub device_type: DeviceType,
    pub parent_net_address: NetworkAddress,
    pub profile_id: u16,
    pub manufacturer_id: u16,
    pub pan_id: u64,
    pub tx_count: u32,
    pub rx_count: u32,
    pub last_frame_id: u8,
    pub last_delivery_status: u8,
    pub last_discovery_status: u8,
    pub last_receive_options: u8,
    /// Discovery sweep that most recently observed this node.
    pub discovery_sequence: u32,
}

impl NodeRecord {
    pub fn new(
        address: LongAddress,
        frame_id: u8,
        net_address: NetworkAddress,
        discovery_sequence: u32,
    ) -> Self {
        NodeRecord {
            address,
            net_address,
            node_id: String::new(),
            new_node_id: None,
            device_type: DeviceType::Endpoint,
            parent_net_address: 0,
            profile_id: 0,
            manufacturer_id: 0,
            pan_id: 0,
            tx_count: 0,
            rx_count: 0,
            last_frame_id: frame_id,
            last_delivery_status: 0,
            last_discovery_status: 0,
            last_receive_options: 0,
            discovery_sequence,
        }
    }

    /// Merge a freshly parsed discovery record into this one: topology
    /// fields are replaced, accumulated counters are preserved.
    pub fn update_from_discovery(&mut self, other: &NodeRecord) {
        self.net_address = other.net_address;
        self.parent_net_address = other.parent_net_address;
        self.device_type = other.device_type;
        self.profile_id = other.profile_id;
        self.manufacturer_id = other.manufacturer_id;
        self.node_id = other.node_id.clone();
        self.discovery_sequence = other.discovery_sequence;
    }
}

// one slot per possible frame id byte
const PENDING_SLOTS: usize = 256;

/// The engine's single guarded aggregate. Held behind one mutex by the
/// controller; no method here takes any other lock.
pub(crate) struct RadioState {
    nodes: BTreeMap<LongAddress, NodeRecord>,
    /// Frame-id correlation slots. Index is the id byte; slot 0 is never
    /// allocated. A freed slot discards its address mapping.
    pending: [Option<LongAddress>; PENDING_SLOTS],
    last_frame_id: u8,
    pub local_address: LongAddress,
    pub local_node_id: String,
    pub new_local_node_id: Option<String>,
    pub pan_id: u64,
    pub local_tx_count: u32,
    pub local_rx_count: u32,
    /// Ticks remaining until the active discovery sweep is reported;
    /// zero means no sweep in flight.
    pub discover_wait: u32,
    pub discover_sequence: u32,
}

impl RadioState {
    pub fn new() -> Self {
        RadioState {
            nodes: BTreeMap::new(),
            pending: [None; PENDING_SLOTS],
            last_frame_id: 0,
            local_address: 0,
            local_node_id: String::new(),
            new_local_node_id: None,
            pan_id: 0,
            local_tx_count: 0,
            local_rx_count: 0,
            discover_wait: 0,
            discover_sequence: 0,
        }
    }

    /// Forget all in-flight correlation: every pending slot is freed and
    /// the id counter restarts. Called when the serial link is (re)opened.
    pub fn reset_correlation(&mut self) {
        self.pending = [None; PENDING_SLOTS];
        self.last_frame_id = 0;
    }

    /// Allocate the next frame id. Wraps through the full byte range while
    /// skipping 0, which the radio treats as "no status requested".
    pub fn next_frame_id(&mut self) -> u8 {
        self.last_frame_id = self.last_frame_id.wrapping_add(1);
        if self.last_frame_id == 0 {
            self.last_frame_id = 1;
        }
        self.last_frame_id
    }

    pub fn pending_set(&mut self, frame_id: u8, address: LongAddress) {
        self.pending[frame_id as usize] = Some(address);
    }

    pub fn pending_peek(&self, frame_id: u8) -> Option<LongAddress> {
        self.pending[frame_id as usize]
    }

    pub fn pending_clear(&mut self, frame_id: u8) {
        self.pending[frame_id as usize] = None;
    }

    pub fn node(&self, address: LongAddress) -> Option<&NodeRecord> {
        self.nodes.get(&address)
    }

    pub fn node_mut(&mut self, address: LongAddress) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&address)
    }

    pub fn contains(&self, address: LongAddress) -> bool {
        self.nodes.contains_key(&address)
    }

    /// Record lookup-or-create for an outbound send. A node first seen here
    /// starts with an unknown (broadcast) network address until a transmit
    /// status or discovery response teaches us better.
    pub fn node_for_send(&mut self, address: LongAddress, frame_id: u8) -> &mut NodeRecord {
        let record = self
            .nodes
            .entry(address)
            .or_insert_with(|| NodeRecord::new(address, frame_id, BROADCAST_NET_ADDRESS, 0));
        record.last_frame_id = frame_id;
        record
    }

    /// Record lookup-or-create for unsolicited reception, which carries the
    /// sender's current network address in the packet header.
    pub fn node_for_receive(
        &mut self,
        address: LongAddress,
        net_address: NetworkAddress,
    ) -> &mut NodeRecord {
        let sequence = self.discover_sequence;
        self.nodes
            .entry(address)
            .or_insert_with(|| NodeRecord::new(address, 0, net_address, sequence))
    }

    /// Apply a parsed discovery record: create the node or merge into the
    /// existing one, preserving its counters.
    pub fn upsert_discovered(&mut self, discovered: NodeRecord) {
        match self.nodes.get_mut(&discovered.address) {
            Some(existing) => existing.update_from_discovery(&discovered),
            None => {
                self.nodes.insert(discovered.address, discovered);
            }
        }
    }

    /// Synthetic record for the radio attached to this gateway, assembled
    /// from the engine-level scalars rather than stored as a table entry.
    pub fn local_radio(&self) -> NodeRecord {
        let mut record = NodeRecord::new(self.local_address, 0, 0, self.discover_sequence);
        record.device_type = DeviceType::LocalRadio;
        record.node_id = self.local_node_id.clone();
        record.pan_id = self.pan_id;
        record.tx_count = self.local_tx_count;
        record.rx_count = self.local_rx_count;
        record
    }

    /// Point-in-time copy of every record, local radio first.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let mut list = Vec::with_capacity(self.nodes.len() + 1);
        list.push(self.local_radio());
        list.extend(self.nodes.values().cloned());
        list
    }

    /// Copy of the records observed by the active sweep, local radio first.
    pub fn discovery_snapshot(&self) -> Vec<NodeRecord> {
        let mut list = vec![self.local_radio()];
        list.extend(
            self.nodes
                .values()
                .filter(|record| record.discovery_sequence == self.discover_sequence)
                .cloned(),
        );
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_skips_zero_and_wraps() {
        let mut state = RadioState::new();
        let mut seen = Vec::new();
        for _ in 0..300 {
            seen.push(state.next_frame_id());
        }
        assert!(seen.iter().all(|&id| id != 0));
        assert_eq!(seen[0], 1);
        assert_eq!(seen[254], 255);
        assert_eq!(seen[255], 1); // 255 wraps to 1, never 0
    }

    #[test]
    fn upsert_is_idempotent_and_preserves_counters() {
        let mut state = RadioState::new();
        let mut discovered = NodeRecord::new(0xAA, 0, 0x1234, 1);
        discovered.node_id = "pump-room".into();
        discovered.device_type = DeviceType::Router;

        state.upsert_discovered(discovered.clone());
        state.node_mut(0xAA).unwrap().tx_count = 7;
        state.node_mut(0xAA).unwrap().rx_count = 3;

        state.upsert_discovered(discovered);
        let list = state.snapshot();
        assert_eq!(list.len(), 2); // local + one node, not two
        let record = state.node(0xAA).unwrap();
        assert_eq!(record.tx_count, 7);
        assert_eq!(record.rx_count, 3);
        assert_eq!(record.node_id, "pump-room");
        assert_eq!(record.device_type, DeviceType::Router);
    }

    #[test]
    fn snapshot_prepends_synthetic_local_record() {
        let mut state = RadioState::new();
        state.local_address = 0x0013A200DEADBEEF;
        state.local_node_id = "gateway".into();
        state.pan_id = 0x42;
        state.local_tx_count = 11;
        state.upsert_discovered(NodeRecord::new(0xBB, 0, 0x0001, 0));

        let list = state.snapshot();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].device_type, DeviceType::LocalRadio);
        assert_eq!(list[0].net_address, 0);
        assert_eq!(list[0].address, 0x0013A200DEADBEEF);
        assert_eq!(list[0].tx_count, 11);
        assert_eq!(list[0].pan_id, 0x42);
    }

    #[test]
    fn discovery_snapshot_filters_by_sequence() {
        let mut state = RadioState::new();
        state.discover_sequence = 2;
        state.upsert_discovered(NodeRecord::new(0x01, 0, 0x0001, 1));
        state.upsert_discovered(NodeRecord::new(0x02, 0, 0x0002, 2));

        let list = state.discovery_snapshot();
        assert_eq!(list.len(), 2); // local + the sequence-2 node
        assert_eq!(list[1].address, 0x02);
    }

    #[test]
    fn unknown_device_type_rejected() {
        assert_eq!(DeviceType::from_wire(0x00), Some(DeviceType::Coordinator));
        assert_eq!(DeviceType::from_wire(0x01), Some(DeviceType::Router));
        assert_eq!(DeviceType::from_wire(0x02), Some(DeviceType::Endpoint));
        assert_eq!(DeviceType::from_wire(0x10), None);
    }
}
