//! Whole-graph wire encoding.
//!
//! Layout: a header (`flags: u32` with the version in its low byte,
//! `sample_rate: f32`, `destination: u64`) followed by tagged sections of
//! `{tag: u32, payload_len: u32, payload}`. Readers skip sections whose tag
//! they do not recognize, so the format can grow without breaking older
//! peers. Node entries are emitted in ascending id order; connection and
//! automation tables are emitted pre-sorted, so byte equality follows from
//! value equality.

use crate::description::{
    AutomationEvent, AutomationKind, Connection, NodeDescription, NodeId, ParamKey,
};
use cadenza_core::wire::{WireError, WireReader, WireResult, WireWriter};
use std::collections::BTreeMap;

pub const WIRE_VERSION: u32 = 1;

const SECTION_NODE_TABLE: u32 = 1;
const SECTION_CONNECTION_TABLE: u32 = 2;
const SECTION_AUTOMATION_TABLE: u32 = 3;

/// One renderable generation of the graph: destination, nodes, sorted
/// connections, sorted automation events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphDescription {
    pub sample_rate: f32,
    pub destination: Option<NodeId>,
    pub nodes: BTreeMap<NodeId, NodeDescription>,
    /// Sorted by (source, destination, output index, input index).
    pub connections: Vec<Connection>,
    /// Sorted by (node, param, frame).
    pub automations: Vec<AutomationEvent>,
}

impl GraphDescription {
    /// Restores the orderings value equality depends on. Snapshot and
    /// decode both end with this.
    pub fn normalize(&mut self) {
        self.connections.sort_unstable();
        self.automations.sort_unstable_by_key(|e| {
            (e.node, e.param as u8, e.at_frame)
        });
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        let flags_at = writer.position();
        writer.write_u32(0);
        writer.write_f32(self.sample_rate);
        writer.write_u64(self.destination.map(|id| id.0).unwrap_or(u64::MAX));

        write_section(&mut writer, SECTION_NODE_TABLE, |writer| {
            writer.write_u32(self.nodes.len() as u32);
            for (id, node) in &self.nodes {
                writer.write_u64(id.0);
                writer.write_u8(node.kind_tag());
                let len_at = writer.position();
                writer.write_u32(0);
                let start = writer.position();
                node.encode_wire_payload(writer);
                writer.patch_u32(len_at, (writer.position() - start) as u32);
            }
        });

        write_section(&mut writer, SECTION_CONNECTION_TABLE, |writer| {
            writer.write_u32(self.connections.len() as u32);
            for c in &self.connections {
                writer.write_u64(c.source.0);
                writer.write_u64(c.destination.0);
                writer.write_u32(c.output_index);
                writer.write_u32(c.input_index);
            }
        });

        write_section(&mut writer, SECTION_AUTOMATION_TABLE, |writer| {
            writer.write_u32(self.automations.len() as u32);
            for e in &self.automations {
                writer.write_u64(e.node.0);
                writer.write_u8(e.param as u8);
                writer.write_u64(e.at_frame);
                match e.kind {
                    AutomationKind::SetValue(v) => {
                        writer.write_u8(0);
                        writer.write_f32(v);
                    }
                    AutomationKind::LinearRampToValue(v) => {
                        writer.write_u8(1);
                        writer.write_f32(v);
                    }
                }
            }
        });

        // Version is patched last so a partially written buffer is never
        // mistaken for a complete one.
        writer.patch_u32(flags_at, WIRE_VERSION);
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut reader = WireReader::new(bytes);
        let flags = reader.read_u32()?;
        let version = flags & 0xFF;
        if version == 0 || version > WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let sample_rate = reader.read_f32()?;
        let destination = match reader.read_u64()? {
            u64::MAX => None,
            id => Some(NodeId(id)),
        };

        let mut graph = GraphDescription {
            sample_rate,
            destination,
            ..Default::default()
        };

        while !reader.is_empty() {
            let tag = reader.read_u32()?;
            let len = reader.read_u32()? as usize;
            let mut section = reader.sub_reader(len)?;
            match tag {
                SECTION_NODE_TABLE => decode_node_table(&mut section, &mut graph)?,
                SECTION_CONNECTION_TABLE => decode_connection_table(&mut section, &mut graph)?,
                SECTION_AUTOMATION_TABLE => decode_automation_table(&mut section, &mut graph)?,
                _ => {} // Unknown section, skipped by length.
            }
        }

        graph.normalize();
        Ok(graph)
    }
}

fn write_section(writer: &mut WireWriter, tag: u32, body: impl FnOnce(&mut WireWriter)) {
    writer.write_u32(tag);
    let len_at = writer.position();
    writer.write_u32(0);
    let start = writer.position();
    body(writer);
    writer.patch_u32(len_at, (writer.position() - start) as u32);
}

fn decode_node_table(reader: &mut WireReader, graph: &mut GraphDescription) -> WireResult<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let id = NodeId(reader.read_u64()?);
        let kind = reader.read_u8()?;
        let payload_len = reader.read_u32()? as usize;
        let mut payload = reader.sub_reader(payload_len)?;
        let node = NodeDescription::decode_wire_payload(kind, &mut payload)?;
        graph.nodes.insert(id, node);
    }
    Ok(())
}

fn decode_connection_table(
    reader: &mut WireReader,
    graph: &mut GraphDescription,
) -> WireResult<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        graph.connections.push(Connection {
            source: NodeId(reader.read_u64()?),
            destination: NodeId(reader.read_u64()?),
            output_index: reader.read_u32()?,
            input_index: reader.read_u32()?,
        });
    }
    Ok(())
}

fn decode_automation_table(
    reader: &mut WireReader,
    graph: &mut GraphDescription,
) -> WireResult<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let node = NodeId(reader.read_u64()?);
        let param = ParamKey::from_wire(reader.read_u8()?)
            .ok_or(WireError::MalformedSection("automation param tag"))?;
        let at_frame = reader.read_u64()?;
        let kind = match reader.read_u8()? {
            0 => AutomationKind::SetValue(reader.read_f32()?),
            1 => AutomationKind::LinearRampToValue(reader.read_f32()?),
            _ => return Err(WireError::MalformedSection("automation kind tag")),
        };
        graph.automations.push(AutomationEvent {
            node,
            param,
            at_frame,
            kind,
        });
    }
    Ok(())
}
