//! Alert payloads and the structured writer they serialize through
//!
//! Every payload variant owns a fixed schema: the keys it writes, their
//! order and their integer widths. [`AlertPayload::write_to`] is the only
//! place a schema is written, and [`AlertPayload::schema`] documents it.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single payload value with its wire width preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    I32(i32),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
}

impl FieldValue {
    /// Integer view, `None` for strings
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::I32(v) => u64::try_from(*v).ok(),
            FieldValue::U8(v) => Some(u64::from(*v)),
            FieldValue::U16(v) => Some(u64::from(*v)),
            FieldValue::U32(v) => Some(u64::from(*v)),
            FieldValue::U64(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::I32(v) => serializer.serialize_i32(*v),
            FieldValue::U8(v) => serializer.serialize_u8(*v),
            FieldValue::U16(v) => serializer.serialize_u16(*v),
            FieldValue::U32(v) => serializer.serialize_u32(*v),
            FieldValue::U64(v) => serializer.serialize_u64(*v),
            FieldValue::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// Generic key/value structured writer
///
/// Output formats implement this; payloads never know which one they are
/// writing to.
pub trait PayloadWriter {
    fn write_i32(&mut self, key: &'static str, value: i32);
    fn write_u8(&mut self, key: &'static str, value: u8);
    fn write_u16(&mut self, key: &'static str, value: u16);
    fn write_u32(&mut self, key: &'static str, value: u32);
    fn write_u64(&mut self, key: &'static str, value: u64);
    fn write_str(&mut self, key: &'static str, value: &str);
}

/// Ordered in-memory document
///
/// Serializes as a map in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<(&'static str, FieldValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, key: &'static str, value: FieldValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(k, _)| *k).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PayloadWriter for Document {
    fn write_i32(&mut self, key: &'static str, value: i32) {
        self.push(key, FieldValue::I32(value));
    }

    fn write_u8(&mut self, key: &'static str, value: u8) {
        self.push(key, FieldValue::U8(value));
    }

    fn write_u16(&mut self, key: &'static str, value: u16) {
        self.push(key, FieldValue::U16(value));
    }

    fn write_u32(&mut self, key: &'static str, value: u32) {
        self.push(key, FieldValue::U32(value));
    }

    fn write_u64(&mut self, key: &'static str, value: u64) {
        self.push(key, FieldValue::U64(value));
    }

    fn write_str(&mut self, key: &'static str, value: &str) {
        self.push(key, FieldValue::Str(value.to_string()));
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

const EMPTY_SCHEMA: &[&str] = &[];
const PROTOCOL_BREED_SCHEMA: &[&str] = &[
    "ndpi_breed",
    "ndpi_breed_name",
    "ndpi_category",
    "ndpi_category_name",
];
const INCOMPLETE_FLOWS_SCHEMA: &[&str] = &["num_incomplete_flows", "num_incomplete_flows_threshold"];
const SERVER_PORTS_SCHEMA: &[&str] = &[
    "num_server_ports",
    "as_client",
    "as_server",
    "as_client_threshold",
    "as_server_threshold",
    "is_rx_only",
];

/// Kind-specific alert payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertPayload {
    /// Standard identifiers only
    Empty,
    /// Classification of the offending protocol
    ProtocolBreed {
        breed: i32,
        breed_name: String,
        category: i32,
        category_name: String,
    },
    /// Scan detected through incomplete flows
    IncompleteFlows {
        num_incomplete_flows: u64,
        num_incomplete_flows_threshold: u64,
    },
    /// Scan detected through server port / AS-scoped counters
    ServerPorts {
        num_server_ports: u16,
        as_client: u32,
        as_server: u32,
        as_client_threshold: u32,
        as_server_threshold: u32,
        is_rx_only: bool,
    },
}

impl AlertPayload {
    /// Keys written by this variant, in order
    pub fn schema(&self) -> &'static [&'static str] {
        match self {
            AlertPayload::Empty => EMPTY_SCHEMA,
            AlertPayload::ProtocolBreed { .. } => PROTOCOL_BREED_SCHEMA,
            AlertPayload::IncompleteFlows { .. } => INCOMPLETE_FLOWS_SCHEMA,
            AlertPayload::ServerPorts { .. } => SERVER_PORTS_SCHEMA,
        }
    }

    pub fn write_to<W: PayloadWriter>(&self, w: &mut W) {
        match self {
            AlertPayload::Empty => {}
            AlertPayload::ProtocolBreed { breed, breed_name, category, category_name } => {
                w.write_i32("ndpi_breed", *breed);
                w.write_str("ndpi_breed_name", breed_name);
                w.write_i32("ndpi_category", *category);
                w.write_str("ndpi_category_name", category_name);
            }
            AlertPayload::IncompleteFlows { num_incomplete_flows, num_incomplete_flows_threshold } => {
                w.write_u64("num_incomplete_flows", *num_incomplete_flows);
                w.write_u64("num_incomplete_flows_threshold", *num_incomplete_flows_threshold);
            }
            AlertPayload::ServerPorts {
                num_server_ports,
                as_client,
                as_server,
                as_client_threshold,
                as_server_threshold,
                is_rx_only,
            } => {
                w.write_u16("num_server_ports", *num_server_ports);
                w.write_u32("as_client", *as_client);
                w.write_u32("as_server", *as_server);
                w.write_u32("as_client_threshold", *as_client_threshold);
                w.write_u32("as_server_threshold", *as_server_threshold);
                w.write_u8("is_rx_only", u8::from(*is_rx_only));
            }
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        self.write_to(&mut doc);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<AlertPayload> {
        vec![
            AlertPayload::Empty,
            AlertPayload::ProtocolBreed {
                breed: 3,
                breed_name: "Unsafe".into(),
                category: 12,
                category_name: "RemoteAccess".into(),
            },
            AlertPayload::IncompleteFlows {
                num_incomplete_flows: 5,
                num_incomplete_flows_threshold: 5,
            },
            AlertPayload::ServerPorts {
                num_server_ports: 70,
                as_client: 100,
                as_server: 3,
                as_client_threshold: 100,
                as_server_threshold: 0,
                is_rx_only: false,
            },
        ]
    }

    #[test]
    fn test_written_keys_match_schema() {
        for payload in all_variants() {
            let doc = payload.to_document();
            assert_eq!(doc.keys(), payload.schema().to_vec(), "{:?}", payload);
        }
    }

    #[test]
    fn test_widths_preserved() {
        let doc = AlertPayload::ServerPorts {
            num_server_ports: 70,
            as_client: 100,
            as_server: 3,
            as_client_threshold: 100,
            as_server_threshold: 0,
            is_rx_only: true,
        }
        .to_document();

        assert_eq!(doc.get("num_server_ports"), Some(&FieldValue::U16(70)));
        assert_eq!(doc.get("as_client"), Some(&FieldValue::U32(100)));
        assert_eq!(doc.get("is_rx_only"), Some(&FieldValue::U8(1)));
    }

    #[test]
    fn test_document_serializes_in_order() {
        let doc = AlertPayload::IncompleteFlows {
            num_incomplete_flows: 7,
            num_incomplete_flows_threshold: 5,
        }
        .to_document();

        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"num_incomplete_flows":7,"num_incomplete_flows_threshold":5}"#);
    }

    #[test]
    fn test_document_overwrites_duplicate_key() {
        let mut doc = Document::new();
        doc.write_u32("as_client", 1);
        doc.write_u32("as_client", 2);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get("as_client").and_then(FieldValue::as_u64), Some(2));
    }
}
