//! Alert records
//!
//! An [`AlertRecord`] is the immutable result of one positive check
//! evaluation. It is built once by the check that detected the condition
//! and then handed to an [`AlertSink`], which takes ownership.
//!
//! Serialized form:
//!
//! ```text
//! {
//!   "alert_id": "...", "check": "scan_detection",
//!   "alert_kind": "scan_detected", "alert_category": "security",
//!   "score": 80, "cli_score": 80, "srv_score": 0,
//!   "entity": { "host": { ... } },
//!   "emitted_at": "...",
//!   "payload": { "num_incomplete_flows": 5, "num_incomplete_flows_threshold": 5 }
//! }
//! ```

pub mod payload;
pub mod sink;

pub use payload::{AlertPayload, Document, FieldValue, PayloadWriter};
pub use sink::{AlertSink, ChannelSink, MemorySink};

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::{CheckError, Result};
use crate::types::{Flow, Host};

/// Alert kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TcpFlowReset,
    RemoteToLocalInsecureProto,
    ScanDetected,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::TcpFlowReset => write!(f, "tcp_flow_reset"),
            AlertKind::RemoteToLocalInsecureProto => write!(f, "remote_to_local_insecure_proto"),
            AlertKind::ScanDetected => write!(f, "scan_detected"),
        }
    }
}

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Other,
    Security,
    Network,
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCategory::Other => write!(f, "other"),
            AlertCategory::Security => write!(f, "security"),
            AlertCategory::Network => write!(f, "network"),
        }
    }
}

/// The (kind, category) pair identifying an alert type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AlertType {
    #[serde(rename = "alert_kind")]
    pub kind: AlertKind,
    #[serde(rename = "alert_category")]
    pub category: AlertCategory,
}

impl AlertType {
    pub const TCP_FLOW_RESET: AlertType = AlertType {
        kind: AlertKind::TcpFlowReset,
        category: AlertCategory::Network,
    };
    pub const REMOTE_TO_LOCAL_INSECURE_PROTO: AlertType = AlertType {
        kind: AlertKind::RemoteToLocalInsecureProto,
        category: AlertCategory::Security,
    };
    pub const SCAN_DETECTED: AlertType = AlertType {
        kind: AlertKind::ScanDetected,
        category: AlertCategory::Security,
    };
}

/// Ordered severity scale, values on 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
#[repr(u8)]
pub enum ScoreLevel {
    Info = 10,
    Notice = 30,
    Warning = 50,
    Error = 80,
    Severe = 100,
}

impl ScoreLevel {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl From<ScoreLevel> for u8 {
    fn from(level: ScoreLevel) -> u8 {
        level.value()
    }
}

impl std::fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreLevel::Info => write!(f, "INFO"),
            ScoreLevel::Notice => write!(f, "NOTICE"),
            ScoreLevel::Warning => write!(f, "WARNING"),
            ScoreLevel::Error => write!(f, "ERROR"),
            ScoreLevel::Severe => write!(f, "SEVERE"),
        }
    }
}

/// Share of an alert's score attributed to the client side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RiskPercentage(u8);

impl RiskPercentage {
    pub const CLIENT_FULL: RiskPercentage = RiskPercentage(100);
    pub const CLIENT_HIGH: RiskPercentage = RiskPercentage(80);
    pub const CLIENT_FAIR: RiskPercentage = RiskPercentage(50);
    pub const CLIENT_LOW: RiskPercentage = RiskPercentage(20);
    pub const CLIENT_NONE: RiskPercentage = RiskPercentage(0);

    pub fn new(pct: u8) -> Result<Self> {
        if pct > 100 {
            return Err(CheckError::InvalidRiskPercentage(pct));
        }
        Ok(Self(pct))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Split a score into (client, server) parts
    pub fn split(&self, score: u8) -> (u8, u8) {
        let cli = (u16::from(score) * u16::from(self.0) / 100) as u8;
        (cli, score - cli)
    }
}

impl Default for RiskPercentage {
    fn default() -> Self {
        RiskPercentage::CLIENT_FAIR
    }
}

/// Standard identifiers of the entity an alert is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Flow {
        flow_id: u64,
        vlan_id: u16,
        cli_ip: IpAddr,
        cli_port: u16,
        srv_ip: IpAddr,
        srv_port: u16,
        l4_proto: u8,
    },
    Host {
        ip: IpAddr,
        vlan_id: u16,
        is_local: bool,
    },
}

impl From<&Flow> for EntityRef {
    fn from(flow: &Flow) -> Self {
        EntityRef::Flow {
            flow_id: flow.id,
            vlan_id: flow.vlan_id,
            cli_ip: flow.client.ip,
            cli_port: flow.client.port,
            srv_ip: flow.server.ip,
            srv_port: flow.server.port,
            l4_proto: flow.l4_proto.number(),
        }
    }
}

impl From<&Host> for EntityRef {
    fn from(host: &Host) -> Self {
        EntityRef::Host {
            ip: host.ip,
            vlan_id: host.vlan_id,
            is_local: host.is_local,
        }
    }
}

/// One alert, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    alert_id: Uuid,
    check: &'static str,
    #[serde(flatten)]
    alert_type: AlertType,
    score: ScoreLevel,
    cli_score: u8,
    srv_score: u8,
    entity: EntityRef,
    emitted_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_payload")]
    payload: AlertPayload,
}

fn serialize_payload<S: Serializer>(payload: &AlertPayload, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    payload.to_document().serialize(serializer)
}

impl AlertRecord {
    pub fn builder(check: &'static str, alert_type: AlertType, entity: EntityRef) -> AlertRecordBuilder {
        AlertRecordBuilder {
            check,
            alert_type,
            entity,
            score: ScoreLevel::Info,
            risk: RiskPercentage::default(),
            payload: AlertPayload::Empty,
        }
    }

    pub fn id(&self) -> Uuid {
        self.alert_id
    }

    pub fn check(&self) -> &'static str {
        self.check
    }

    pub fn alert_type(&self) -> AlertType {
        self.alert_type
    }

    pub fn kind(&self) -> AlertKind {
        self.alert_type.kind
    }

    pub fn category(&self) -> AlertCategory {
        self.alert_type.category
    }

    pub fn score(&self) -> ScoreLevel {
        self.score
    }

    pub fn cli_score(&self) -> u8 {
        self.cli_score
    }

    pub fn srv_score(&self) -> u8 {
        self.srv_score
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }

    pub fn payload(&self) -> &AlertPayload {
        &self.payload
    }

    /// Outbound JSON document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub struct AlertRecordBuilder {
    check: &'static str,
    alert_type: AlertType,
    entity: EntityRef,
    score: ScoreLevel,
    risk: RiskPercentage,
    payload: AlertPayload,
}

impl AlertRecordBuilder {
    pub fn score(mut self, score: ScoreLevel) -> Self {
        self.score = score;
        self
    }

    pub fn risk(mut self, risk: RiskPercentage) -> Self {
        self.risk = risk;
        self
    }

    pub fn payload(mut self, payload: AlertPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> AlertRecord {
        let (cli_score, srv_score) = self.risk.split(self.score.value());
        AlertRecord {
            alert_id: Uuid::new_v4(),
            check: self.check,
            alert_type: self.alert_type,
            score: self.score,
            cli_score,
            srv_score,
            entity: self.entity,
            emitted_at: Utc::now(),
            payload: self.payload,
        }
    }
}
