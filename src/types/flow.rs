//! Flow entity as seen by flow checks
//!
//! Flows are owned by the traffic tracker. Checks only ever get a shared
//! reference for the duration of one dispatch.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::protocol::ProtocolInfo;

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum L4Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl L4Protocol {
    pub fn number(&self) -> u8 {
        match self {
            L4Protocol::Tcp => 6,
            L4Protocol::Udp => 17,
            L4Protocol::Icmp => 1,
            L4Protocol::Other(n) => *n,
        }
    }
}

impl From<u8> for L4Protocol {
    fn from(val: u8) -> Self {
        match val {
            6 => L4Protocol::Tcp,
            17 => L4Protocol::Udp,
            1 => L4Protocol::Icmp,
            n => L4Protocol::Other(n),
        }
    }
}

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;

    /// Decode the flags byte of a TCP header
    pub fn from_u8(bits: u8) -> Self {
        let has = |mask: u8| bits & mask != 0;
        Self {
            fin: has(Self::FIN),
            syn: has(Self::SYN),
            rst: has(Self::RST),
            psh: has(Self::PSH),
            ack: has(Self::ACK),
            urg: has(Self::URG),
            ece: has(Self::ECE),
            cwr: has(Self::CWR),
        }
    }

    pub fn to_u8(&self) -> u8 {
        [
            (self.fin, Self::FIN),
            (self.syn, Self::SYN),
            (self.rst, Self::RST),
            (self.psh, Self::PSH),
            (self.ack, Self::ACK),
            (self.urg, Self::URG),
            (self.ece, Self::ECE),
            (self.cwr, Self::CWR),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |bits, (_, mask)| bits | mask)
    }

    /// Accumulate the flags of another segment
    pub fn merge(&mut self, other: TcpFlags) {
        self.fin |= other.fin;
        self.syn |= other.syn;
        self.rst |= other.rst;
        self.psh |= other.psh;
        self.ack |= other.ack;
        self.urg |= other.urg;
        self.ece |= other.ece;
        self.cwr |= other.cwr;
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.syn { s.push('S'); }
        if self.ack { s.push('A'); }
        if self.fin { s.push('F'); }
        if self.rst { s.push('R'); }
        if self.psh { s.push('P'); }
        if self.urg { s.push('U'); }
        if s.is_empty() {
            s.push('.');
        }
        write!(f, "{}", s)
    }
}

/// Cumulative TCP flag history of a flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlagHistory {
    /// Flags seen from client to server
    pub client_flags: TcpFlags,
    /// Flags seen from server to client
    pub server_flags: TcpFlags,
    /// SYN, SYN-ACK, ACK observed in order
    pub handshake_completed: bool,
}

impl TcpFlagHistory {
    /// Record a client-to-server segment
    pub fn record_client(&mut self, flags: TcpFlags) {
        self.client_flags.merge(flags);
        if flags.ack && !flags.syn && self.client_flags.syn && self.server_flags.syn && self.server_flags.ack {
            self.handshake_completed = true;
        }
    }

    /// Record a server-to-client segment
    pub fn record_server(&mut self, flags: TcpFlags) {
        self.server_flags.merge(flags);
    }

    /// A RST was seen in either direction
    pub fn is_reset(&self) -> bool {
        self.client_flags.rst || self.server_flags.rst
    }
}

/// One side of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
    /// Address belongs to a local network
    pub is_local: bool,
    /// Autonomous system, if resolved
    pub asn: Option<u32>,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port, is_local: false, asn: None }
    }

    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    pub fn with_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }
}

/// Per-direction traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowCounters {
    pub cli2srv_packets: u64,
    pub cli2srv_bytes: u64,
    /// Application payload bytes, headers excluded
    pub cli2srv_payload_bytes: u64,
    pub srv2cli_packets: u64,
    pub srv2cli_bytes: u64,
    pub srv2cli_payload_bytes: u64,
}

impl FlowCounters {
    /// Payload carried in both directions
    pub fn is_bidirectional_exchange(&self) -> bool {
        self.cli2srv_payload_bytes > 0 && self.srv2cli_payload_bytes > 0
    }
}

/// Bidirectional connection flow
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: u64,
    pub vlan_id: u16,
    /// Initiator
    pub client: Endpoint,
    /// Responder
    pub server: Endpoint,
    pub l4_proto: L4Protocol,
    /// `None` until classification has completed
    pub protocol: Option<ProtocolInfo>,
    pub counters: FlowCounters,
    pub tcp: TcpFlagHistory,
}

impl Flow {
    pub fn new(id: u64, client: Endpoint, server: Endpoint, l4_proto: L4Protocol) -> Self {
        Self {
            id,
            vlan_id: 0,
            client,
            server,
            l4_proto,
            protocol: None,
            counters: FlowCounters::default(),
            tcp: TcpFlagHistory::default(),
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.l4_proto == L4Protocol::Tcp
    }

    /// Remote client talking to a local server
    pub fn is_remote_to_local(&self) -> bool {
        !self.client.is_local && self.server.is_local
    }
}
