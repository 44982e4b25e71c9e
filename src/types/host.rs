//! Host entity as seen by host checks

use std::net::IpAddr;

/// Counters aggregated over a host's flows in the current window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCounters {
    /// Flows that never completed a handshake or data exchange
    pub num_incomplete_flows: u64,
    /// Distinct server ports contacted while acting as client
    pub num_server_ports: u16,
    /// Host only received traffic
    pub is_rx_only: bool,
}

/// Tracked network endpoint
#[derive(Debug, Clone)]
pub struct Host {
    pub ip: IpAddr,
    pub vlan_id: u16,
    pub is_local: bool,
    /// Autonomous system the host belongs to, if resolved
    pub asn: Option<u32>,
    pub counters: HostCounters,
}

impl Host {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            vlan_id: 0,
            is_local: false,
            asn: None,
            counters: HostCounters::default(),
        }
    }

    pub fn with_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    /// Start a new observation window
    pub fn reset_counters(&mut self) {
        self.counters = HostCounters::default();
    }
}
