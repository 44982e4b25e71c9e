//! Runtime environment descriptor
//!
//! Describes where the checks are running. Check applicability is decided
//! against this once, when a dispatcher is built.

use serde::{Deserialize, Serialize};

/// Product edition, ordered from least to most capable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Community,
    Pro,
    Enterprise,
}

impl Default for Edition {
    fn default() -> Self {
        Edition::Community
    }
}

impl std::fmt::Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edition::Community => write!(f, "community"),
            Edition::Pro => write!(f, "pro"),
            Edition::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Kind of interface the entities are observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    /// Live packet capture (full TCP flag visibility)
    PacketCapture,
    /// Flow export collector (NetFlow/IPFIX/sFlow)
    FlowCollector,
    /// Aggregated view over other interfaces
    View,
}

impl Default for InterfaceType {
    fn default() -> Self {
        InterfaceType::PacketCapture
    }
}

impl InterfaceType {
    pub fn is_packet_interface(&self) -> bool {
        matches!(self, InterfaceType::PacketCapture)
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceType::PacketCapture => write!(f, "packet_capture"),
            InterfaceType::FlowCollector => write!(f, "flow_collector"),
            InterfaceType::View => write!(f, "view"),
        }
    }
}

/// Deployment mode of the running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Passive monitoring
    Standard,
    /// Inline edge gateway
    Edge,
}

impl Default for DeploymentMode {
    fn default() -> Self {
        DeploymentMode::Standard
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Standard => write!(f, "standard"),
            DeploymentMode::Edge => write!(f, "edge"),
        }
    }
}

/// Static descriptor checked against every check's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub edition: Edition,
    #[serde(default)]
    pub interface: InterfaceType,
    #[serde(default)]
    pub mode: DeploymentMode,
}

impl Environment {
    pub fn new(edition: Edition, interface: InterfaceType, mode: DeploymentMode) -> Self {
        Self { edition, interface, mode }
    }

    /// Community edition, packet capture, standard mode
    pub fn packet_capture() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.edition, self.interface, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edition_ordering() {
        assert!(Edition::Community < Edition::Pro);
        assert!(Edition::Pro < Edition::Enterprise);
    }

    #[test]
    fn test_environment_display() {
        let env = Environment::new(Edition::Pro, InterfaceType::FlowCollector, DeploymentMode::Edge);
        assert_eq!(env.to_string(), "pro/flow_collector/edge");
        assert!(!env.interface.is_packet_interface());
        assert!(Environment::packet_capture().interface.is_packet_interface());
    }
}
