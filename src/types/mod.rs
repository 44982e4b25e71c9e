//! Entity types consumed by checks
//!
//! Flows and hosts are produced and owned by the traffic tracking layer.
//! This module only defines the view checks evaluate against.
//!
//! ## Key Types
//!
//! - [`Flow`] - Bidirectional flow with classification and TCP flag history
//! - [`Host`] - Endpoint with per-window counters
//! - [`Breed`], [`ProtocolCategory`], [`Taxonomy`] - Classification codes and name lookup
//! - [`Environment`] - Edition / interface / deployment mode descriptor

pub mod environment;
pub mod flow;
pub mod host;
pub mod protocol;

pub use environment::{DeploymentMode, Edition, Environment, InterfaceType};
pub use flow::{Endpoint, Flow, FlowCounters, L4Protocol, TcpFlagHistory, TcpFlags};
pub use host::{Host, HostCounters};
pub use protocol::{Breed, ProtocolCategory, ProtocolInfo, StaticTaxonomy, Taxonomy};
