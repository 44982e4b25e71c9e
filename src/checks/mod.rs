//! Behavioral checks evaluated on flow and host lifecycle events
//!
//! A check declares where it may run ([`CheckScope`]), which lifecycle
//! events it observes ([`Subscriptions`]), the detection logic
//! ([`Check::on_event`]) and how a detection becomes an alert
//! ([`Check::build_alert`]).
//!
//! Checks hold no per-entity state of their own. The only thing a check may
//! mutate is its [`CheckLatch`], a slot in the entity's [`CheckScratch`]
//! that the dispatcher hands to it and to no other check.

pub mod remote_to_local_insecure_proto;
pub mod scan_detection;
pub mod tcp_flow_reset;

pub use remote_to_local_insecure_proto::RemoteToLocalInsecureProto;
pub use scan_detection::{ScanDetection, ScanThresholds};
pub use tcp_flow_reset::TcpFlowReset;

use crate::aggregate::AsFlowCounts;
use crate::alert::{AlertRecord, AlertType, EntityRef};
use crate::error::{CheckError, Result};
use crate::types::{Breed, DeploymentMode, Edition, Environment, Flow, Host, ProtocolCategory, Taxonomy};

/// Lifecycle events a check can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Application protocol classification completed
    ProtocolDetected,
    /// Periodic housekeeping tick
    PeriodicUpdate,
    /// Flow terminated / host removed
    End,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 3] = [
        LifecycleEvent::ProtocolDetected,
        LifecycleEvent::PeriodicUpdate,
        LifecycleEvent::End,
    ];

    pub fn index(&self) -> usize {
        match self {
            LifecycleEvent::ProtocolDetected => 0,
            LifecycleEvent::PeriodicUpdate => 1,
            LifecycleEvent::End => 2,
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::ProtocolDetected => write!(f, "protocol_detected"),
            LifecycleEvent::PeriodicUpdate => write!(f, "periodic_update"),
            LifecycleEvent::End => write!(f, "end"),
        }
    }
}

/// Lifecycle events a check is invoked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscriptions {
    pub protocol_detected: bool,
    pub periodic_update: bool,
    pub end: bool,
}

impl Subscriptions {
    pub const fn end_only() -> Self {
        Self { protocol_detected: false, periodic_update: false, end: true }
    }

    pub const fn protocol_detected_only() -> Self {
        Self { protocol_detected: true, periodic_update: false, end: false }
    }

    pub const fn periodic_and_end() -> Self {
        Self { protocol_detected: false, periodic_update: true, end: true }
    }

    pub fn contains(&self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::ProtocolDetected => self.protocol_detected,
            LifecycleEvent::PeriodicUpdate => self.periodic_update,
            LifecycleEvent::End => self.end,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.protocol_detected || self.periodic_update || self.end)
    }
}

/// Where a check may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckScope {
    /// Lowest edition the check ships with
    pub min_edition: Edition,
    /// Needs live packets (TCP flag visibility)
    pub packet_interfaces_only: bool,
    /// Never runs in edge mode
    pub exclude_for_edge: bool,
    /// Runs in edge mode only
    pub only_for_edge: bool,
}

impl CheckScope {
    pub const fn community() -> Self {
        Self {
            min_edition: Edition::Community,
            packet_interfaces_only: false,
            exclude_for_edge: false,
            only_for_edge: false,
        }
    }

    /// Reject flag combinations no environment could satisfy
    pub fn validate(&self, check: &str) -> Result<()> {
        if self.exclude_for_edge && self.only_for_edge {
            return Err(CheckError::InvalidScope {
                check: check.to_string(),
                reason: "both excluded from and exclusive to edge mode".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_applicable(&self, env: &Environment) -> bool {
        if env.edition < self.min_edition {
            return false;
        }
        if self.packet_interfaces_only && !env.interface.is_packet_interface() {
            return false;
        }
        let edge = env.mode == DeploymentMode::Edge;
        if self.exclude_for_edge && edge {
            return false;
        }
        if self.only_for_edge && !edge {
            return false;
        }
        true
    }
}

/// What a check saw when its condition held
///
/// Carries codes and counter values only; names are resolved when the
/// alert is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// TCP flow torn down by RST before a full exchange
    PrematureReset,
    /// Remote client reached a local server over an insecure protocol
    InsecureProtocol {
        breed: Breed,
        category: ProtocolCategory,
    },
    /// Host crossed the incomplete-flow threshold
    IncompleteFlows {
        num_incomplete_flows: u64,
        threshold: u64,
    },
    /// Host crossed a server-port or AS-scoped threshold
    ServerPorts {
        num_server_ports: u16,
        as_client: u32,
        as_server: u32,
        as_client_threshold: u32,
        as_server_threshold: u32,
        is_rx_only: bool,
    },
}

/// Per-check, per-entity bitset of conditions that already alerted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckLatch(u8);

impl CheckLatch {
    pub fn is_set(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn clear(&mut self, bit: u8) {
        self.0 &= !bit;
    }

    /// Edge detector: true only when `holds` goes from false to true.
    /// A condition that stops holding re-arms.
    pub fn rising(&mut self, bit: u8, holds: bool) -> bool {
        if !holds {
            self.clear(bit);
            return false;
        }
        if self.is_set(bit) {
            return false;
        }
        self.set(bit);
        true
    }
}

/// Check-private state attached to one entity
///
/// Owned next to the entity by the traffic tracker and passed mutably to
/// each dispatch, which serializes dispatches per entity.
#[derive(Debug, Clone, Default)]
pub struct CheckScratch {
    latches: Vec<(&'static str, CheckLatch)>,
    ended: bool,
}

impl CheckScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch slot of one check, created on first use
    pub fn latch_mut(&mut self, check: &'static str) -> &mut CheckLatch {
        let pos = match self.latches.iter().position(|(name, _)| *name == check) {
            Some(pos) => pos,
            None => {
                self.latches.push((check, CheckLatch::default()));
                self.latches.len() - 1
            }
        };
        &mut self.latches[pos].1
    }

    pub fn latch(&self, check: &str) -> CheckLatch {
        self.latches
            .iter()
            .find(|(name, _)| *name == check)
            .map(|(_, latch)| *latch)
            .unwrap_or_default()
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn mark_ended(&mut self) {
        self.ended = true;
    }
}

/// Per-invocation context handed to [`Check::on_event`]
pub struct CheckContext<'a> {
    pub event: LifecycleEvent,
    /// This check's latch for this entity
    pub latch: &'a mut CheckLatch,
    /// Snapshot of the entity's AS counters, if the entity has an AS and
    /// the dispatcher has a store
    pub as_counts: Option<AsFlowCounts>,
}

/// Entities checks can run on
pub trait Entity: Send + Sync {
    /// Autonomous system the entity's shared counters are scoped to
    fn as_scope(&self) -> Option<u32> {
        None
    }

    fn entity_ref(&self) -> EntityRef;
}

impl Entity for Flow {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::from(self)
    }
}

impl Entity for Host {
    fn as_scope(&self) -> Option<u32> {
        self.asn
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef::from(self)
    }
}

/// A detection rule over one entity kind
pub trait Check<E: Entity>: Send + Sync {
    /// Unique check name
    fn name(&self) -> &'static str;

    /// Alert type this check produces
    fn alert_type(&self) -> AlertType;

    fn scope(&self) -> CheckScope;

    fn subscriptions(&self) -> Subscriptions;

    fn is_applicable(&self, env: &Environment) -> bool {
        self.scope().is_applicable(env)
    }

    fn wants_event(&self, event: LifecycleEvent) -> bool {
        self.subscriptions().contains(event)
    }

    /// Evaluate the entity. Returns a detection only when the condition
    /// newly holds.
    fn on_event(&self, entity: &E, ctx: &mut CheckContext<'_>) -> Option<Detection>;

    /// Turn a detection into an alert. Reads only identifiers from the
    /// entity. Returns `None` for detections this check does not produce.
    fn build_alert(&self, entity: &E, detection: Detection, taxonomy: &dyn Taxonomy) -> Option<AlertRecord>;
}

pub type FlowCheck = dyn Check<Flow>;
pub type HostCheck = dyn Check<Host>;
