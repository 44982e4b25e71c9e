//! Behavioral checks over tracked flows and hosts
//!
//! The traffic tracker drives a [`Dispatcher`] with lifecycle events
//! (protocol detected, periodic update, end). The dispatcher runs every
//! applicable check subscribed to the event, in registration order, and
//! hands each resulting [`AlertRecord`] to an [`AlertSink`].
//!
//! ```text
//! tracker ──event──▶ Dispatcher ──▶ Check::on_event ──Detection──▶ Check::build_alert
//!                        │                                               │
//!                  CheckScratch (per entity)                      AlertRecord ──▶ AlertSink
//! ```
//!
//! Built-in checks:
//!
//! - `tcp_flow_reset` - TCP flows reset before a complete exchange
//! - `remote_to_local_insecure_proto` - inbound flows using insecure protocols
//! - `scan_detection` - hosts with too many incomplete flows, server ports or AS-scoped flows

pub mod aggregate;
pub mod alert;
pub mod checks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod types;

pub use aggregate::{AsCounterStore, AsFlowCounts};
pub use alert::{
    AlertCategory, AlertKind, AlertPayload, AlertRecord, AlertSink, AlertType, ChannelSink, EntityRef, MemorySink,
    RiskPercentage, ScoreLevel,
};
pub use checks::{Check, CheckScope, CheckScratch, Detection, LifecycleEvent, Subscriptions};
pub use config::{ChecksConfig, ScanDetectionConfig, Threshold};
pub use dispatch::{CheckRegistry, Dispatcher};
pub use error::{CheckError, Result};
pub use types::{Environment, Flow, Host};
