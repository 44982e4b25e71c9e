//! Host scan detection
//!
//! Two independent modes, both reported as `scan_detected`:
//!
//! - incomplete flows: `num_incomplete_flows >= num_incomplete_flows_threshold`
//! - server ports / AS scope: `num_server_ports >= num_server_ports_threshold`
//!   or `as_client >= as_client_threshold` or `as_server >= as_server_threshold`
//!
//! Every sub-condition is edge-triggered through the host's latch: it alerts
//! when it starts to hold and re-arms once it stops holding. A disabled
//! threshold (configured as 0) never holds.

use tracing::{debug, info, warn};

use super::{Check, CheckContext, CheckScope, Detection, Subscriptions};
use crate::alert::{AlertPayload, AlertRecord, AlertType, EntityRef, RiskPercentage, ScoreLevel};
use crate::config::{ScanDetectionConfig, Threshold};
use crate::error::{CheckError, Result};
use crate::types::{Host, Taxonomy};

const LATCH_INCOMPLETE_FLOWS: u8 = 0x01;
const LATCH_SERVER_PORTS: u8 = 0x02;
const LATCH_AS_CLIENT: u8 = 0x04;
const LATCH_AS_SERVER: u8 = 0x08;

/// Normalized scan thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanThresholds {
    pub num_incomplete_flows: Threshold,
    pub num_server_ports: Threshold,
    pub as_client: Threshold,
    pub as_server: Threshold,
}

impl ScanThresholds {
    /// Thresholds must fit the width of the counters they are compared to
    /// and of the payload fields that report them.
    pub fn validate(&self) -> Result<()> {
        if self.num_server_ports.value() > u64::from(u16::MAX) {
            return Err(CheckError::ConfigError(format!(
                "num_server_ports_threshold {} exceeds the port range",
                self.num_server_ports
            )));
        }
        for (name, threshold) in [("as_client_threshold", self.as_client), ("as_server_threshold", self.as_server)] {
            if threshold.value() > u64::from(u32::MAX) {
                return Err(CheckError::ConfigError(format!("{} {} exceeds u32", name, threshold)));
            }
        }
        Ok(())
    }

    /// At least one sub-condition can fire
    pub fn any_enabled(&self) -> bool {
        self.num_incomplete_flows.is_enabled()
            || self.num_server_ports.is_enabled()
            || self.as_client.is_enabled()
            || self.as_server.is_enabled()
    }
}

pub struct ScanDetection {
    thresholds: ScanThresholds,
    risk: RiskPercentage,
}

impl ScanDetection {
    pub const NAME: &'static str = "scan_detection";

    pub fn new(thresholds: ScanThresholds, risk: RiskPercentage) -> Result<Self> {
        thresholds.validate()?;

        info!(
            "Initializing scan detection (incomplete_flows={}, server_ports={}, as_client={}, as_server={}, cli_risk={}%)",
            thresholds.num_incomplete_flows,
            thresholds.num_server_ports,
            thresholds.as_client,
            thresholds.as_server,
            risk.value(),
        );

        Ok(Self { thresholds, risk })
    }

    pub fn from_config(config: &ScanDetectionConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.thresholds(), RiskPercentage::new(config.client_risk_pct)?)
    }

    pub fn thresholds(&self) -> &ScanThresholds {
        &self.thresholds
    }
}

impl Check<Host> for ScanDetection {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn alert_type(&self) -> AlertType {
        AlertType::SCAN_DETECTED
    }

    fn scope(&self) -> CheckScope {
        CheckScope::community()
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::periodic_and_end()
    }

    fn on_event(&self, host: &Host, ctx: &mut CheckContext<'_>) -> Option<Detection> {
        let counters = host.counters;
        let th = &self.thresholds;

        // Hosts without an AS (or without a store) have no AS-scoped counters
        let as_client = ctx.as_counts.map(|c| c.as_client);
        let as_server = ctx.as_counts.map(|c| c.as_server);

        let incomplete = th.num_incomplete_flows.is_crossed(counters.num_incomplete_flows);
        let scope_conditions = [
            (LATCH_SERVER_PORTS, th.num_server_ports.is_crossed(u64::from(counters.num_server_ports))),
            (LATCH_AS_CLIENT, as_client.map_or(false, |v| th.as_client.is_crossed(u64::from(v)))),
            (LATCH_AS_SERVER, as_server.map_or(false, |v| th.as_server.is_crossed(u64::from(v)))),
        ];

        if ctx.latch.rising(LATCH_INCOMPLETE_FLOWS, incomplete) {
            // Re-arm conditions that stopped holding; new crossings stay
            // pending for the next evaluation
            for (bit, holds) in scope_conditions {
                if !holds {
                    ctx.latch.clear(bit);
                }
            }
            debug!(
                "{} on {}: {} incomplete flows (threshold {})",
                ctx.event, host.ip, counters.num_incomplete_flows, th.num_incomplete_flows
            );
            return Some(Detection::IncompleteFlows {
                num_incomplete_flows: counters.num_incomplete_flows,
                threshold: th.num_incomplete_flows.value(),
            });
        }

        let mut rising = false;
        for (bit, holds) in scope_conditions {
            rising |= ctx.latch.rising(bit, holds);
        }

        if rising {
            debug!(
                "{} on {}: server ports {} / as_client {:?} / as_server {:?} crossed",
                ctx.event, host.ip, counters.num_server_ports, as_client, as_server
            );
            return Some(Detection::ServerPorts {
                num_server_ports: counters.num_server_ports,
                as_client: as_client.unwrap_or(0),
                as_server: as_server.unwrap_or(0),
                as_client_threshold: th.as_client.value_u32(),
                as_server_threshold: th.as_server.value_u32(),
                is_rx_only: counters.is_rx_only,
            });
        }

        None
    }

    fn build_alert(&self, host: &Host, detection: Detection, _taxonomy: &dyn Taxonomy) -> Option<AlertRecord> {
        let payload = match detection {
            Detection::IncompleteFlows { num_incomplete_flows, threshold } => AlertPayload::IncompleteFlows {
                num_incomplete_flows,
                num_incomplete_flows_threshold: threshold,
            },
            Detection::ServerPorts {
                num_server_ports,
                as_client,
                as_server,
                as_client_threshold,
                as_server_threshold,
                is_rx_only,
            } => AlertPayload::ServerPorts {
                num_server_ports,
                as_client,
                as_server,
                as_client_threshold,
                as_server_threshold,
                is_rx_only,
            },
            other => {
                warn!("{}: unexpected detection {:?}", Self::NAME, other);
                return None;
            }
        };

        Some(
            AlertRecord::builder(Self::NAME, self.alert_type(), EntityRef::from(host))
                .score(ScoreLevel::Error)
                .risk(self.risk)
                .payload(payload)
                .build(),
        )
    }
}
