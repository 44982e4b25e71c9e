//! TCP flows torn down by RST before a complete exchange
//!
//! Evaluated once, at flow end. A reset is premature when the flow never
//! completed the three-way handshake, or completed it without payload
//! flowing in both directions.

use tracing::warn;

use super::{Check, CheckContext, CheckScope, Detection, LifecycleEvent, Subscriptions};
use crate::alert::{AlertPayload, AlertRecord, AlertType, EntityRef, RiskPercentage, ScoreLevel};
use crate::types::{Edition, Flow, Taxonomy};

pub struct TcpFlowReset;

impl TcpFlowReset {
    pub const NAME: &'static str = "tcp_flow_reset";

    pub fn new() -> Self {
        Self
    }

    fn is_premature_reset(flow: &Flow) -> bool {
        if !flow.is_tcp() || !flow.tcp.is_reset() {
            return false;
        }
        !flow.tcp.handshake_completed || !flow.counters.is_bidirectional_exchange()
    }
}

impl Default for TcpFlowReset {
    fn default() -> Self {
        Self::new()
    }
}

impl Check<Flow> for TcpFlowReset {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn alert_type(&self) -> AlertType {
        AlertType::TCP_FLOW_RESET
    }

    fn scope(&self) -> CheckScope {
        CheckScope {
            min_edition: Edition::Community,
            packet_interfaces_only: true,
            exclude_for_edge: true,
            only_for_edge: false,
        }
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::end_only()
    }

    fn on_event(&self, flow: &Flow, ctx: &mut CheckContext<'_>) -> Option<Detection> {
        // Flag history is only final once the flow has ended
        if ctx.event != LifecycleEvent::End {
            return None;
        }
        if Self::is_premature_reset(flow) {
            Some(Detection::PrematureReset)
        } else {
            None
        }
    }

    fn build_alert(&self, flow: &Flow, detection: Detection, _taxonomy: &dyn Taxonomy) -> Option<AlertRecord> {
        if detection != Detection::PrematureReset {
            warn!("{}: unexpected detection {:?}", Self::NAME, detection);
            return None;
        }

        Some(
            AlertRecord::builder(Self::NAME, self.alert_type(), EntityRef::from(flow))
                .score(ScoreLevel::Notice)
                .risk(RiskPercentage::CLIENT_FAIR)
                .payload(AlertPayload::Empty)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckLatch;
    use crate::types::{Endpoint, L4Protocol, StaticTaxonomy, TcpFlags};
    use std::net::{IpAddr, Ipv4Addr};

    fn tcp_flow() -> Flow {
        Flow::new(
            1,
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 50000).local(),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), 443),
            L4Protocol::Tcp,
        )
    }

    fn handshake(flow: &mut Flow) {
        flow.tcp.record_client(TcpFlags::from_u8(0x02));
        flow.tcp.record_server(TcpFlags::from_u8(0x12));
        flow.tcp.record_client(TcpFlags::from_u8(0x10));
    }

    fn evaluate(flow: &Flow) -> Option<Detection> {
        evaluate_at(LifecycleEvent::End, flow)
    }

    fn evaluate_at(event: LifecycleEvent, flow: &Flow) -> Option<Detection> {
        let mut latch = CheckLatch::default();
        let mut ctx = CheckContext {
            event,
            latch: &mut latch,
            as_counts: None,
        };
        TcpFlowReset.on_event(flow, &mut ctx)
    }

    #[test]
    fn test_reset_before_handshake() {
        let mut flow = tcp_flow();
        flow.tcp.record_client(TcpFlags::from_u8(0x02));
        flow.tcp.record_server(TcpFlags::from_u8(0x14)); // RST-ACK
        assert_eq!(evaluate(&flow), Some(Detection::PrematureReset));
    }

    #[test]
    fn test_reset_only_judged_at_end() {
        let mut flow = tcp_flow();
        flow.tcp.record_client(TcpFlags::from_u8(0x02));
        flow.tcp.record_server(TcpFlags::from_u8(0x14));
        assert_eq!(evaluate_at(LifecycleEvent::ProtocolDetected, &flow), None);
        assert_eq!(evaluate_at(LifecycleEvent::PeriodicUpdate, &flow), None);
        assert_eq!(evaluate_at(LifecycleEvent::End, &flow), Some(Detection::PrematureReset));
    }

    #[test]
    fn test_reset_after_handshake_without_data() {
        let mut flow = tcp_flow();
        handshake(&mut flow);
        flow.counters.cli2srv_payload_bytes = 120;
        flow.tcp.record_client(TcpFlags::from_u8(0x04));
        assert_eq!(evaluate(&flow), Some(Detection::PrematureReset));
    }

    #[test]
    fn test_reset_after_full_exchange_is_normal() {
        let mut flow = tcp_flow();
        handshake(&mut flow);
        flow.counters.cli2srv_payload_bytes = 120;
        flow.counters.srv2cli_payload_bytes = 4096;
        flow.tcp.record_client(TcpFlags::from_u8(0x04));
        assert_eq!(evaluate(&flow), None);
    }

    #[test]
    fn test_no_reset_no_detection() {
        let mut flow = tcp_flow();
        flow.tcp.record_client(TcpFlags::from_u8(0x02));
        assert_eq!(evaluate(&flow), None);
    }

    #[test]
    fn test_non_tcp_never_detects() {
        let mut flow = tcp_flow();
        flow.l4_proto = L4Protocol::Udp;
        flow.tcp.record_client(TcpFlags::from_u8(0x04));
        assert_eq!(evaluate(&flow), None);
    }

    #[test]
    fn test_alert_has_empty_payload() {
        let flow = tcp_flow();
        let alert = TcpFlowReset
            .build_alert(&flow, Detection::PrematureReset, &StaticTaxonomy::new())
            .unwrap();
        assert_eq!(alert.alert_type(), AlertType::TCP_FLOW_RESET);
        assert_eq!(alert.score(), ScoreLevel::Notice);
        assert_eq!(alert.cli_score() + alert.srv_score(), ScoreLevel::Notice.value());
        assert!(alert.payload().to_document().is_empty());
        assert!(matches!(alert.entity(), EntityRef::Flow { srv_port: 443, .. }));
    }

    #[test]
    fn test_foreign_detection_rejected() {
        let flow = tcp_flow();
        let detection = Detection::IncompleteFlows { num_incomplete_flows: 1, threshold: 1 };
        assert!(TcpFlowReset.build_alert(&flow, detection, &StaticTaxonomy::new()).is_none());
    }

    #[test]
    fn test_subscribed_to_end_only() {
        assert!(TcpFlowReset.wants_event(LifecycleEvent::End));
        assert!(!TcpFlowReset.wants_event(LifecycleEvent::ProtocolDetected));
        assert!(!TcpFlowReset.wants_event(LifecycleEvent::PeriodicUpdate));
    }
}
