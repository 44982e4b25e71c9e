//! Remote client reaching a local server over an insecure protocol

use tracing::warn;

use super::{Check, CheckContext, CheckScope, Detection, Subscriptions};
use crate::alert::{AlertPayload, AlertRecord, AlertType, EntityRef, RiskPercentage, ScoreLevel};
use crate::types::{Flow, Taxonomy};

pub struct RemoteToLocalInsecureProto;

impl RemoteToLocalInsecureProto {
    pub const NAME: &'static str = "remote_to_local_insecure_proto";

    pub fn new() -> Self {
        Self
    }
}

impl Default for RemoteToLocalInsecureProto {
    fn default() -> Self {
        Self::new()
    }
}

impl Check<Flow> for RemoteToLocalInsecureProto {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn alert_type(&self) -> AlertType {
        AlertType::REMOTE_TO_LOCAL_INSECURE_PROTO
    }

    fn scope(&self) -> CheckScope {
        CheckScope::community()
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions::protocol_detected_only()
    }

    fn on_event(&self, flow: &Flow, _ctx: &mut CheckContext<'_>) -> Option<Detection> {
        // Unclassified flows are skipped, not guessed
        let protocol = flow.protocol?;
        if !flow.is_remote_to_local() || !protocol.breed.is_insecure() {
            return None;
        }
        Some(Detection::InsecureProtocol {
            breed: protocol.breed,
            category: protocol.category,
        })
    }

    fn build_alert(&self, flow: &Flow, detection: Detection, taxonomy: &dyn Taxonomy) -> Option<AlertRecord> {
        let Detection::InsecureProtocol { breed, category } = detection else {
            warn!("{}: unexpected detection {:?}", Self::NAME, detection);
            return None;
        };

        let payload = AlertPayload::ProtocolBreed {
            breed: breed.code(),
            breed_name: taxonomy.breed_name(breed).unwrap_or_default(),
            category: category.code(),
            category_name: taxonomy.category_name(category).unwrap_or_default(),
        };

        Some(
            AlertRecord::builder(Self::NAME, self.alert_type(), EntityRef::from(flow))
                .score(ScoreLevel::Warning)
                .risk(RiskPercentage::CLIENT_HIGH)
                .payload(payload)
                .build(),
        )
    }
}
