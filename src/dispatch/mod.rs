//! Check registry and lifecycle dispatcher
//!
//! Checks are registered in a fixed order. Building a [`Dispatcher`] drops
//! every check that is not applicable to the runtime [`Environment`] and
//! indexes the rest by lifecycle event, so per-event dispatch only walks
//! the checks that subscribed to it, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::aggregate::AsCounterStore;
use crate::alert::{AlertKind, AlertSink};
use crate::checks::{
    Check, CheckContext, CheckScratch, Entity, LifecycleEvent, RemoteToLocalInsecureProto, ScanDetection,
    TcpFlowReset,
};
use crate::config::ChecksConfig;
use crate::error::{CheckError, Result};
use crate::types::{Environment, Flow, Host, Taxonomy};

/// Registry of checks for one entity kind
pub struct CheckRegistry<E: Entity> {
    checks: Vec<Box<dyn Check<E>>>,
}

impl<E: Entity> CheckRegistry<E> {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Register a check after the ones already present
    pub fn register(&mut self, check: Box<dyn Check<E>>) -> Result<()> {
        let name = check.name();
        if self.get_by_name(name).is_some() {
            return Err(CheckError::DuplicateCheck(name.to_string()));
        }
        check.scope().validate(name)?;
        self.checks.push(check);
        Ok(())
    }

    /// Get check by name
    pub fn get_by_name(&self, name: &str) -> Option<&dyn Check<E>> {
        self.checks.iter().find(|c| c.name() == name).map(|c| c.as_ref())
    }

    /// Get checks producing a given alert kind
    pub fn get_by_kind(&self, kind: AlertKind) -> Vec<&dyn Check<E>> {
        self.checks
            .iter()
            .filter(|c| c.alert_type().kind == kind)
            .map(|c| c.as_ref())
            .collect()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Resolve applicability against `env` and index checks by event
    pub fn build(self, env: Environment, taxonomy: Arc<dyn Taxonomy>) -> Dispatcher<E> {
        let mut checks = Vec::with_capacity(self.checks.len());
        for check in self.checks {
            if check.is_applicable(&env) {
                checks.push(check);
            } else {
                info!("Check {} not applicable to {}, skipping", check.name(), env);
            }
        }

        let mut by_event: [Vec<usize>; 3] = Default::default();
        for (idx, check) in checks.iter().enumerate() {
            for event in LifecycleEvent::ALL {
                if check.wants_event(event) {
                    by_event[event.index()].push(idx);
                }
            }
            if check.subscriptions().is_empty() {
                warn!("Check {} subscribes to no lifecycle event", check.name());
            }
        }

        info!(
            "Dispatcher ready for {} with {} checks ({} protocol_detected, {} periodic_update, {} end)",
            env,
            checks.len(),
            by_event[0].len(),
            by_event[1].len(),
            by_event[2].len(),
        );

        Dispatcher {
            checks,
            by_event,
            env,
            taxonomy,
            as_counters: None,
            stats: DispatchStats::default(),
        }
    }
}

impl<E: Entity> Default for CheckRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckRegistry<Flow> {
    /// Built-in flow checks enabled in `config`
    pub fn with_builtins(config: &ChecksConfig) -> Result<Self> {
        let mut registry = Self::new();
        if config.remote_to_local_insecure_proto.enabled {
            registry.register(Box::new(RemoteToLocalInsecureProto::new()))?;
        }
        if config.tcp_flow_reset.enabled {
            registry.register(Box::new(TcpFlowReset::new()))?;
        }
        Ok(registry)
    }
}

impl CheckRegistry<Host> {
    /// Built-in host checks enabled in `config`
    pub fn with_builtins(config: &ChecksConfig) -> Result<Self> {
        let mut registry = Self::new();
        if config.scan_detection.enabled {
            if !config.scan_detection.has_enabled_threshold() {
                warn!("Scan detection enabled with every threshold disabled; it will never alert");
            }
            registry.register(Box::new(ScanDetection::from_config(&config.scan_detection)?))?;
        }
        Ok(registry)
    }
}

/// Dispatch counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    invocations: AtomicU64,
    detections: AtomicU64,
    alerts_emitted: AtomicU64,
    alerts_dropped: AtomicU64,
    events_ignored: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    /// `on_event` calls
    pub invocations: u64,
    /// Calls that returned a detection
    pub detections: u64,
    /// Alerts handed to the sink
    pub alerts_emitted: u64,
    /// Detections a check refused to build
    pub alerts_dropped: u64,
    /// Events received after the entity ended
    pub events_ignored: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
        }
    }
}

/// Applicable checks for one entity kind, indexed by event
pub struct Dispatcher<E: Entity> {
    checks: Vec<Box<dyn Check<E>>>,
    by_event: [Vec<usize>; 3],
    env: Environment,
    taxonomy: Arc<dyn Taxonomy>,
    as_counters: Option<Arc<AsCounterStore>>,
    stats: DispatchStats,
}

impl<E: Entity> Dispatcher<E> {
    /// Attach the AS counter store read by AS-scoped conditions
    pub fn with_as_counters(mut self, store: Arc<AsCounterStore>) -> Self {
        self.as_counters = Some(store);
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Names of applicable checks in registration order
    pub fn active_checks(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Names of checks invoked for `event`, in invocation order
    pub fn checks_for(&self, event: LifecycleEvent) -> Vec<&'static str> {
        self.by_event[event.index()]
            .iter()
            .map(|&idx| self.checks[idx].name())
            .collect()
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn on_protocol_detected(&self, entity: &E, scratch: &mut CheckScratch, sink: &dyn AlertSink) -> usize {
        self.dispatch(entity, scratch, LifecycleEvent::ProtocolDetected, sink)
    }

    pub fn on_periodic_update(&self, entity: &E, scratch: &mut CheckScratch, sink: &dyn AlertSink) -> usize {
        self.dispatch(entity, scratch, LifecycleEvent::PeriodicUpdate, sink)
    }

    pub fn on_end(&self, entity: &E, scratch: &mut CheckScratch, sink: &dyn AlertSink) -> usize {
        self.dispatch(entity, scratch, LifecycleEvent::End, sink)
    }

    /// Run every subscribed check for `event` and emit the resulting alerts
    ///
    /// Returns the number of alerts emitted. Events arriving after the
    /// entity's `End` are ignored.
    pub fn dispatch(
        &self,
        entity: &E,
        scratch: &mut CheckScratch,
        event: LifecycleEvent,
        sink: &dyn AlertSink,
    ) -> usize {
        if scratch.has_ended() {
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            debug!("Ignoring {} for ended {:?}", event, entity.entity_ref());
            return 0;
        }
        if event == LifecycleEvent::End {
            scratch.mark_ended();
        }

        let as_counts = match (&self.as_counters, entity.as_scope()) {
            (Some(store), Some(asn)) => Some(store.snapshot(asn)),
            _ => None,
        };

        let mut emitted = 0;
        for &idx in &self.by_event[event.index()] {
            let check = &self.checks[idx];
            self.stats.invocations.fetch_add(1, Ordering::Relaxed);

            let mut ctx = CheckContext {
                event,
                latch: scratch.latch_mut(check.name()),
                as_counts,
            };
            let Some(detection) = check.on_event(entity, &mut ctx) else {
                continue;
            };
            self.stats.detections.fetch_add(1, Ordering::Relaxed);

            match check.build_alert(entity, detection, self.taxonomy.as_ref()) {
                Some(alert) => {
                    debug!("{} raised {} on {}", check.name(), alert.kind(), event);
                    sink.emit(alert);
                    self.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
                    emitted += 1;
                }
                None => {
                    self.stats.alerts_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        emitted
    }
}

impl Dispatcher<Flow> {
    /// Flow dispatcher with the built-in checks
    pub fn flows(config: &ChecksConfig) -> Result<Self> {
        let taxonomy = Arc::new(config.taxonomy()?);
        Ok(CheckRegistry::<Flow>::with_builtins(config)?.build(config.environment, taxonomy))
    }
}

impl Dispatcher<Host> {
    /// Host dispatcher with the built-in checks, reading AS counters from `store`
    pub fn hosts(config: &ChecksConfig, store: Arc<AsCounterStore>) -> Result<Self> {
        let taxonomy = Arc::new(config.taxonomy()?);
        Ok(CheckRegistry::<Host>::with_builtins(config)?
            .build(config.environment, taxonomy)
            .with_as_counters(store))
    }
}
