//! Alert sinks
//!
//! The sink is the hand-off point to the storage/notification layer.
//! `emit` must never block the dispatch path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use super::{AlertKind, AlertRecord, ScoreLevel};

/// Receiver of built alerts; takes ownership of each record
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: AlertRecord);
}

/// Enqueues alerts on a bounded channel
///
/// `emit` never waits for the consumer: when the channel is full or the
/// receiver is gone the alert is dropped and counted.
pub struct ChannelSink {
    tx: mpsc::Sender<AlertRecord>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlertRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub fn with_default_capacity() -> (Self, mpsc::Receiver<AlertRecord>) {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    /// Alerts dropped because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for ChannelSink {
    fn emit(&self, alert: AlertRecord) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Alert channel full, dropping {} alert", alert.kind());
            }
            Err(TrySendError::Closed(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Alert receiver closed, dropping {} alert", alert.kind());
            }
        }
    }
}

/// Keeps every alert in emission order
///
/// Also maintains per-kind and per-score-level counters.
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkInner>,
}

#[derive(Default)]
struct MemorySinkInner {
    alerts: Vec<AlertRecord>,
    by_kind: HashMap<AlertKind, u64>,
    by_score: HashMap<ScoreLevel, u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().alerts.is_empty()
    }

    /// Copy of all alerts received so far
    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.inner.lock().alerts.clone()
    }

    /// Remove and return all alerts; counters are kept
    pub fn drain(&self) -> Vec<AlertRecord> {
        std::mem::take(&mut self.inner.lock().alerts)
    }

    pub fn kinds(&self) -> Vec<AlertKind> {
        self.inner.lock().alerts.iter().map(|a| a.kind()).collect()
    }

    /// Alert counts per kind
    pub fn kind_counters(&self) -> HashMap<AlertKind, u64> {
        self.inner.lock().by_kind.clone()
    }

    /// Alert counts per score level
    pub fn score_counters(&self) -> HashMap<ScoreLevel, u64> {
        self.inner.lock().by_score.clone()
    }
}

impl AlertSink for MemorySink {
    fn emit(&self, alert: AlertRecord) {
        let mut inner = self.inner.lock();
        *inner.by_kind.entry(alert.kind()).or_insert(0) += 1;
        *inner.by_score.entry(alert.score()).or_insert(0) += 1;
        inner.alerts.push(alert);
    }
}
