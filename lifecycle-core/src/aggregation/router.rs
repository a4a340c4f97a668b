//! Execution routing to per-key trade processors

use super::processor::{ProcessorSnapshot, TradeProcessor};
use super::trade::Trade;
use crate::domain::{EngineError, Execution};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Composite aggregation key. Kept flat (one key, one map level) so a single
/// insert-if-absent covers both dimensions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub provider: String,
    pub symbol: String,
}

impl RouteKey {
    pub fn of(execution: &Execution) -> Self {
        Self {
            provider: execution.provider().to_string(),
            symbol: execution.security().symbol.clone(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.symbol)
    }
}

/// Demultiplexes executions to trade processors, creating processors lazily.
///
/// The map entry operation is the single atomic create-or-get: at most one
/// processor ever exists per key, even under concurrent first arrival. The
/// per-processor mutex serializes `on_execution` for one key while distinct
/// keys proceed in parallel.
pub struct ExecutionRouter {
    processors: DashMap<RouteKey, Arc<Mutex<TradeProcessor>>>,
}

impl ExecutionRouter {
    pub fn new() -> Self {
        Self {
            processors: DashMap::new(),
        }
    }

    /// Forward one execution to its processor; returns the closed trade when
    /// the execution completes a round trip.
    pub fn route(&self, execution: &Execution) -> Result<Option<Trade>, EngineError> {
        let key = RouteKey::of(execution);
        let processor = self
            .processors
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(key = %key, "creating trade processor");
                Arc::new(Mutex::new(TradeProcessor::new(
                    key.provider.clone(),
                    execution.security().clone(),
                )))
            })
            .clone();

        let mut processor = processor.lock();
        processor.on_execution(execution)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Known keys, as owned copies.
    pub fn keys(&self) -> Vec<RouteKey> {
        self.processors.iter().map(|e| e.key().clone()).collect()
    }

    /// Owned point-in-time view of every processor; no mutation capability
    /// leaks outward.
    pub fn snapshot(&self) -> Vec<ProcessorSnapshot> {
        self.processors
            .iter()
            .map(|e| e.value().lock().snapshot())
            .collect()
    }
}

impl Default for ExecutionRouter {
    fn default() -> Self {
        Self::new()
    }
}
