use std::collections::HashSet;

use crate::cache::QueryKey;
use crate::metrics::Metrics;

/// Per-lookup state: the questions currently being resolved for a
/// nameserver address, and the metrics.
///
/// The caches live in the `Resolver`, shared by every lookup.  This
/// does not.
#[derive(Debug, Default)]
pub struct Context {
    resolving: HashSet<QueryKey>,
    metrics: Metrics,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    pub fn done(self) -> Metrics {
        self.metrics
    }

    pub fn is_resolving(&self, key: &QueryKey) -> bool {
        self.resolving.contains(key)
    }

    /// Returns `false` if the key was already being resolved.
    pub fn start_resolving(&mut self, key: QueryKey) -> bool {
        self.resolving.insert(key)
    }

    pub fn stop_resolving(&mut self, key: &QueryKey) {
        self.resolving.remove(key);
    }

    /// True when no nameserver resolution is in flight.
    pub fn is_idle(&self) -> bool {
        self.resolving.is_empty()
    }
}
