/// Metrics from a lookup.  The resolver builds this structure as it
/// goes, and it is handed back to the caller at the end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    /// Questions answered from the answer cache.
    pub cache_hits: u64,
    /// Questions not in the answer cache.
    pub cache_misses: u64,
    /// Queries which got a usable reply from a nameserver.
    pub nameserver_hits: u64,
    /// Queries which did not (including timeouts).
    pub nameserver_misses: u64,
    /// Queries which timed out.
    pub timeouts: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn nameserver_hit(&mut self) {
        self.nameserver_hits += 1;
    }

    pub fn nameserver_miss(&mut self) {
        self.nameserver_misses += 1;
    }

    pub fn nameserver_timeout(&mut self) {
        self.nameserver_misses += 1;
        self.timeouts += 1;
    }

    /// Add another set of counters to this one.
    pub fn merge(&mut self, other: &Metrics) {
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.nameserver_hits += other.nameserver_hits;
        self.nameserver_misses += other.nameserver_misses;
        self.timeouts += other.timeouts;
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "cache hits: {}, cache misses: {}, nameserver hits: {}, nameserver misses: {} ({} timeouts)",
            self.cache_hits,
            self.cache_misses,
            self.nameserver_hits,
            self.nameserver_misses,
            self.timeouts
        )
    }
}
