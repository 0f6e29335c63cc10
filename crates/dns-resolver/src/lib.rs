#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::wildcard_imports)]

pub mod cache;
pub mod classify;
pub mod context;
pub mod host;
pub mod lookup;
pub mod metrics;
pub mod recursive;
pub mod transport;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use self::cache::SharedCache;
use self::transport::Transport;

/// The IPv4 addresses of the root nameservers, `a` to `m`.
pub const ROOT_HINTS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(199, 9, 14, 201),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

/// How long to wait for a single nameserver to reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum number of CNAMEs followed for one lookup.  A chain longer
/// than this (or a cycle) gives back whatever has been accumulated so
/// far.
pub const CNAME_LIMIT: usize = 10;

/// When a referral comes without glue, nameserver names are resolved
/// until this many addresses have been collected.
pub const GLUELESS_ADDRESS_LIMIT: usize = 3;

/// Maximum recursion depth.  Every referral followed and every
/// nameserver name resolved uses up one level.
///
/// This is to protect against a misconfigured (or malicious) zone
/// which refers back to itself forever.
pub const RECURSION_LIMIT: usize = 32;

/// Tunables for a `Resolver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Where resolution starts when nothing better is cached.  Only
    /// IPv4 addresses are ever queried.
    pub root_hints: Vec<IpAddr>,
    pub timeout: Duration,
    pub cname_limit: usize,
    pub glueless_address_limit: usize,
    pub recursion_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root_hints: ROOT_HINTS.iter().copied().map(IpAddr::V4).collect(),
            timeout: DEFAULT_TIMEOUT,
            cname_limit: CNAME_LIMIT,
            glueless_address_limit: GLUELESS_ADDRESS_LIMIT,
            recursion_limit: RECURSION_LIMIT,
        }
    }
}

/// An iterative resolver: walks the delegation tree down from the
/// root hints, remembering answers and delegations as it goes.
///
/// The caches are shared by every lookup made through this value (and
/// by any other resolver given the same `SharedCache`), so it is
/// typically constructed once and reused.
pub struct Resolver {
    config: ResolverConfig,
    cache: SharedCache,
    transport: Arc<dyn Transport>,
}

impl Resolver {
    pub fn new(transport: Arc<dyn Transport>, config: ResolverConfig) -> Self {
        Self::with_cache(transport, config, SharedCache::new())
    }

    pub fn with_cache(
        transport: Arc<dyn Transport>,
        config: ResolverConfig,
        cache: SharedCache,
    ) -> Self {
        Self {
            config,
            cache,
            transport,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }
}
