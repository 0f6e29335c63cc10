use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use dns_types::protocol::types::*;

/// The unit of caching and of cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub name: DomainName,
    pub rtype: RecordType,
}

impl QueryKey {
    pub fn new(name: DomainName, rtype: RecordType) -> Self {
        Self { name, rtype }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.rtype)
    }
}

/// A convenience wrapper around a `Cache` which lets it be shared
/// between threads.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.
///
/// Every method takes the lock for just the one operation, so nothing
/// holds it across an await.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    /// Get a final response.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn get_answer(&self, key: &QueryKey) -> Option<Message> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .answers
            .get(key)
            .cloned()
    }

    /// Store a final response, replacing any previous one for the same
    /// key.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn insert_answer(&self, key: QueryKey, response: Message) {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .answers
            .insert(key, response);
    }

    /// Get the nameservers for exactly this zone.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn get_delegation(&self, zone: &DomainName) -> Option<Vec<Ipv4Addr>> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .delegations
            .get(zone)
            .map(<[Ipv4Addr]>::to_vec)
    }

    /// Record the nameservers for a zone.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn insert_delegation(&self, zone: DomainName, addresses: &[Ipv4Addr]) {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .delegations
            .insert(zone, addresses);
    }

    /// Get the nameservers for the closest zone enclosing the name
    /// (which may be the name itself), and that zone.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn closest_delegation(&self, name: &DomainName) -> Option<(DomainName, Vec<Ipv4Addr>)> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .delegations
            .closest_enclosing(name)
            .map(|(zone, addresses)| (zone.clone(), addresses.to_vec()))
    }

    /// Forget everything.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn clear(&self) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).clear();
    }

    /// Number of (answers, delegations) held.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn sizes(&self) -> (usize, usize) {
        let cache = self.cache.lock().expect(MUTEX_POISON_MESSAGE);
        (cache.answers.len(), cache.delegations.len())
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Both caches together.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    pub answers: AnswerCache,
    pub delegations: DelegationCache,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.answers.clear();
        self.delegations.clear();
    }
}

/// Final responses (answers, negative responses, and dead ends), by
/// question.  Entries never expire.
#[derive(Debug, Clone, Default)]
pub struct AnswerCache {
    entries: HashMap<QueryKey, Message>,
}

impl AnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&Message> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: QueryKey, response: Message) {
        self.entries.insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Nameserver addresses learned from referrals, by zone.  Addresses
/// are kept in the order they were discovered, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct DelegationCache {
    zones: HashMap<DomainName, Vec<Ipv4Addr>>,
}

impl DelegationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, zone: &DomainName) -> Option<&[Ipv4Addr]> {
        self.zones.get(zone).map(Vec::as_slice)
    }

    /// Replace the addresses for a zone.  An empty list is ignored.
    pub fn insert(&mut self, zone: DomainName, addresses: &[Ipv4Addr]) {
        let mut deduped = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !deduped.contains(address) {
                deduped.push(*address);
            }
        }

        if !deduped.is_empty() {
            self.zones.insert(zone, deduped);
        }
    }

    /// Walk from the name up to the root, returning the first zone
    /// there are addresses for.
    pub fn closest_enclosing(&self, name: &DomainName) -> Option<(&DomainName, &[Ipv4Addr])> {
        let mut current = Some(name.clone());
        while let Some(zone) = current {
            if let Some((zone, addresses)) = self.zones.get_key_value(&zone) {
                return Some((zone, addresses.as_slice()));
            }
            current = zone.parent();
        }

        None
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn clear(&mut self) {
        self.zones.clear();
    }
}
