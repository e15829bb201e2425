//! Plot-index cache: bounded memo of per-image membership lookups.
//!
//! Entries are evicted oldest-inserted first; reading an entry does not
//! refresh it. Each key has at most one lookup in flight: the first
//! [`resolve`](PlotIndexCache::resolve) on a miss hands out a
//! [`LookupTicket`] for the caller to dispatch, and later calls report
//! [`Resolution::Pending`] until the ticket is completed.
//!
//! [`invalidate_all`](PlotIndexCache::invalidate_all) bumps a generation
//! counter so results for tickets issued before it are discarded.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::constants::PLOT_CACHE_CAPACITY;
use crate::model::{DirectoryKey, PlotMembership};

/// Cache key: one image within one directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub directory: DirectoryKey,
    pub image: String,
}

impl CacheKey {
    pub fn new(directory: DirectoryKey, image: impl Into<String>) -> Self {
        Self {
            directory,
            image: image.into(),
        }
    }
}

/// Permission to fetch one key, issued by [`PlotIndexCache::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub key: CacheKey,
    generation: u64,
}

impl LookupTicket {
    /// Cache generation the ticket was issued in.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of [`PlotIndexCache::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Cached value
    Ready(PlotMembership),
    /// A lookup for this key is already in flight
    Pending,
    /// Miss: the caller must fetch and complete this ticket
    Dispatch(LookupTicket),
}

/// Bounded insertion-order cache of plot memberships.
#[derive(Debug)]
pub struct PlotIndexCache {
    capacity: usize,
    entries: HashMap<CacheKey, PlotMembership>,
    /// Keys in insertion order, oldest first
    order: VecDeque<CacheKey>,
    in_flight: HashSet<CacheKey>,
    generation: u64,
}

impl Default for PlotIndexCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotIndexCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(PLOT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            in_flight: HashSet::new(),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached entry for `key`, without fetching.
    pub fn lookup(&self, key: &CacheKey) -> Option<&PlotMembership> {
        self.entries.get(key)
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Return the cached entry, or claim the lookup for `key`.
    pub fn resolve(&mut self, key: CacheKey) -> Resolution {
        if let Some(entry) = self.entries.get(&key) {
            return Resolution::Ready(entry.clone());
        }
        if self.in_flight.contains(&key) {
            log::trace!("Plot cache: {} already in flight", key.image);
            return Resolution::Pending;
        }
        log::debug!("Plot cache: miss for {}, dispatching", key.image);
        self.in_flight.insert(key.clone());
        Resolution::Dispatch(LookupTicket {
            key,
            generation: self.generation,
        })
    }

    /// Store the result of a dispatched lookup.
    ///
    /// Returns `false` when the ticket predates the last invalidation and the
    /// result was dropped.
    pub fn complete(&mut self, ticket: &LookupTicket, entry: PlotMembership) -> bool {
        if ticket.generation != self.generation {
            log::debug!(
                "Plot cache: dropping stale result for {} (generation {} < {})",
                ticket.key.image,
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.in_flight.remove(&ticket.key);
        self.insert(ticket.key.clone(), entry);
        true
    }

    /// Release the in-flight claim of a failed lookup so it can be retried.
    pub fn abandon(&mut self, ticket: &LookupTicket) {
        if ticket.generation == self.generation {
            self.in_flight.remove(&ticket.key);
        }
    }

    /// Insert an entry and evict the oldest ones beyond capacity.
    pub fn insert(&mut self, key: CacheKey, entry: PlotMembership) {
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            log::trace!("Plot cache: evicting {}", oldest.image);
            self.entries.remove(&oldest);
        }
    }

    /// Drop every entry and every in-flight claim.
    pub fn invalidate_all(&mut self) {
        log::debug!(
            "Plot cache: invalidating {} entries, {} in flight",
            self.entries.len(),
            self.in_flight.len()
        );
        self.entries.clear();
        self.order.clear();
        self.in_flight.clear();
        self.generation += 1;
    }
}
