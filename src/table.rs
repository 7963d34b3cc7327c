//! The name table: domain keys to IPv4 addresses.
//!
//! Lookups follow two steps:
//!
//! ```text
//! data.ona.im.
//!   → exact key `data.ona.im.`
//!   → wildcard key `.ona.im.` (leftmost label dropped once)
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::address::{AddressResolver, AddressSpec};
use crate::domain::{join_zone, DomainKey};
use crate::error::DnsError;

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Written by configuration or [`NameTable::put`].
    Explicit,
    /// Wildcard companion added automatically.
    Derived,
}

/// A single name table value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Address returned for matching queries.
    pub address: Ipv4Addr,
    /// Origin of the entry.
    pub source: EntrySource,
}

/// Mapping from [`DomainKey`] to address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    entries: BTreeMap<DomainKey, Entry>,
}

impl NameTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `domain` and insert or overwrite it.
    pub fn put(&mut self, domain: &str, address: Ipv4Addr) -> Result<DomainKey, DnsError> {
        let key = DomainKey::parse(domain)?;
        self.insert(key.clone(), address, EntrySource::Explicit);
        Ok(key)
    }

    /// Insert an exact entry for `base` and its wildcard companion.
    ///
    /// The companion does not replace an explicit wildcard for the same base.
    pub fn put_host(&mut self, base: &str, address: Ipv4Addr) -> Result<DomainKey, DnsError> {
        let key = DomainKey::exact(base)?;
        self.insert(key.clone(), address, EntrySource::Explicit);
        self.insert(key.to_wildcard(), address, EntrySource::Derived);
        Ok(key)
    }

    /// Insert `hostname` under `zone`, resolving `spec` first.
    ///
    /// A hostname with an internal dot ignores the zone. A hostname written as
    /// `.name` or `*.name` only sets the explicit wildcard for that base.
    /// Unavailable interface addresses fall back to the default container
    /// address; invalid literals are returned as errors.
    pub async fn put_with_zone(
        &mut self,
        resolver: &AddressResolver,
        hostname: &str,
        zone: &str,
        spec: &AddressSpec,
    ) -> Result<DomainKey, DnsError> {
        let wildcard_only = {
            let trimmed = hostname.trim();
            trimmed.starts_with('.') || trimmed.starts_with("*.")
        };
        let base = join_zone(hostname, zone);
        // Validate the name before spending time on resolution.
        let key = DomainKey::exact(&base)?;
        let address = resolver.resolve_or_default(spec).await?;

        debug!(host = %hostname, key = %key, %address, wildcard_only, "adding host");

        if wildcard_only {
            let wildcard = key.to_wildcard();
            self.insert(wildcard.clone(), address, EntrySource::Explicit);
            Ok(wildcard)
        } else {
            self.put_host(&base, address)
        }
    }

    /// Add a wildcard companion for every exact key that lacks one.
    ///
    /// Idempotent. Returns how many wildcards were added.
    pub fn complete_wildcards(&mut self) -> usize {
        let missing: Vec<(DomainKey, Ipv4Addr)> = self
            .entries
            .iter()
            .filter(|(key, _)| !key.is_wildcard())
            .map(|(key, entry)| (key.to_wildcard(), entry.address))
            .filter(|(wildcard, _)| !self.entries.contains_key(wildcard))
            .collect();

        let added = missing.len();
        for (wildcard, address) in missing {
            self.entries.insert(
                wildcard,
                Entry {
                    address,
                    source: EntrySource::Derived,
                },
            );
        }

        if added > 0 {
            debug!(added, "completed wildcard entries");
        }
        added
    }

    /// Find the address for a query name.
    ///
    /// Exact match first, then the wildcard for the name with its leftmost
    /// label dropped. Only one label is ever dropped.
    pub fn lookup(&self, query_name: &str) -> Option<Ipv4Addr> {
        let key = DomainKey::exact(query_name).ok()?;
        self.lookup_key(&key)
    }

    /// [`NameTable::lookup`] for an already-normalized key.
    pub fn lookup_key(&self, key: &DomainKey) -> Option<Ipv4Addr> {
        let key = key.to_exact();
        if let Some(entry) = self.entries.get(&key) {
            return Some(entry.address);
        }
        let parent = key.parent_wildcard()?;
        self.entries.get(&parent).map(|entry| entry.address)
    }

    /// Direct access to an entry by key.
    pub fn get(&self, key: &DomainKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&DomainKey, &Entry)> {
        self.entries.iter()
    }

    /// Base names (wildcard forms folded into their base) with an address,
    /// for OS resolver reconciliation. The exact entry's address wins.
    pub fn base_names(&self) -> Vec<(String, Ipv4Addr)> {
        let mut bases: BTreeMap<&str, Ipv4Addr> = BTreeMap::new();
        for (key, entry) in &self.entries {
            let slot = bases.entry(key.base_name()).or_insert(entry.address);
            if !key.is_wildcard() {
                *slot = entry.address;
            }
        }
        bases
            .into_iter()
            .map(|(name, address)| (name.to_string(), address))
            .collect()
    }

    /// Number of entries, exact and wildcard.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of wildcard entries.
    pub fn wildcard_count(&self) -> usize {
        self.entries.keys().filter(|k| k.is_wildcard()).count()
    }

    /// Insert, except that a derived value never replaces an explicit one.
    fn insert(&mut self, key: DomainKey, address: Ipv4Addr, source: EntrySource) {
        if source == EntrySource::Derived {
            if let Some(existing) = self.entries.get(&key) {
                if existing.source == EntrySource::Explicit {
                    return;
                }
            }
        }
        self.entries.insert(key, Entry { address, source });
    }
}
