//! Which discovered devices may be tracked at all.
//!
//! An empty list allows every device. Membership is by address only; the
//! address type is not part of the key. The list is loaded from config at
//! startup and may grow at runtime from another task (clones share state).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;

use locator_core::address::AddressParseError;
use locator_core::BdAddr;

pub struct AllowList {
    addresses: Arc<DashSet<BdAddr>>,
    rejected: Arc<AtomicU64>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowList {
    pub fn new() -> Self {
        Self {
            addresses: Arc::new(DashSet::new()),
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build from textual config entries (`AA:BB:CC:DD:EE:FF`).
    pub fn from_config(entries: &[String]) -> Result<Self, AddressParseError> {
        let list = Self::new();
        for entry in entries {
            let addr: BdAddr = entry.parse()?;
            list.addresses.insert(addr);
            tracing::info!(tag = %addr, "allow-listed from config");
        }
        Ok(list)
    }

    /// Add an address. Returns false if it was already present.
    pub fn add(&self, addr: BdAddr) -> bool {
        let added = self.addresses.insert(addr);
        if added {
            tracing::info!(tag = %addr, "tag allow-listed");
        }
        added
    }

    /// Check an address. Rejections are counted.
    pub fn is_allowed(&self, addr: &BdAddr) -> bool {
        if self.addresses.is_empty() || self.addresses.contains(addr) {
            return true;
        }
        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(tag = %addr, "not on allow-list");
        false
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Events dropped because their address was not listed.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Clone for AllowList {
    fn clone(&self) -> Self {
        Self {
            addresses: self.addresses.clone(),
            rejected: self.rejected.clone(),
        }
    }
}
