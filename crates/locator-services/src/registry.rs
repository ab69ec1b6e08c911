//! The bounded table of tag sessions.
//!
//! Sessions are keyed by `(address, address_type)`. A second index maps
//! transport handles to the same key, so both lookup paths always resolve to
//! the one session value the registry owns. Sessions without a handle
//! (proprietary broadcast binding) are only reachable by address.
//!
//! Creation beyond `max_tags` fails and leaves the table untouched. There is
//! no eviction.

use std::collections::HashMap;
use std::sync::Arc;

use locator_core::{device_id, AddressType, BdAddr};

use crate::estimator::{EstimatorError, EstimatorFactory, EstimatorSettings};
use crate::session::{TagHandle, TagSession};

type TagKey = (BdAddr, AddressType);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("tag table full ({max} sessions)")]
    CapacityExceeded { max: usize },
    #[error("session already exists for {tag_id}")]
    AlreadyExists { tag_id: String },
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

pub struct TagRegistry {
    max_tags: usize,
    sessions: HashMap<TagKey, TagSession>,
    by_handle: HashMap<TagHandle, TagKey>,
    factory: Arc<dyn EstimatorFactory>,
    settings: EstimatorSettings,
}

impl TagRegistry {
    pub fn new(
        max_tags: usize,
        factory: Arc<dyn EstimatorFactory>,
        settings: EstimatorSettings,
    ) -> Self {
        Self {
            max_tags,
            sessions: HashMap::with_capacity(max_tags),
            by_handle: HashMap::with_capacity(max_tags),
            factory,
            settings,
        }
    }

    pub fn find_by_address(&self, address: &BdAddr, address_type: AddressType) -> Option<&TagSession> {
        self.sessions.get(&(*address, address_type))
    }

    pub fn find_by_address_mut(
        &mut self,
        address: &BdAddr,
        address_type: AddressType,
    ) -> Option<&mut TagSession> {
        self.sessions.get_mut(&(*address, address_type))
    }

    pub fn find_by_handle(&self, handle: TagHandle) -> Option<&TagSession> {
        let key = self.by_handle.get(&handle)?;
        self.sessions.get(key)
    }

    pub fn find_by_handle_mut(&mut self, handle: TagHandle) -> Option<&mut TagSession> {
        let key = self.by_handle.get(&handle)?;
        self.sessions.get_mut(key)
    }

    /// True if one more session fits.
    pub fn can_admit(&self) -> bool {
        self.sessions.len() < self.max_tags
    }

    /// Create a session in state `Discovered` with a fresh estimator context.
    ///
    /// Fails without side effects when the table is full, when the address
    /// (or a non-empty handle) is already tracked, or when the estimator
    /// context cannot be allocated.
    pub fn create(
        &mut self,
        address: BdAddr,
        address_type: AddressType,
        handle: TagHandle,
    ) -> Result<&mut TagSession, RegistryError> {
        let key = (address, address_type);
        if self.sessions.contains_key(&key)
            || (!handle.is_none() && self.by_handle.contains_key(&handle))
        {
            return Err(RegistryError::AlreadyExists {
                tag_id: device_id(&address, address_type),
            });
        }
        if !self.can_admit() {
            tracing::debug!(tag = %address, max = self.max_tags, "tag table full");
            return Err(RegistryError::CapacityExceeded { max: self.max_tags });
        }

        let estimator = self.factory.create(&self.settings)?;
        let session = TagSession::new(address, address_type, handle, estimator);
        tracing::info!(tag = %session.tag_id(), handle = %handle, "session created");

        if !handle.is_none() {
            self.by_handle.insert(handle, key);
        }
        Ok(self.sessions.entry(key).or_insert(session))
    }

    /// Remove the session owning `handle`. Unknown handles are a no-op.
    /// Returns true if a session was removed.
    pub fn remove(&mut self, handle: TagHandle) -> bool {
        match self.by_handle.remove(&handle) {
            Some(key) => self.release(key),
            None => false,
        }
    }

    /// Remove by address, for sessions that have no handle.
    pub fn remove_by_address(&mut self, address: &BdAddr, address_type: AddressType) -> bool {
        let key = (*address, address_type);
        let handle = match self.sessions.get(&key) {
            Some(s) => s.handle(),
            None => return false,
        };
        if !handle.is_none() {
            self.by_handle.remove(&handle);
        }
        self.release(key)
    }

    fn release(&mut self, key: TagKey) -> bool {
        let Some(mut session) = self.sessions.remove(&key) else {
            return false;
        };
        if let Err(e) = session.estimator.angle.deinit() {
            tracing::warn!(tag = %session.tag_id(), error = %e, "estimator deinit failed");
        }
        tracing::info!(tag = %session.tag_id(), handle = %session.handle(), "session removed");
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_tags(&self) -> usize {
        self.max_tags
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagSession> {
        self.sessions.values()
    }
}

impl Drop for TagRegistry {
    fn drop(&mut self) {
        let keys: Vec<TagKey> = self.sessions.keys().copied().collect();
        for key in keys {
            self.release(key);
        }
    }
}
