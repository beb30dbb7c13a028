// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-flight cache of evaluated descriptions keyed by identifier.

use crate::image::{ImageDescription, ImageId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Slot = Arc<Mutex<Option<ImageDescription>>>;

/// Cache of evaluated descriptions.
///
/// The map lock is held only long enough to find or insert a key's slot. The
/// slot lock is then held while filling, so concurrent requests for the same
/// identifier wait for the first one and share its result. Error images are
/// returned but not kept.
#[derive(Debug, Default)]
pub struct FrameCache {
    slots: Mutex<HashMap<ImageId, Slot>>,
}

impl FrameCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached description for `key`, filling it with `fill` on a miss
    pub fn get_or_fill(&self, key: &ImageId, fill: impl FnOnce() -> ImageDescription) -> ImageDescription {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut value = slot.lock();
        if let Some(cached) = value.as_ref() {
            tracing::trace!("Cache hit for {:016x}", key.fingerprint());
            return cached.clone();
        }

        let filled = fill();
        if filled.error_message().is_none() {
            *value = Some(filled.clone());
        }
        filled
    }

    /// Cached description without filling
    pub fn get(&self, key: &ImageId) -> Option<ImageDescription> {
        let slot = self.slots.lock().get(key).cloned()?;
        let value = slot.lock();
        value.clone()
    }

    /// Drop every entry; returns how many were dropped
    pub fn flush(&self) -> usize {
        let mut slots = self.slots.lock();
        let dropped = slots.len();
        slots.clear();
        dropped
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
