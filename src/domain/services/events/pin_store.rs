//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|------------------|
// | PinnedEvent             | Last pinned emission of a key                    | payload           |
// | PinStore                | At most one pinned emission per key              | pin, unpin, get   |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::event_types::{EventError, EventResult};
use crate::domain::models::event_key::EventKey;
use crate::domain::models::wildcard::WildcardValue;

/// A pinned emission, replayed to listeners that bind after it happened
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedEvent {
    payload: Option<WildcardValue>,
    sequence: u64,
    pinned_at: DateTime<Utc>,
}

impl PinnedEvent {
    pub fn payload(&self) -> Option<&WildcardValue> {
        self.payload.as_ref()
    }

    /// Sequence number of the emission that pinned the value
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pinned_at(&self) -> DateTime<Utc> {
        self.pinned_at
    }
}

#[derive(Debug, Default)]
pub struct PinStore {
    pinned: HashMap<EventKey, PinnedEvent>,
}

impl PinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `payload` for `key`.
    ///
    /// Fails with [`EventError::AlreadyPinned`] if the key already holds a pinned value; the
    /// stored value is left untouched.
    pub fn pin(&mut self, key: &EventKey, payload: Option<WildcardValue>, sequence: u64) -> EventResult<()> {
        if self.pinned.contains_key(key) {
            return Err(EventError::AlreadyPinned { key: key.clone() });
        }
        self.pinned.insert(
            key.clone(),
            PinnedEvent {
                payload,
                sequence,
                pinned_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Clears the pinned value of `key`, returning it. `None` when nothing was pinned.
    pub fn unpin(&mut self, key: &EventKey) -> Option<PinnedEvent> {
        self.pinned.remove(key)
    }

    pub fn get(&self, key: &EventKey) -> Option<&PinnedEvent> {
        self.pinned.get(key)
    }

    pub fn is_pinned(&self, key: &EventKey) -> bool {
        self.pinned.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }
}
