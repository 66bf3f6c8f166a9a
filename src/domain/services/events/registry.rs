//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|------------------|
// | ListenerTarget          | What a registration delivers to                  | is_stale          |
// | ListenerRegistration    | One bound listener plus its bind time            | describe          |
// | ListenerRegistry        | EventKey -> listeners in bind order              | bind, unbind_*    |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};

use super::event_types::{EventError, EventResult};
use super::handlers::{DelegateId, EventReceiver, WildcardDelegate};
use crate::domain::models::event_key::{EventKey, ReceiverId};

/// What a registration delivers to
#[derive(Clone, Debug)]
pub enum ListenerTarget {
    /// A named function on a receiver object
    Function {
        receiver_id: ReceiverId,
        receiver: Weak<dyn EventReceiver>,
        function: String,
    },
    /// An opaque callable
    Delegate(WildcardDelegate),
}

impl ListenerTarget {
    /// True once the receiver object behind a function target has been dropped.
    /// Delegates are owned by the registration and never go stale.
    pub fn is_stale(&self) -> bool {
        match self {
            ListenerTarget::Function { receiver, .. } => receiver.strong_count() == 0,
            ListenerTarget::Delegate(_) => false,
        }
    }

    fn same_listener(&self, other: &ListenerTarget) -> bool {
        match (self, other) {
            (
                ListenerTarget::Function { receiver_id: a, function: fa, .. },
                ListenerTarget::Function { receiver_id: b, function: fb, .. },
            ) => a == b && fa == fb,
            (ListenerTarget::Delegate(a), ListenerTarget::Delegate(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

/// A listener bound to one key
#[derive(Clone, Debug)]
pub struct ListenerRegistration {
    target: ListenerTarget,
    bound_at: DateTime<Utc>,
}

impl ListenerRegistration {
    pub fn function<R>(receiver: &Arc<R>, function: impl Into<String>) -> Self
    where
        R: EventReceiver + 'static,
    {
        let weak = Arc::downgrade(receiver);
        let weak: Weak<dyn EventReceiver> = weak;
        Self::from_weak(ReceiverId::of(receiver), weak, function.into())
    }

    /// Same as [`ListenerRegistration::function`] for a type-erased receiver. Both give the
    /// same [`ReceiverId`] for the same allocation.
    pub fn function_dyn(receiver: &Arc<dyn EventReceiver>, function: impl Into<String>) -> Self {
        Self::from_weak(ReceiverId::of(receiver), Arc::downgrade(receiver), function.into())
    }

    fn from_weak(receiver_id: ReceiverId, receiver: Weak<dyn EventReceiver>, function: String) -> Self {
        Self {
            target: ListenerTarget::Function {
                receiver_id,
                receiver,
                function,
            },
            bound_at: Utc::now(),
        }
    }

    pub fn delegate(delegate: WildcardDelegate) -> Self {
        Self {
            target: ListenerTarget::Delegate(delegate),
            bound_at: Utc::now(),
        }
    }

    pub fn target(&self) -> &ListenerTarget {
        &self.target
    }

    pub fn bound_at(&self) -> DateTime<Utc> {
        self.bound_at
    }

    /// Human readable listener name for logs and errors.
    pub fn describe(&self) -> String {
        match &self.target {
            ListenerTarget::Function { receiver_id, function, .. } => {
                format!("{}::{}", receiver_id, function)
            }
            ListenerTarget::Delegate(delegate) => delegate.id().to_string(),
        }
    }
}

/// Maps each key to its listeners, in bind order
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: HashMap<EventKey, Vec<ListenerRegistration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `registration` to the listeners of `key`.
    ///
    /// A listener already bound to the key (same receiver and function, or same delegate)
    /// is rejected.
    pub fn bind(&mut self, key: &EventKey, registration: ListenerRegistration) -> EventResult<()> {
        let listeners = self.listeners.entry(key.clone()).or_default();
        if listeners
            .iter()
            .any(|existing| !existing.target.is_stale() && existing.target.same_listener(&registration.target))
        {
            return Err(EventError::DuplicateListener {
                key: key.clone(),
                listener: registration.describe(),
            });
        }
        listeners.push(registration);
        Ok(())
    }

    /// Removes every registration of `function` on `receiver_id` for `key`.
    /// Returns how many were removed; zero is not an error.
    pub fn unbind_function(&mut self, key: &EventKey, receiver_id: ReceiverId, function: &str) -> usize {
        self.remove_where(key, |target| match target {
            ListenerTarget::Function { receiver_id: id, function: f, .. } => *id == receiver_id && f == function,
            ListenerTarget::Delegate(_) => false,
        })
    }

    /// Removes the delegate with `delegate_id` from `key`.
    pub fn unbind_delegate(&mut self, key: &EventKey, delegate_id: DelegateId) -> usize {
        self.remove_where(key, |target| match target {
            ListenerTarget::Delegate(delegate) => delegate.id() == delegate_id,
            ListenerTarget::Function { .. } => false,
        })
    }

    /// Removes every function registration of `receiver_id`, across all keys.
    pub fn unbind_receiver(&mut self, receiver_id: ReceiverId) -> usize {
        let keys: Vec<EventKey> = self.listeners.keys().cloned().collect();
        keys.iter()
            .map(|key| {
                self.remove_where(key, |target| {
                    matches!(target, ListenerTarget::Function { receiver_id: id, .. } if *id == receiver_id)
                })
            })
            .sum()
    }

    /// Drops registrations whose receiver no longer exists.
    pub fn prune_stale(&mut self, key: &EventKey) -> usize {
        self.remove_where(key, ListenerTarget::is_stale)
    }

    /// Drops registrations whose receiver no longer exists, on every key.
    pub fn prune_all_stale(&mut self) -> usize {
        let keys: Vec<EventKey> = self.listeners.keys().cloned().collect();
        keys.iter().map(|key| self.prune_stale(key)).sum()
    }

    /// Snapshot of the listeners of `key`, in dispatch order.
    ///
    /// The snapshot is detached from the registry, so binds and unbinds made while it is
    /// being iterated only show up in later snapshots.
    pub fn listeners_for(&self, key: &EventKey) -> Vec<ListenerRegistration> {
        self.listeners.get(key).cloned().unwrap_or_default()
    }

    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.listeners.get(key).map_or(0, Vec::len)
    }

    /// Keys that currently have at least one listener
    pub fn keys(&self) -> impl Iterator<Item = &EventKey> {
        self.listeners.keys()
    }

    fn remove_where<F>(&mut self, key: &EventKey, predicate: F) -> usize
    where
        F: Fn(&ListenerTarget) -> bool,
    {
        let Some(listeners) = self.listeners.get_mut(key) else {
            return 0;
        };
        let before = listeners.len();
        listeners.retain(|registration| !predicate(&registration.target));
        let removed = before - listeners.len();

        // Keep the map free of empty entries
        if listeners.is_empty() {
            self.listeners.remove(key);
        }
        removed
    }
}
