// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The property bag and event log carried by a [`ResilienceContext`][crate::ResilienceContext].

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key into [`ResilienceProperties`].
///
/// The key pairs a string name with a compile-time value type, so property
/// reads are checked without downcasting at the call site.
///
/// # Examples
///
/// ```
/// use hedgerow::{ResilienceKey, ResilienceProperties};
///
/// const ATTEMPTED_HOST: ResilienceKey<String> = ResilienceKey::new("attempted_host");
///
/// let mut properties = ResilienceProperties::new();
/// properties.set(ATTEMPTED_HOST, "replica-2".to_string());
/// assert_eq!(properties.get(ATTEMPTED_HOST), Some("replica-2".to_string()));
/// ```
pub struct ResilienceKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> ResilienceKey<T> {
    /// Creates a key with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ResilienceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResilienceKey<T> {}

impl<T> Debug for ResilienceKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResilienceKey").field(&self.name).finish()
    }
}

/// String-keyed property bag attached to a resilience context.
///
/// Values are stored behind `Arc`, so cloning the bag is shallow: sibling
/// hedged attempts receive isolated *maps* over shared values. Map-level
/// mutations (inserts and overwrites) made by one attempt are invisible to
/// its siblings, and only the accepted attempt's mutations survive the call.
#[derive(Clone, Default)]
pub struct ResilienceProperties {
    values: HashMap<Cow<'static, str>, Arc<dyn Any + Send + Sync>>,
}

impl ResilienceProperties {
    /// Creates an empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under the given key, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, key: ResilienceKey<T>, value: T) {
        self.values.insert(Cow::Borrowed(key.name), Arc::new(value));
    }

    /// Retrieves a clone of the value stored under the given key.
    ///
    /// Returns `None` when the key is absent or holds a value of a different
    /// type than the key declares.
    #[must_use]
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: ResilienceKey<T>) -> Option<T> {
        self.values.get(key.name).and_then(|value| value.downcast_ref::<T>()).cloned()
    }

    /// Returns `true` if a value is stored under the given key.
    #[must_use]
    pub fn contains<T>(&self, key: ResilienceKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    /// Returns the number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bag holds no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copies every entry of `other` into this bag, overwriting collisions.
    ///
    /// Removals performed on `other` are not propagated; the merge is
    /// insert-only, matching the winner-merge contract of the strategy.
    pub(crate) fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), Arc::clone(value));
        }
    }
}

impl Debug for ResilienceProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(Cow::as_ref).collect();
        keys.sort_unstable();
        f.debug_struct("ResilienceProperties").field("keys", &keys).finish()
    }
}

/// Severity attached to a [`ResilienceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSeverity {
    /// Diagnostic detail.
    Debug,
    /// Routine operational information.
    Information,
    /// Something noteworthy happened; the call is still progressing.
    Warning,
    /// The call failed or telemetry itself broke.
    Error,
}

/// An entry in a resilience context's append-only event log.
///
/// The hedging strategy appends a Warning event named `on_hedging` every time
/// it reports a hedging event; user callbacks and generators may append their
/// own entries through the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResilienceEvent {
    severity: EventSeverity,
    name: Cow<'static, str>,
}

impl ResilienceEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(severity: EventSeverity, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            severity,
            name: name.into(),
        }
    }

    /// Returns the event severity.
    #[must_use]
    pub fn severity(&self) -> EventSeverity {
        self.severity
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
