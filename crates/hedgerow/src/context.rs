// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::properties::{ResilienceEvent, ResilienceProperties};

/// Per-call execution context shared by the strategy and its attempts.
///
/// The context carries a cancellation token, a typed property bag, and an
/// append-only event log. It is a cheap handle: cloning produces another
/// reference to the same context, which is how attempt futures carry it into
/// `'static` closures without borrowing from the caller.
///
/// During a hedged call the strategy swaps the property bag for an isolated
/// clone and restores the original on completion, merging in the mutations of
/// the accepted attempt only. Each attempt receives its own forked context
/// with a child cancellation token, so sibling attempts never observe each
/// other's state.
///
/// # Examples
///
/// ```
/// use hedgerow::{ResilienceContext, ResilienceKey};
///
/// const REGION: ResilienceKey<String> = ResilienceKey::new("region");
///
/// let context = ResilienceContext::new();
/// context.properties().set(REGION, "westus".to_string());
/// assert_eq!(context.properties().get(REGION), Some("westus".to_string()));
/// ```
#[derive(Clone)]
pub struct ResilienceContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    cancellation: CancellationToken,
    state: Mutex<ContextState>,
}

#[derive(Default)]
struct ContextState {
    properties: ResilienceProperties,
    events: Vec<ResilienceEvent>,
}

/// Exclusive access to a context's [`ResilienceProperties`].
///
/// Returned by [`ResilienceContext::properties`]. The underlying lock is held
/// for the guard's lifetime; keep the scope short and never hold a guard
/// across an `await`.
pub struct PropertiesGuard<'a>(MappedMutexGuard<'a, ResilienceProperties>);

impl Deref for PropertiesGuard<'_> {
    type Target = ResilienceProperties;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PropertiesGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceContext {
    /// Creates a context with a fresh, never-triggered cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Creates a context observing the given cancellation token.
    ///
    /// Cancelling the token aborts the hedged call: live attempts are
    /// cancelled and the strategy returns [`Outcome::Cancelled`][crate::Outcome::Cancelled].
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancellation,
                state: Mutex::new(ContextState::default()),
            }),
        }
    }

    /// Returns the context's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.clone()
    }

    /// Grants exclusive access to the property bag.
    #[must_use]
    pub fn properties(&self) -> PropertiesGuard<'_> {
        PropertiesGuard(MutexGuard::map(self.inner.state.lock(), |state| &mut state.properties))
    }

    /// Appends an entry to the event log.
    pub fn add_event(&self, event: ResilienceEvent) {
        self.inner.state.lock().events.push(event);
    }

    /// Returns a snapshot of the event log.
    #[must_use]
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.inner.state.lock().events.clone()
    }

    pub(crate) fn events_len(&self) -> usize {
        self.inner.state.lock().events.len()
    }

    pub(crate) fn append_events(&self, events: &[ResilienceEvent]) {
        if !events.is_empty() {
            self.inner.state.lock().events.extend_from_slice(events);
        }
    }

    /// Replaces the property bag, returning the previous one.
    pub(crate) fn swap_properties(&self, replacement: ResilienceProperties) -> ResilienceProperties {
        std::mem::replace(&mut self.inner.state.lock().properties, replacement)
    }
}

impl Debug for ResilienceContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ResilienceContext")
            .field("cancelled", &self.inner.cancellation.is_cancelled())
            .field("properties", &state.properties.len())
            .field("events", &state.events.len())
            .finish_non_exhaustive()
    }
}

/// State captured from the caller's context when a hedged call begins.
///
/// The snapshot takes ownership of the original property bag (the caller's
/// context works on an isolated clone for the duration of the call), records
/// the cancellation token every attempt links from, and remembers how long
/// the event log was so winner-appended events can be merged precisely.
pub(crate) struct ContextSnapshot {
    context: ResilienceContext,
    original_cancellation: CancellationToken,
    original_properties: ResilienceProperties,
    original_events: Vec<ResilienceEvent>,
}

impl ContextSnapshot {
    pub(crate) fn capture(context: &ResilienceContext) -> Self {
        let original_cancellation = context.cancellation_token();

        // The caller's bag is moved into the snapshot and replaced with a
        // clone, so mutations made during the call start from an isolated
        // view and the pristine bag can be restored on completion.
        let isolated = context.properties().clone();
        let original_properties = context.swap_properties(isolated);
        let original_events = context.events();

        Self {
            context: context.clone(),
            original_cancellation,
            original_properties,
            original_events,
        }
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.original_cancellation
    }

    /// Forks a child context for one attempt: a clone of the captured bag and
    /// event log under a cancellation token linked to the original.
    pub(crate) fn fork(&self) -> (ResilienceContext, CancellationToken) {
        let token = self.original_cancellation.child_token();
        let child = ResilienceContext::with_cancellation(token.clone());
        *child.properties() = self.original_properties.clone();
        child.append_events(&self.original_events);
        (child, token)
    }

    /// Restores the captured bag into the original context and merges the
    /// accepted attempt's mutations, if there is one.
    pub(crate) fn restore_and_merge(self, winner: Option<&ResilienceContext>) {
        // Drop the isolated working bag; the captured original goes back in,
        // preserving the caller's pre-call entries.
        let _isolated = self.context.swap_properties(self.original_properties);

        if let Some(winner) = winner {
            let winner_properties = winner.properties().clone();
            self.context.properties().merge_from(&winner_properties);

            let winner_events = winner.events();
            let new_events = winner_events.get(self.original_events.len()..).unwrap_or_default();
            self.context.append_events(new_events);
        }
    }
}
