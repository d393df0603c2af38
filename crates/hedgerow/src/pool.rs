// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};

use parking_lot::Mutex;

/// A bounded free-list of reusable objects.
///
/// Renting pops an idle object or creates a fresh one via the factory.
/// Returning pushes the object back unless the return-check rejects it or the
/// pool is full; either way the overflow is simply dropped. Rent and return
/// are safe to call concurrently.
pub(crate) struct Pool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
    create: Box<dyn Fn() -> T + Send + Sync>,
    returnable: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Pool<T> {
    /// Creates a pool that accepts every returned object.
    pub(crate) fn new(capacity: usize, create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_return_check(capacity, create, |_| true)
    }

    /// Creates a pool that only keeps returned objects passing `returnable`.
    pub(crate) fn with_return_check(
        capacity: usize,
        create: impl Fn() -> T + Send + Sync + 'static,
        returnable: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
            create: Box::new(create),
            returnable: Box::new(returnable),
        }
    }

    pub(crate) fn rent(&self) -> T {
        if let Some(item) = self.idle.lock().pop() {
            return item;
        }
        (self.create)()
    }

    pub(crate) fn ret(&self, item: T) {
        if !(self.returnable)(&item) {
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(item);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

impl<T> Debug for Pool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle.lock().len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
