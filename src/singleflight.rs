//! Keyed execute-or-join for expensive async operations.
//!
//! The first caller for a key runs the operation; callers arriving while it is
//! in flight await the same [`Shared`](futures::future::Shared) future and get a clone of its output.
//! The entry is dropped the moment the operation completes, so the next caller
//! starts a fresh one. The map only holds a weak handle: if every caller is
//! dropped before completion, the operation is dropped with them and the next
//! caller starts over.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, WeakShared};

struct Call<T> {
    id: u64,
    future: WeakShared<BoxFuture<'static, T>>,
}

struct Calls<K, T> {
    next_id: u64,
    in_flight: HashMap<K, Call<T>>,
}

/// Coalesces concurrent calls that share a key into one execution.
pub struct SingleFlight<K, T> {
    calls: Arc<Mutex<Calls<K, T>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        SingleFlight {
            calls: Arc::new(Mutex::new(Calls {
                next_id: 0,
                in_flight: HashMap::new(),
            })),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the future built by `operation` under `key`, or joins the one
    /// already in flight for it. `operation` is only invoked by the leader.
    pub async fn run<F, Fut>(&self, key: K, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let future = {
            let mut calls = lock(&self.calls);
            let joined = calls
                .in_flight
                .get(&key)
                .and_then(|call| call.future.upgrade());

            if let Some(future) = joined {
                future
            } else {
                let id = calls.next_id;
                calls.next_id = calls.next_id.wrapping_add(1);

                let work = operation();
                let registry = Arc::clone(&self.calls);
                let entry_key = key.clone();
                let future = async move {
                    let output = work.await;
                    let mut calls = lock(&registry);
                    if calls.in_flight.get(&entry_key).is_some_and(|c| c.id == id) {
                        calls.in_flight.remove(&entry_key);
                    }
                    output
                }
                .boxed()
                .shared();

                // Replaces any entry left behind by callers that were all dropped.
                if let Some(weak) = future.downgrade() {
                    calls.in_flight.insert(key, Call { id, future: weak });
                }
                future
            }
        };

        future.await
    }

    /// Returns `true` while an operation for `key` is running and someone awaits it.
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.calls)
            .in_flight
            .get(key)
            .is_some_and(|call| call.future.upgrade().is_some())
    }
}

fn lock<K, T>(calls: &Mutex<Calls<K, T>>) -> MutexGuard<'_, Calls<K, T>> {
    // The map is consistent after every critical section.
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}
