//! Duplicate call suppression.
//!
//! [`Group::run`] executes a future at most once per key among concurrent
//! callers: the first caller spawns it, later callers with the same key join
//! it, and every caller receives a clone of the single result. The key is
//! forgotten as soon as the call finishes.
//!
//! The call runs on its own Tokio task, so a caller that stops waiting (its
//! future is dropped, or it times out) leaves the call running for everyone
//! else.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::trace;

type Call<T> = Shared<BoxFuture<'static, Option<T>>>;
type Calls<T> = Arc<Mutex<HashMap<String, Call<T>>>>;

/// A set of in-flight calls keyed by string.
///
/// Cloning a `Group` yields a handle to the same set.
pub struct Group<T> {
    calls: Calls<T>,
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the future produced by `f` unless a call for `key` is already in
    /// flight, in which case this caller waits for that call instead.
    ///
    /// `f` is only invoked by the caller that starts the call. Returns `None`
    /// if the call's task panicked or was cancelled by runtime shutdown.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let call = {
            let mut calls = lock(&self.calls);
            match calls.get(key) {
                Some(call) => {
                    trace!(key, "joining in-flight call");
                    call.clone()
                }
                None => {
                    let call = self.spawn(key, f());
                    calls.insert(key.to_owned(), call.clone());
                    call
                }
            }
        };

        call.await
    }

    /// Returns the number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.calls).len()
    }

    // Called with the map locked; the task's own removal waits for the insert.
    fn spawn<Fut>(&self, key: &str, fut: Fut) -> Call<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let forget = Forget {
            calls: Arc::clone(&self.calls),
            key: key.to_owned(),
        };
        let task = tokio::spawn(async move {
            let _forget = forget;
            fut.await
        });
        task.map(Result::ok).boxed().shared()
    }
}

/// Removes a finished call from the map, even if its future panicked.
struct Forget<T> {
    calls: Calls<T>,
    key: String,
}

impl<T> Drop for Forget<T> {
    fn drop(&mut self) {
        lock(&self.calls).remove(&self.key);
    }
}

fn lock<T>(calls: &Calls<T>) -> MutexGuard<'_, HashMap<String, Call<T>>> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}
