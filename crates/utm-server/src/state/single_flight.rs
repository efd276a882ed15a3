//! One in-flight computation shared by every concurrent caller.
//!
//! Each flight is tagged with the epoch it was started for. A caller only joins a flight of
//! its own epoch or newer; an older flight is left to finish for its own waiters while the
//! caller starts a fresh one.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;

struct Flight<T> {
    epoch: u64,
    future: Shared<BoxFuture<'static, T>>,
}

pub struct SingleFlight<T: Clone> {
    inflight: Mutex<Option<Flight<T>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Join the running computation for `epoch` (or a newer one), or start one with `start`.
    ///
    /// Every caller that joins the same flight receives a clone of the same output.
    pub async fn run<F, Fut>(&self, epoch: u64, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(current) if current.epoch >= epoch => current.future.clone(),
                _ => {
                    let future = start().boxed().shared();
                    *slot = Some(Flight {
                        epoch,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        let output = flight.clone().await;

        let mut slot = self.inflight.lock();
        if slot
            .as_ref()
            .is_some_and(|current| current.future.ptr_eq(&flight))
        {
            *slot = None;
        }
        output
    }

    pub fn in_flight(&self) -> bool {
        self.inflight.lock().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
