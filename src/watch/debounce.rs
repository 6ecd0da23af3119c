// src/watch/debounce.rs

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Coalesce bursts of calls into one delayed invocation carrying the most
/// recent value.
///
/// There is exactly one pending timer at a time. Each [`schedule`] aborts it
/// and starts a new one, so the callback only runs once the caller has been
/// quiet for `delay`. Intermediate values are dropped.
///
/// Must be used from within a tokio runtime.
///
/// [`schedule`]: Debouncer::schedule
pub struct Debouncer<T, F> {
    delay: Duration,
    on_fire: Arc<F>,
    pending: Option<JoinHandle<()>>,
    _value: PhantomData<fn(T)>,
}

impl<T, F, Fut> Debouncer<T, F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(delay: Duration, on_fire: F) -> Self {
        Self {
            delay,
            on_fire: Arc::new(on_fire),
            pending: None,
            _value: PhantomData,
        }
    }

    /// Reset the quiet period and remember `value` as the latest.
    pub fn schedule(&mut self, value: T) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                trace!("debounce timer reset");
            }
            handle.abort();
        }

        let on_fire = Arc::clone(&self.on_fire);
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(value).await;
        }));
    }

    /// Drop the pending value, if any, without firing.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// True while a scheduled value is waiting for the quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T, F> Drop for Debouncer<T, F> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl<T, F> std::fmt::Debug for Debouncer<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
