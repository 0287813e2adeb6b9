// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Termination-signal handler chain and the scoped guard that defers it.
//!
//! The process keeps one ordered chain of termination handlers. The OS
//! `SIGTERM` is routed into the global chain by [`install_os_dispatch`]; with
//! no handlers registered, delivery falls back to exiting with status 143.
//!
//! [`ScopedSignalGuard`] swaps the whole chain for a handler that only records
//! the signal, then puts the original chain back (same order) and re-delivers
//! the deferred signal once the critical section is over.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

/// A termination handler.
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered chain of termination handlers.
pub struct SignalRegistry {
    handlers: Mutex<Vec<(HandlerId, SignalHandler)>>,
    next_id: AtomicU64,
    fallback: SignalHandler,
}

static GLOBAL: OnceLock<Arc<SignalRegistry>> = OnceLock::new();

impl SignalRegistry {
    /// Create a registry whose `fallback` runs when a signal is delivered
    /// with no handlers registered.
    pub fn new(fallback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fallback: Arc::new(fallback),
        }
    }

    /// The process-wide registry fed by the OS `SIGTERM`.
    pub fn global() -> Arc<SignalRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(SignalRegistry::new(|| {
                tracing::warn!("termination signal with no handlers, exiting");
                std::process::exit(128 + 15);
            }))
        }))
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Append a handler to the end of the chain.
    pub fn register(&self, handler: impl Fn() + Send + Sync + 'static) -> HandlerId {
        let id = self.next_handler_id();
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Run every handler in chain order, or the fallback when the chain is empty.
    pub fn deliver(&self) {
        // Handlers run outside the lock so they may (un)register freely
        let snapshot: Vec<SignalHandler> =
            self.handlers.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        if snapshot.is_empty() {
            (self.fallback)();
            return;
        }
        for handler in snapshot {
            handler();
        }
    }

    /// Take the entire chain and leave `replacement` as the only handler.
    fn swap_all(&self, replacement: SignalHandler) -> (Vec<(HandlerId, SignalHandler)>, HandlerId) {
        let id = self.next_handler_id();
        let mut handlers = self.handlers.lock();
        let captured = std::mem::replace(&mut *handlers, vec![(id, replacement)]);
        (captured, id)
    }

    /// Drop `temporary` and put `captured` back in front of any handlers
    /// registered since the swap.
    fn restore_all(&self, temporary: HandlerId, captured: Vec<(HandlerId, SignalHandler)>) {
        let mut handlers = self.handlers.lock();
        let added: Vec<_> = handlers.drain(..).filter(|(id, _)| *id != temporary).collect();
        handlers.extend(captured);
        handlers.extend(added);
    }
}

/// Route OS `SIGTERM` into `registry`. Must be called inside a tokio runtime.
pub fn install_os_dispatch(
    registry: Arc<SignalRegistry>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        while terminate.recv().await.is_some() {
            tracing::info!("received SIGTERM");
            registry.deliver();
        }
    }))
}

/// Defers termination signals for as long as it is alive.
///
/// Restoring happens on [`restore`](Self::restore) or on drop, whichever
/// comes first.
pub struct ScopedSignalGuard {
    registry: Arc<SignalRegistry>,
    captured: Vec<(HandlerId, SignalHandler)>,
    deferring: HandlerId,
    pending: Arc<AtomicBool>,
    redeliver_after: Duration,
    restored: bool,
}

impl ScopedSignalGuard {
    /// Capture every handler currently in `registry` and install the
    /// deferring handler in their place.
    pub fn install(registry: Arc<SignalRegistry>, redeliver_after: Duration) -> Self {
        let pending = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&pending);
        let (captured, deferring) = registry.swap_all(Arc::new(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                tracing::warn!("termination signal deferred until the deployment lock is released");
            }
        }));
        tracing::debug!(captured = captured.len(), "signal guard installed");
        Self { registry, captured, deferring, pending, redeliver_after, restored: false }
    }

    /// Whether a termination signal arrived while the guard was installed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Put the original handlers back. Returns true when a deferred signal
    /// was scheduled for re-delivery.
    pub fn restore(mut self) -> bool {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> bool {
        if self.restored {
            return false;
        }
        self.restored = true;
        self.registry.restore_all(self.deferring, std::mem::take(&mut self.captured));

        if !self.is_pending() {
            return false;
        }
        tracing::info!(delay_ms = self.redeliver_after.as_millis() as u64, "re-delivering deferred termination signal");
        redeliver(Arc::clone(&self.registry), self.redeliver_after);
        true
    }
}

impl Drop for ScopedSignalGuard {
    fn drop(&mut self) {
        self.restore_inner();
    }
}

fn redeliver(registry: Arc<SignalRegistry>, delay: Duration) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                registry.deliver();
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                registry.deliver();
            });
        }
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
