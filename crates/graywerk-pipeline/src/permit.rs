// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Counting admission gate bounding how many images are processed at once.
//
// Built on a Tokio semaphore. A permit is a guard: dropping it returns the
// slot, so every exit path out of a worker (success, decode failure, encode
// failure, panic unwinding) releases exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tracing::{debug, trace};

use graywerk_core::error::{GraywerkError, Result};

/// Default number of images admitted at the same time.
pub const DEFAULT_CAPACITY: usize = 10;

/// Fixed-capacity pool of admission permits shared by every image task of a
/// batch. Cheap to clone; clones share the same counter.
#[derive(Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    held: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl PermitPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            held: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at once.
    pub fn peak_held(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait until a slot is free and take it.
    ///
    /// The semaphore is never closed, so the error arm is unreachable in
    /// practice; it still maps to `InterruptedWait`.
    pub async fn acquire(&self) -> Result<Permit> {
        let inner = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GraywerkError::InterruptedWait)?;
        Ok(self.admit(inner))
    }

    /// Like [`acquire`](Self::acquire), but gives up as soon as `interrupt`
    /// fires. An interrupt that is already set wins over a free permit.
    ///
    /// The interrupt is left set afterwards so later checks by the caller
    /// still observe it.
    pub async fn acquire_interruptible(&self, interrupt: &Interrupt) -> Result<Permit> {
        tokio::select! {
            biased;
            _ = interrupt.triggered() => {
                debug!("permit wait interrupted");
                Err(GraywerkError::InterruptedWait)
            }
            permit = self.acquire() => permit,
        }
    }

    fn admit(&self, inner: OwnedSemaphorePermit) -> Permit {
        let now = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        trace!(held = now, capacity = self.capacity, "permit acquired");
        Permit {
            _inner: inner,
            held: Arc::clone(&self.held),
        }
    }
}

impl Default for PermitPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Scoped admission ticket. The slot goes back to the pool on drop.
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
    held: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sticky interrupt flag for a pending permit wait.
///
/// Once triggered it stays triggered; clones observe the same flag.
#[derive(Clone)]
pub struct Interrupt {
    flag: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the flag is set (immediately if it already is).
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
