//! Global identifier allocator
//!
//! Hands out identity values from a bounded prefetch queue. The queue is
//! refilled, in order of preference, from:
//!
//! 1. identifiers released back to the allocator (smallest first)
//! 2. the monotonic counter, while it is below `max_identifier`
//! 3. the unassigned-identifier scan, once the counter reached its bound
//!
//! Reaching the bound switches the allocator permanently into scan mode.
//! There is no wraparound: a scan that yields nothing is fatal.
//!
//! ## Concurrency
//!
//! `allocate()` blocks while another thread refills an empty queue. Exactly
//! one thread refills at a time (the `refilling` flag is guarded by the queue
//! mutex), and the counter has its own mutex, so every queued value advances
//! the counter exactly once.
//!
//! ```text
//! allocate ─► pop ─► queue empty? ─► refill (inline, one thread)
//!              │                       │
//!              └─ empty + refilling ─► wait on condvar ◄─ notify_all
//! ```

use crate::allocator_state::AllocatorState;
use crate::registry::FreeIntervalRegistry;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{Error, IdentifierSource, Result, UnassignedIdentifierScan};
use tracing::{debug, info, warn};

/// Default prefetch queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 1_000;

/// Default upper bound of the counter
pub const DEFAULT_MAX_IDENTIFIER: i64 = i64::MAX;

/// Sizing of an [`IdentifierAllocator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Largest identifier the counter may produce
    pub max_identifier: i64,
    /// Prefetch queue capacity
    pub queue_size: usize,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        AllocatorOptions {
            max_identifier: DEFAULT_MAX_IDENTIFIER,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Default)]
struct PrefetchQueue {
    ids: VecDeque<i64>,
    refilling: bool,
}

/// Allocator of globally unique identity values
pub struct IdentifierAllocator {
    options: AllocatorOptions,
    /// Where `shutdown()` persists and `load()` restores the state
    state_path: Option<PathBuf>,
    counter: Mutex<AllocatorState>,
    released: FreeIntervalRegistry,
    queue: Mutex<PrefetchQueue>,
    available: Condvar,
    scanner: Option<Arc<dyn UnassignedIdentifierScan>>,
}

impl IdentifierAllocator {
    /// Create an in-memory allocator starting from counter 0
    pub fn new(options: AllocatorOptions) -> Self {
        IdentifierAllocator {
            options,
            state_path: None,
            counter: Mutex::new(AllocatorState::default()),
            released: FreeIntervalRegistry::empty("global allocator (released)"),
            queue: Mutex::new(PrefetchQueue::default()),
            available: Condvar::new(),
            scanner: None,
        }
    }

    /// Create an allocator that persists its state at `path`
    ///
    /// Call [`load`](Self::load) once before the first allocation.
    pub fn with_state_file(options: AllocatorOptions, path: impl Into<PathBuf>) -> Self {
        IdentifierAllocator {
            state_path: Some(path.into()),
            ..Self::new(options)
        }
    }

    /// Attach the storage scan used in scan mode
    pub fn with_scanner(mut self, scanner: Arc<dyn UnassignedIdentifierScan>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Allocator options
    pub fn options(&self) -> AllocatorOptions {
        self.options
    }

    /// Path of the persisted state, if any
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Restore counter and scan-mode flag from the state file
    ///
    /// A missing file means "start from zero, scan mode off". Any prefetched
    /// identifiers are discarded.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let state = AllocatorState::read(path)?;
        if state.counter > self.options.max_identifier {
            return Err(Error::Corruption(format!(
                "persisted counter {} exceeds max identifier {}",
                state.counter, self.options.max_identifier
            )));
        }
        *self.counter.lock() = state;
        self.queue.lock().ids.clear();
        info!(
            counter = state.counter,
            scan_mode = state.scan_mode,
            path = %path.display(),
            "Loaded identifier allocator state"
        );
        Ok(())
    }

    /// Persist counter and scan-mode flag
    ///
    /// Prefetched identifiers that were never handed out are not persisted;
    /// after a restart they are skipped and only scan mode can find them.
    pub fn shutdown(&self) -> Result<()> {
        let state = self.state();
        let Some(path) = &self.state_path else {
            debug!(counter = state.counter, "In-memory allocator, nothing to persist");
            return Ok(());
        };
        state.write(path)?;
        info!(
            counter = state.counter,
            scan_mode = state.scan_mode,
            path = %path.display(),
            "Persisted identifier allocator state"
        );
        Ok(())
    }

    /// Current counter and scan-mode flag
    pub fn state(&self) -> AllocatorState {
        *self.counter.lock()
    }

    /// Whether the allocator switched to scan mode
    pub fn is_scan_mode(&self) -> bool {
        self.counter.lock().scan_mode
    }

    /// Number of prefetched identifiers waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.lock().ids.len()
    }

    /// Allocate one identifier
    ///
    /// Blocks while another thread refills the queue.
    ///
    /// # Errors
    ///
    /// `Error::Exhausted` when the counter is at its bound and the scan
    /// yields no candidates (or no scan is configured).
    pub fn allocate(&self) -> Result<i64> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(id) = queue.ids.pop_front() {
                let drained = queue.ids.is_empty() && !queue.refilling;
                if drained {
                    queue.refilling = true;
                }
                drop(queue);
                if drained {
                    if let Err(e) = self.refill() {
                        warn!(error = %e, "Prefetch refill failed, next allocation retries");
                    }
                }
                return Ok(id);
            }

            if queue.refilling {
                self.available.wait(&mut queue);
                continue;
            }

            queue.refilling = true;
            drop(queue);
            self.refill()?;
            queue = self.queue.lock();
        }
    }

    /// Return identifiers that never became visible
    pub fn release(&self, ids: &[i64]) {
        let max = self.options.max_identifier;
        let valid = ids.iter().copied().filter(|&id| {
            let ok = id > 0 && id <= max;
            if !ok {
                warn!(id, "Ignoring release of identifier outside the allocator range");
            }
            ok
        });
        self.released.release(valid);
    }

    /// Refill the queue; the caller must have set `refilling`
    fn refill(&self) -> Result<()> {
        let batch = self.next_batch();
        let mut queue = self.queue.lock();
        queue.refilling = false;
        let result = batch.map(|ids| {
            debug!(count = ids.len(), "Refilled identifier prefetch queue");
            queue.ids.extend(ids);
        });
        self.available.notify_all();
        result
    }

    fn next_batch(&self) -> Result<Vec<i64>> {
        let size = self.options.queue_size.max(1);
        let mut batch = Vec::with_capacity(size);

        while batch.len() < size && !self.released.is_empty() {
            match self.released.take_next() {
                Ok(id) => batch.push(id),
                Err(_) => break,
            }
        }

        let scan_mode = {
            let mut state = self.counter.lock();
            while batch.len() < size && !state.scan_mode {
                if state.counter >= self.options.max_identifier {
                    state.scan_mode = true;
                    info!(
                        counter = state.counter,
                        max = self.options.max_identifier,
                        "Identifier counter reached its bound, switching to scan mode"
                    );
                    break;
                }
                state.counter += 1;
                batch.push(state.counter);
            }
            state.scan_mode
        };

        if batch.is_empty() && scan_mode {
            batch = self.scan(size)?;
        }
        if batch.is_empty() {
            return Err(Error::exhausted("global allocator"));
        }
        Ok(batch)
    }

    fn scan(&self, limit: usize) -> Result<Vec<i64>> {
        let Some(scanner) = &self.scanner else {
            return Err(Error::exhausted(
                "global allocator (scan mode without unassigned-identifier scan)",
            ));
        };
        let candidates = scanner.unassigned_identifiers(limit)?;
        debug!(found = candidates.len(), "Scanned storage for unassigned identifiers");
        Ok(candidates
            .into_iter()
            .filter(|&id| id > 0 && id <= self.options.max_identifier)
            .take(limit)
            .collect())
    }
}

impl IdentifierSource for IdentifierAllocator {
    fn next_identifier(&self) -> Result<i64> {
        self.allocate()
    }

    fn release_identifiers(&self, ids: &[i64]) {
        self.release(ids);
    }
}
