// crates/kontrol-core/src/sweeper.rs
// ============================================================================
// Module: Expiration Sweeper
// Description: Background eviction of kites whose heartbeat lapsed.
// Purpose: Turn missed upserts into automatic deregistration.
// Dependencies: crate::{logging, registry, store}
// ============================================================================

//! ## Overview
//! The sweeper runs on its own thread: once at startup, then every
//! `interval`. Each run deletes rows not refreshed within `expire`. Outcomes
//! are reported only through the [`Logger`]; a failed run is logged as a
//! warning and the next tick tries again. Rows refreshed while a sweep is in
//! flight may or may not survive that sweep.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::RegistryError;
use crate::logging::Logger;
use crate::registry::KiteRegistry;
use crate::store::RegistryStore;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Default age after which an unrefreshed kite is evicted.
pub const DEFAULT_EXPIRE_AGE: Duration = Duration::from_secs(20);

/// Sweeper schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Age of `updated_at` after which a row is deleted.
    pub expire: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            expire: DEFAULT_EXPIRE_AGE,
        }
    }
}

// ============================================================================
// SECTION: Sweeper
// ============================================================================

/// Periodic eviction task over a registry.
pub struct Sweeper<S: ?Sized> {
    /// Registry whose rows are swept.
    registry: KiteRegistry<S>,
    /// Sink for sweep outcomes.
    logger: Arc<dyn Logger>,
    /// Schedule.
    config: SweeperConfig,
}

impl<S: RegistryStore + ?Sized + 'static> Sweeper<S> {
    /// Creates a sweeper; nothing runs until [`Sweeper::spawn`].
    #[must_use]
    pub fn new(registry: KiteRegistry<S>, logger: Arc<dyn Logger>, config: SweeperConfig) -> Self {
        Self {
            registry,
            logger,
            config,
        }
    }

    /// Runs a single sweep, returning the number of evicted rows.
    ///
    /// Failures are logged and reported as `None`.
    pub fn run_once(&self) -> Option<u64> {
        match self.registry.clean_expired_rows(self.config.expire) {
            Ok(0) => Some(0),
            Ok(removed) => {
                self.logger.info(format_args!("registry: cleaned up {removed} expired kites"));
                Some(removed)
            }
            Err(err) => {
                self.logger.warning(format_args!("registry: cleaning expired kites failed: {err}"));
                None
            }
        }
    }

    /// Starts the sweep loop on a dedicated thread.
    ///
    /// The first sweep happens immediately. The loop ends when the returned
    /// handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Sweeper`] when the interval is zero or the
    /// thread cannot be spawned.
    pub fn spawn(self) -> Result<SweeperHandle, RegistryError> {
        if self.config.interval.is_zero() {
            return Err(RegistryError::Sweeper(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("kontrol-sweeper".to_string())
            .spawn(move || {
                loop {
                    let _ = self.run_once();
                    match stop_rx.recv_timeout(self.config.interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|err| RegistryError::Sweeper(err.to_string()))?;
        Ok(SweeperHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Owner of a running sweeper thread. Dropping it stops the sweeper.
pub struct SweeperHandle {
    /// Stop signal; dropping it wakes the loop.
    stop: Option<mpsc::Sender<()>>,
    /// Sweeper thread.
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for the current run to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Returns true while the sweeper thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Signals the loop and joins the thread.
    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
