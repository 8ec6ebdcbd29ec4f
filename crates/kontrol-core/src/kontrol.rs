// crates/kontrol-core/src/kontrol.rs
// ============================================================================
// Module: Kontrol Service
// Description: Registry engine bundled with its running sweeper.
// Purpose: Start eviction as soon as a store has been bootstrapped.
// Dependencies: crate::{registry, sweeper, logging, store}
// ============================================================================

//! Bootstrap ends by handing the store to [`Kontrol::start`].

use std::ops::Deref;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::logging::Logger;
use crate::registry::KiteRegistry;
use crate::store::RegistryStore;
use crate::sweeper::Sweeper;
use crate::sweeper::SweeperConfig;
use crate::sweeper::SweeperHandle;

/// Running registry: the engine plus its background sweeper.
///
/// Dereferences to [`KiteRegistry`]. Dropping it stops the sweeper.
pub struct Kontrol<S: ?Sized> {
    /// Registry engine.
    registry: KiteRegistry<S>,
    /// Background sweeper.
    sweeper: SweeperHandle,
}

impl<S: RegistryStore + ?Sized + 'static> Kontrol<S> {
    /// Wraps a bootstrapped store and starts its sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Sweeper`] when the sweeper cannot start.
    pub fn start(
        store: Arc<S>,
        sweeper: SweeperConfig,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, RegistryError> {
        let registry = KiteRegistry::new(store);
        let sweeper = Sweeper::new(registry.clone(), logger, sweeper).spawn()?;
        Ok(Self {
            registry,
            sweeper,
        })
    }

    /// Returns the registry engine.
    #[must_use]
    pub const fn registry(&self) -> &KiteRegistry<S> {
        &self.registry
    }

    /// Returns true while the sweeper thread is running.
    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Stops the sweeper, returning the registry for further use.
    #[must_use]
    pub fn shutdown(self) -> KiteRegistry<S> {
        self.sweeper.stop();
        self.registry
    }
}

impl<S: ?Sized> Deref for Kontrol<S> {
    type Target = KiteRegistry<S>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}
