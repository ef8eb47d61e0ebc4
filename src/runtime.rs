// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The runtime: one backend, one arena, one configuration.

use crate::config::Config;
use crate::context::{self, Context};
use crate::contract::ContextVersion;
use crate::error::Result;
use crate::imp::{Backend, SoftwareBackend};
use crate::lifecycle;
use crate::registry::Registry;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/**
Owns every resource created through it.

Handles keep the runtime alive.  When the last handle is gone, anything still registered is torn
down and its backend objects released.
*/
#[derive(Debug)]
pub struct Runtime {
    registry: Mutex<Registry>,
    backend: Arc<dyn Backend>,
    config: Config,
}

impl Runtime {
    /// A runtime over the in-memory software backend.
    pub fn new(config: Config) -> Arc<Runtime> {
        Self::with_backend(config, Arc::new(SoftwareBackend::new()))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Arc<Runtime> {
        Arc::new(Runtime {
            registry: Mutex::new(Registry::default()),
            backend,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Creates a drawing context speaking `version`.
    pub fn create_context(self: &Arc<Self>, version: ContextVersion) -> Result<Context> {
        context::create(self, version)
    }

    pub fn live_wrappers(&self) -> usize {
        self.registry.lock().live_wrappers()
    }

    pub fn live_resources(&self) -> usize {
        self.registry.lock().live_resources()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        if registry.live_resources() > 0 {
            log::debug!("runtime dropped with {} live resources; tearing down", registry.live_resources());
        }
        lifecycle::destroy_all(registry, self.backend.as_ref());
    }
}
