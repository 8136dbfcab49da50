// this_file: crates/rasterhub-dispatch/src/registry.rs

//! Engine registry
//!
//! Each engine is registered once under a unique name with a probe that
//! reports availability and a constructor that builds an instance from
//! [`EngineSettings`]. Registration order is kept for listings.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rasterhub_core::{EngineSettings, RenderError, Result};

pub type Probe = Arc<dyn Fn() -> bool + Send + Sync>;
pub type Constructor<E> = Arc<dyn Fn(&EngineSettings) -> Result<E> + Send + Sync>;

/// Name, probe and constructor of one engine.
pub struct EngineDescriptor<E> {
    pub name: String,
    probe: Probe,
    constructor: Constructor<E>,
}

impl<E> Clone for EngineDescriptor<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            probe: Arc::clone(&self.probe),
            constructor: Arc::clone(&self.constructor),
        }
    }
}

impl<E> fmt::Debug for EngineDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<E> EngineDescriptor<E> {
    pub fn new(
        name: impl Into<String>,
        probe: impl Fn() -> bool + Send + Sync + 'static,
        constructor: impl Fn(&EngineSettings) -> Result<E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            probe: Arc::new(probe),
            constructor: Arc::new(constructor),
        }
    }

    /// Run the probe. A panicking probe counts as unavailable.
    pub fn is_available(&self) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.probe)())) {
            Ok(available) => available,
            Err(_) => {
                log::warn!("Availability probe for '{}' panicked", self.name);
                false
            }
        }
    }

    pub fn construct(&self, settings: &EngineSettings) -> Result<E> {
        (self.constructor)(settings)
    }
}

/// Name-indexed set of engine descriptors.
pub struct Registry<E> {
    descriptors: Vec<EngineDescriptor<E>>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<E> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor; a descriptor with the same name is replaced in place.
    pub fn register(&mut self, descriptor: EngineDescriptor<E>) {
        if let Some(slot) = self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            log::debug!("Replacing engine descriptor '{}'", descriptor.name);
            *slot = descriptor;
        } else {
            self.descriptors.push(descriptor);
        }
    }

    pub fn with(mut self, descriptor: EngineDescriptor<E>) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EngineDescriptor<E>> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Probe every engine.
    pub fn availability(&self) -> BTreeMap<String, bool> {
        self.descriptors
            .iter()
            .map(|d| (d.name.clone(), d.is_available()))
            .collect()
    }

    /// Names of available engines in registration order.
    pub fn available(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| d.is_available())
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.is_available())
    }

    /// Build an instance of `name`. Errors from the constructor pass through unchanged.
    pub fn construct(&self, name: &str, settings: &EngineSettings) -> Result<E> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| RenderError::unavailable(name, "no such engine is registered"))?;
        descriptor.construct(settings)
    }
}
