// presswork/src/registry.rs

//! Defines `ModuleRegistry`, the identity-keyed map from module names to their
//! executable capability. The surrounding application fills it before a build;
//! pipelines refer to modules only by identity.

use crate::core::module::Module;
use crate::error::{PressError, PressResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

#[derive(Default)]
pub struct ModuleRegistry {
  modules: RwLock<HashMap<String, Arc<dyn Module>>>,
}

impl ModuleRegistry {
  /// Creates a new, empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `module` under its own identity.
  pub fn register<M: Module + 'static>(&self, module: M) -> PressResult<()> {
    self.register_arc(Arc::new(module))
  }

  /// Registers a shared module. Identities are unique; registering a second
  /// module under a taken identity is a configuration error.
  pub fn register_arc(&self, module: Arc<dyn Module>) -> PressResult<()> {
    let identity = module.identity().to_string();
    let mut modules = self.modules.write();
    if modules.contains_key(&identity) {
      event!(Level::ERROR, module = %identity, "Duplicate module identity.");
      return Err(PressError::configuration(
        "<registry>",
        format!("module identity '{}' is already registered", identity),
      ));
    }
    event!(Level::DEBUG, module = %identity, version = %module.version(), "Registering module.");
    modules.insert(identity, module);
    Ok(())
  }

  /// Replaces or inserts without the uniqueness check.
  pub fn replace<M: Module + 'static>(&self, module: M) {
    let module: Arc<dyn Module> = Arc::new(module);
    self.modules.write().insert(module.identity().to_string(), module);
  }

  pub fn get(&self, identity: &str) -> Option<Arc<dyn Module>> {
    self.modules.read().get(identity).cloned()
  }

  pub fn contains(&self, identity: &str) -> bool {
    self.modules.read().contains_key(identity)
  }

  /// Registered identities, sorted.
  pub fn identities(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.modules.read().keys().cloned().collect();
    ids.sort();
    ids
  }

  pub fn len(&self) -> usize {
    self.modules.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.read().is_empty()
  }
}
