// presswork/src/pipeline/definition.rs

//! Contains the `Pipeline` struct definition and methods for its construction
//! and structural modification.
//!
//! A pipeline only names its modules; the engine resolves the names against
//! the module registry when it plans a build.

use crate::core::control::{FailurePolicy, ModuleCategory};
use crate::error::{PressError, PressResult};
use std::collections::BTreeSet;

/// Named, ordered composition of modules with declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
  pub(crate) name: String,
  pub(crate) input: Vec<String>,
  pub(crate) process: Vec<String>,
  pub(crate) output: Vec<String>,
  pub(crate) dependencies: BTreeSet<String>,
  pub(crate) isolated: bool,
  /// `None` falls back to the engine default.
  pub(crate) failure_policy: Option<FailurePolicy>,
}

impl Pipeline {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      input: Vec::new(),
      process: Vec::new(),
      output: Vec::new(),
      dependencies: BTreeSet::new(),
      isolated: false,
      failure_policy: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn dependencies(&self) -> &BTreeSet<String> {
    &self.dependencies
  }

  pub fn is_isolated(&self) -> bool {
    self.isolated
  }

  pub fn failure_policy(&self) -> Option<FailurePolicy> {
    self.failure_policy
  }

  pub fn modules(&self, category: ModuleCategory) -> &[String] {
    match category {
      ModuleCategory::Input => &self.input,
      ModuleCategory::Process => &self.process,
      ModuleCategory::Output => &self.output,
    }
  }

  fn modules_mut(&mut self, category: ModuleCategory) -> &mut Vec<String> {
    match category {
      ModuleCategory::Input => &mut self.input,
      ModuleCategory::Process => &mut self.process,
      ModuleCategory::Output => &mut self.output,
    }
  }

  /// Every module reference in execution order.
  pub fn all_modules(&self) -> impl Iterator<Item = (ModuleCategory, &str)> {
    [ModuleCategory::Input, ModuleCategory::Process, ModuleCategory::Output]
      .into_iter()
      .flat_map(move |category| self.modules(category).iter().map(move |id| (category, id.as_str())))
  }

  // --- Builder-style construction ---

  pub fn with_input(mut self, module: impl Into<String>) -> Self {
    self.input.push(module.into());
    self
  }

  pub fn with_process(mut self, module: impl Into<String>) -> Self {
    self.process.push(module.into());
    self
  }

  pub fn with_output(mut self, module: impl Into<String>) -> Self {
    self.output.push(module.into());
    self
  }

  pub fn depends_on(mut self, pipeline: impl Into<String>) -> Self {
    self.dependencies.insert(pipeline.into());
    self
  }

  pub fn isolated(mut self) -> Self {
    self.isolated = true;
    self
  }

  pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.failure_policy = Some(policy);
    self
  }

  // --- In-place modification ---

  pub fn add_module(&mut self, category: ModuleCategory, module: impl Into<String>) {
    self.modules_mut(category).push(module.into());
  }

  fn position_of(&self, category: ModuleCategory, existing: &str) -> PressResult<usize> {
    self
      .modules(category)
      .iter()
      .position(|m| m == existing)
      .ok_or_else(|| {
        PressError::configuration(
          &self.name,
          format!("module '{}' not found among {} modules", existing, category),
        )
      })
  }

  pub fn insert_module_before(
    &mut self,
    category: ModuleCategory,
    existing: &str,
    module: impl Into<String>,
  ) -> PressResult<()> {
    let idx = self.position_of(category, existing)?;
    self.modules_mut(category).insert(idx, module.into());
    Ok(())
  }

  pub fn insert_module_after(
    &mut self,
    category: ModuleCategory,
    existing: &str,
    module: impl Into<String>,
  ) -> PressResult<()> {
    let idx = self.position_of(category, existing)?;
    self.modules_mut(category).insert(idx + 1, module.into());
    Ok(())
  }

  /// Removes the first occurrence. Removing an absent module is a no-op.
  pub fn remove_module(&mut self, category: ModuleCategory, module: &str) {
    let modules = self.modules_mut(category);
    if let Some(idx) = modules.iter().position(|m| m == module) {
      modules.remove(idx);
    }
  }

  pub fn add_dependency(&mut self, pipeline: impl Into<String>) {
    self.dependencies.insert(pipeline.into());
  }

  pub fn remove_dependency(&mut self, pipeline: &str) {
    self.dependencies.remove(pipeline);
  }

  pub fn set_isolated(&mut self, isolated: bool) {
    self.isolated = isolated;
  }

  pub fn set_failure_policy(&mut self, policy: Option<FailurePolicy>) {
    self.failure_policy = policy;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn modules_keep_declaration_order_per_category() {
    let mut pipeline = Pipeline::new("posts")
      .with_input("read")
      .with_process("front-matter")
      .with_process("render")
      .with_output("write");
    pipeline
      .insert_module_before(ModuleCategory::Process, "render", "excerpt")
      .unwrap();
    pipeline.insert_module_after(ModuleCategory::Process, "render", "minify").unwrap();

    let order: Vec<&str> = pipeline.all_modules().map(|(_, m)| m).collect();
    assert_eq!(order, vec!["read", "front-matter", "excerpt", "render", "minify", "write"]);
  }

  #[test]
  fn inserting_relative_to_missing_module_is_a_configuration_error() {
    let mut pipeline = Pipeline::new("posts").with_process("render");
    let err = pipeline
      .insert_module_before(ModuleCategory::Output, "render", "x")
      .unwrap_err();
    assert!(matches!(err, PressError::Configuration { .. }));
    assert!(err.to_string().contains("output"));
  }
}
