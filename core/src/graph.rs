// presswork/src/graph.rs

//! Dependency graph resolution.
//!
//! Turns declared pipelines into an `ExecutionPlan`: every name reference is
//! checked and converted to an index, module identities are resolved against
//! the registry, cycles are rejected, and pipelines are layered into waves
//! whose members have no dependencies on each other.

use crate::core::control::{FailurePolicy, ModuleCategory};
use crate::core::module::Module;
use crate::error::{PressError, PressResult};
use crate::pipeline::Pipeline;
use crate::registry::ModuleRegistry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// A pipeline with its module names resolved and its dependencies as indices.
pub(crate) struct PlannedPipeline {
  pub(crate) name: Arc<str>,
  pub(crate) isolated: bool,
  pub(crate) failure_policy: FailurePolicy,
  pub(crate) stages: Vec<(ModuleCategory, Vec<Arc<dyn Module>>)>,
  pub(crate) dependencies: Vec<usize>,
}

/// Validated, wave-ordered plan of a build.
pub struct ExecutionPlan {
  pub(crate) pipelines: Vec<PlannedPipeline>,
  pub(crate) waves: Vec<Vec<usize>>,
}

impl std::fmt::Debug for ExecutionPlan {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionPlan").field("waves", &self.waves()).finish()
  }
}

impl ExecutionPlan {
  /// Pipeline names per wave, in execution order.
  pub fn waves(&self) -> Vec<Vec<&str>> {
    self
      .waves
      .iter()
      .map(|wave| wave.iter().map(|&i| &*self.pipelines[i].name).collect())
      .collect()
  }

  /// Wave number of `pipeline`, if it is part of the plan.
  pub fn wave_of(&self, pipeline: &str) -> Option<usize> {
    self
      .waves
      .iter()
      .position(|wave| wave.iter().any(|&i| &*self.pipelines[i].name == pipeline))
  }

  pub fn len(&self) -> usize {
    self.pipelines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pipelines.is_empty()
  }
}

/// Validates `pipelines` and layers them into waves.
///
/// Fails before anything runs on duplicate names, unknown dependencies,
/// dependencies on isolated pipelines, unregistered modules, and cycles.
#[instrument(name = "graph::resolve", skip_all, fields(num_pipelines = pipelines.len()), err(Display))]
pub fn resolve(
  pipelines: &[Pipeline],
  registry: &ModuleRegistry,
  default_policy: FailurePolicy,
) -> PressResult<ExecutionPlan> {
  // Sorted by name so every later step is deterministic.
  let mut by_name: BTreeMap<&str, &Pipeline> = BTreeMap::new();
  for pipeline in pipelines {
    if by_name.insert(pipeline.name(), pipeline).is_some() {
      return Err(PressError::configuration(pipeline.name(), "pipeline name declared twice"));
    }
  }
  let names: Vec<&str> = by_name.keys().copied().collect();
  let index_of: BTreeMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

  let mut planned = Vec::with_capacity(names.len());
  for name in &names {
    let pipeline = by_name[name];

    let mut dependencies = Vec::with_capacity(pipeline.dependencies().len());
    for dep in pipeline.dependencies() {
      let Some(&dep_idx) = index_of.get(dep.as_str()) else {
        return Err(PressError::UnknownPipeline {
          pipeline: pipeline.name().to_string(),
          missing: dep.clone(),
        });
      };
      if by_name[dep.as_str()].is_isolated() {
        return Err(PressError::configuration(
          pipeline.name(),
          format!("depends on isolated pipeline '{}', which exposes no outputs", dep),
        ));
      }
      dependencies.push(dep_idx);
    }

    let mut stages = Vec::with_capacity(3);
    for category in [ModuleCategory::Input, ModuleCategory::Process, ModuleCategory::Output] {
      let mut modules = Vec::new();
      for identity in pipeline.modules(category) {
        let module = registry.get(identity).ok_or_else(|| {
          PressError::configuration(
            pipeline.name(),
            format!("{} module '{}' is not registered", category, identity),
          )
        })?;
        modules.push(module);
      }
      stages.push((category, modules));
    }

    planned.push(PlannedPipeline {
      name: Arc::from(pipeline.name()),
      isolated: pipeline.is_isolated(),
      failure_policy: pipeline.failure_policy().unwrap_or(default_policy),
      stages,
      dependencies,
    });
  }

  if let Some(cycle) = find_cycle(&planned) {
    let cycle: Vec<String> = cycle.into_iter().map(|i| planned[i].name.to_string()).collect();
    event!(Level::ERROR, cycle = %cycle.join(" -> "), "Dependency cycle detected.");
    return Err(PressError::CyclicDependency { cycle });
  }

  let waves = layer_waves(&planned);
  event!(Level::DEBUG, num_waves = waves.len(), "Execution plan resolved.");
  Ok(ExecutionPlan {
    pipelines: planned,
    waves,
  })
}

/// Depth-first search for a dependency cycle. Returns the full path with the
/// first node repeated at the end, e.g. `[a, b, a]`.
fn find_cycle(pipelines: &[PlannedPipeline]) -> Option<Vec<usize>> {
  let mut done = HashSet::new();
  let mut path = Vec::new();
  for start in 0..pipelines.len() {
    if !done.contains(&start) {
      if let Some(cycle) = visit(start, pipelines, &mut done, &mut path) {
        return Some(cycle);
      }
    }
  }
  None
}

fn visit(
  node: usize,
  pipelines: &[PlannedPipeline],
  done: &mut HashSet<usize>,
  path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
  if let Some(pos) = path.iter().position(|&n| n == node) {
    let mut cycle = path[pos..].to_vec();
    cycle.push(node);
    return Some(cycle);
  }
  if done.contains(&node) {
    return None;
  }

  path.push(node);
  for &dep in &pipelines[node].dependencies {
    if let Some(cycle) = visit(dep, pipelines, done, path) {
      return Some(cycle);
    }
  }
  path.pop();
  done.insert(node);
  None
}

/// Kahn-style layering. Assumes the graph is acyclic.
fn layer_waves(pipelines: &[PlannedPipeline]) -> Vec<Vec<usize>> {
  let mut remaining: Vec<usize> = pipelines.iter().map(|p| p.dependencies.len()).collect();
  let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); pipelines.len()];
  for (idx, pipeline) in pipelines.iter().enumerate() {
    for &dep in &pipeline.dependencies {
      dependents[dep].push(idx);
    }
  }

  let mut waves = Vec::new();
  let mut current: Vec<usize> = (0..pipelines.len()).filter(|&i| remaining[i] == 0).collect();
  while !current.is_empty() {
    let mut next = Vec::new();
    for &idx in &current {
      for &dependent in &dependents[idx] {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
          next.push(dependent);
        }
      }
    }
    next.sort_unstable();
    waves.push(std::mem::take(&mut current));
    current = next;
  }
  waves
}
