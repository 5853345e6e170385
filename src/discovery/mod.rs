//! Finding units and stacks on disk and deriving their status.

pub mod models;
pub mod path;
pub mod registry;
pub mod scanner;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::dag::{self, ExecutionPlan, GraphFormat, RenderedGraph};
use crate::error::{DiscoveryError, PlanError};
use models::{Stack, Unit};
use registry::{Registry, StatusProbe};
use scanner::StackCandidate;

pub use path::{build_path, parse_path, PathComponents, KNOWN_REGIONS};

/// Entry point for discovery passes over the configured root.
///
/// Every call is a fresh pass: nothing is cached between calls, and probe
/// results are shared only within the pass that produced them.
pub struct Discovery {
    settings: Arc<Settings>,
    probe: Arc<dyn StatusProbe>,
}

impl Discovery {
    pub fn new(settings: Arc<Settings>, probe: Arc<dyn StatusProbe>) -> Self {
        Self { settings, probe }
    }

    fn root(&self) -> PathBuf {
        self.settings.root().to_path_buf()
    }

    fn parallelism(&self) -> usize {
        self.settings.terragrunt.parallelism
    }

    /// All units under the root, with probed status, sorted by path.
    pub async fn discover(&self, env: Option<&str>) -> Result<Vec<Unit>, DiscoveryError> {
        let mut units = self.scan(env).await?;
        let registry = Registry::new(self.probe.clone());
        registry.probe_units(&mut units, self.parallelism()).await;
        tracing::info!(count = units.len(), "Discovered units");
        Ok(units)
    }

    /// Units and, when enabled, stacks of one pass, collected in a registry.
    pub async fn discover_registry(&self, env: Option<&str>) -> Result<Registry, DiscoveryError> {
        let units = self.scan(env).await?;
        let mut registry = Registry::new(self.probe.clone());
        for unit in units {
            registry.insert_unit(unit);
        }
        registry.probe_all(self.parallelism()).await;

        if self.settings.stacks.enabled {
            for candidate in self.scan_stacks(env).await? {
                let stack = self.build_stack(&registry, candidate).await?;
                registry.insert_stack(stack);
            }
        }
        Ok(registry)
    }

    /// All stacks under the root. Empty when stacks are disabled.
    pub async fn discover_stacks(&self, env: Option<&str>) -> Result<Vec<Stack>, DiscoveryError> {
        if !self.settings.stacks.enabled {
            tracing::warn!("Stacks are disabled in configuration");
            return Ok(Vec::new());
        }

        let registry = Registry::new(self.probe.clone());
        let mut stacks = Vec::new();
        for candidate in self.scan_stacks(env).await? {
            stacks.push(self.build_stack(&registry, candidate).await?);
        }
        tracing::info!(count = stacks.len(), "Discovered stacks");
        Ok(stacks)
    }

    /// A single stack by its root-relative path.
    pub async fn stack(&self, stack_path: &str) -> Result<Stack, DiscoveryError> {
        let root = self.root();
        let path = stack_path.to_string();
        let candidate = blocking(move || scanner::read_stack(&root, &path)).await?;
        let registry = Registry::new(self.probe.clone());
        self.build_stack(&registry, candidate).await
    }

    pub fn plan_execution(&self, units: &[Unit]) -> Result<ExecutionPlan, PlanError> {
        dag::plan_execution(units, self.settings.terragrunt.cycle_policy)
    }

    pub fn dependency_graph(
        &self,
        units: &[Unit],
        format: GraphFormat,
        max_depth: Option<usize>,
    ) -> RenderedGraph {
        dag::get_dependency_graph(units, format, max_depth)
    }

    async fn scan(&self, env: Option<&str>) -> Result<Vec<Unit>, DiscoveryError> {
        let root = self.root();
        let env = env.map(str::to_string);
        blocking(move || scanner::scan_units(&root, env.as_deref())).await
    }

    async fn scan_stacks(&self, env: Option<&str>) -> Result<Vec<StackCandidate>, DiscoveryError> {
        let root = self.root();
        let env = env.map(str::to_string);
        blocking(move || scanner::scan_stacks(&root, env.as_deref())).await
    }

    async fn build_stack(
        &self,
        registry: &Registry,
        candidate: StackCandidate,
    ) -> Result<Stack, DiscoveryError> {
        let root = self.root();
        let stack_path = candidate.path.clone();
        let mut units =
            blocking(move || scanner::scan_units_under(&root, &stack_path, None, true)).await?;
        registry.probe_units(&mut units, self.parallelism()).await;

        let mut warnings = Vec::new();
        let execution_order = if units.is_empty() {
            Vec::new()
        } else {
            match self.plan_execution(&units) {
                Ok(plan) => {
                    warnings.extend(plan.warnings);
                    plan.batches
                }
                Err(e) => {
                    tracing::warn!(stack = %candidate.path, error = %e, "Failed to plan stack");
                    warnings.push(e.to_string());
                    Vec::new()
                }
            }
        };

        let status = registry.stack_status(&candidate.path).await;
        let name = candidate
            .path
            .rsplit('/')
            .next()
            .unwrap_or(candidate.path.as_str())
            .to_string();

        Ok(Stack {
            name,
            path: candidate.path,
            units,
            dependencies: candidate.definition.dependencies,
            status,
            configuration: candidate.definition.locals,
            execution_order,
            created_at: candidate.created_at,
            warnings,
        })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DiscoveryError>
where
    F: FnOnce() -> Result<T, DiscoveryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
