use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::models::{
    health_score, InfrastructureStatus, Stack, StackStatus, Unit, UnitStatus, CACHE_DIR,
};
use super::path::parse_path;
use crate::executor::terragrunt::Terragrunt;

/// Derives the deployment status of units and stacks.
///
/// Probes never fail: anything that goes wrong is reported as `Unknown`.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn unit_status(&self, unit_path: &str) -> UnitStatus;
    async fn stack_status(&self, stack_path: &str) -> StackStatus;
}

/// Probes by asking terragrunt for the state of each directory.
pub struct TerragruntProbe {
    terragrunt: Arc<Terragrunt>,
}

impl TerragruntProbe {
    pub fn new(terragrunt: Arc<Terragrunt>) -> Self {
        Self { terragrunt }
    }
}

#[async_trait]
impl StatusProbe for TerragruntProbe {
    async fn unit_status(&self, unit_path: &str) -> UnitStatus {
        // Never initialised, so nothing can be deployed.
        if !self.terragrunt.unit_dir(unit_path).join(CACHE_DIR).is_dir() {
            return UnitStatus::NotDeployed;
        }

        match self.terragrunt.state_list(unit_path).await {
            Ok(out) if out.timed_out() => {
                tracing::warn!(unit = %unit_path, "Status probe timed out");
                UnitStatus::Unknown
            }
            Ok(out) if out.success() && !out.stdout.trim().is_empty() => UnitStatus::Deployed,
            Ok(_) => UnitStatus::NotDeployed,
            Err(e) => {
                tracing::warn!(unit = %unit_path, error = %e, "Status probe failed");
                UnitStatus::Unknown
            }
        }
    }

    async fn stack_status(&self, stack_path: &str) -> StackStatus {
        match self.terragrunt.stack_state_list(stack_path).await {
            Ok(out) if out.success() => StackStatus::Deployed,
            Ok(_) => StackStatus::Unknown,
            Err(e) => {
                tracing::warn!(stack = %stack_path, error = %e, "Stack status probe failed");
                StackStatus::Unknown
            }
        }
    }
}

/// Units and stacks found by one discovery pass, plus a per-pass cache of
/// probe results. Each path is probed at most once, even when several tasks
/// ask for it at the same time.
pub struct Registry {
    probe: Arc<dyn StatusProbe>,
    units: BTreeMap<String, Unit>,
    stacks: BTreeMap<String, Stack>,
    unit_cache: DashMap<String, Arc<OnceCell<UnitStatus>>>,
    stack_cache: DashMap<String, Arc<OnceCell<StackStatus>>>,
}

impl Registry {
    pub fn new(probe: Arc<dyn StatusProbe>) -> Self {
        Self {
            probe,
            units: BTreeMap::new(),
            stacks: BTreeMap::new(),
            unit_cache: DashMap::new(),
            stack_cache: DashMap::new(),
        }
    }

    pub fn insert_unit(&mut self, unit: Unit) {
        self.units.insert(unit.path.clone(), unit);
    }

    pub fn insert_stack(&mut self, stack: Stack) {
        self.stacks.insert(stack.path.clone(), stack);
    }

    pub fn unit(&self, path: &str) -> Option<&Unit> {
        self.units.get(path)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Memoised unit status.
    pub async fn unit_status(&self, unit_path: &str) -> UnitStatus {
        let cell = self
            .unit_cache
            .entry(unit_path.to_string())
            .or_default()
            .clone();
        *cell
            .get_or_init(|| async {
                tracing::debug!(unit = %unit_path, "Probing unit status");
                self.probe.unit_status(unit_path).await
            })
            .await
    }

    /// Memoised stack status.
    pub async fn stack_status(&self, stack_path: &str) -> StackStatus {
        let cell = self
            .stack_cache
            .entry(stack_path.to_string())
            .or_default()
            .clone();
        *cell
            .get_or_init(|| async {
                tracing::debug!(stack = %stack_path, "Probing stack status");
                self.probe.stack_status(stack_path).await
            })
            .await
    }

    /// Probe the given units with at most `parallelism` probes in flight and
    /// write the results back.
    pub async fn probe_units(&self, units: &mut [Unit], parallelism: usize) {
        let paths: Vec<String> = units.iter().map(|u| u.path.clone()).collect();
        let statuses: BTreeMap<String, UnitStatus> = stream::iter(paths)
            .map(|path| async move {
                let status = self.unit_status(&path).await;
                (path, status)
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        for unit in units.iter_mut() {
            if let Some(status) = statuses.get(&unit.path) {
                unit.status = *status;
            }
        }
    }

    /// Probe every registered unit and store the result on it.
    pub async fn probe_all(&mut self, parallelism: usize) {
        let mut units: Vec<Unit> = std::mem::take(&mut self.units).into_values().collect();
        self.probe_units(&mut units, parallelism).await;
        for unit in units {
            self.insert_unit(unit);
        }
    }

    /// Counts per status and a health score over the registered units, plus
    /// stack counts, optionally restricted to one environment.
    pub fn summary(&self, environment: Option<&str>) -> InfrastructureStatus {
        let units: Vec<&Unit> = self
            .units
            .values()
            .filter(|u| environment.map_or(true, |env| u.environment == env))
            .collect();
        let stacks: Vec<&Stack> = self
            .stacks
            .values()
            .filter(|s| {
                environment.map_or(true, |env| {
                    parse_path(&s.path).environment.as_deref() == Some(env)
                })
            })
            .collect();
        let stack_count =
            |status: StackStatus| stacks.iter().filter(|s| s.status == status).count();

        let count = |status: UnitStatus| units.iter().filter(|u| u.status == status).count();
        let deployed = count(UnitStatus::Deployed);
        let failed = count(UnitStatus::Failed);
        let drift_detected = count(UnitStatus::DriftDetected);

        InfrastructureStatus {
            environment: environment.map(str::to_string),
            total_units: units.len(),
            deployed,
            not_deployed: count(UnitStatus::NotDeployed),
            failed,
            outdated: count(UnitStatus::Outdated),
            drift_detected,
            unknown: count(UnitStatus::Unknown),
            health_score: health_score(units.len(), deployed, failed, drift_detected),
            total_stacks: stacks.len(),
            deployed_stacks: stack_count(StackStatus::Deployed),
            failed_stacks: stack_count(StackStatus::Failed),
            checked_at: Utc::now(),
        }
    }
}
