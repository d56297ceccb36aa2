//! SP-006: Orchestrator: plans a run, then builds each unit in plan order.
//!
//! Planning → Executing(unit_i) → Completed, with Failed reachable from every
//! step. For each unit: re-check enablement, resolve inputs from the binder,
//! invoke the unit builder, record the handles it published. A failure stops
//! the run and reports the units that completed before it; nothing is rolled
//! back.

use super::binder::{BoundInputs, ResourceBinder};
use super::catalog::{Catalog, UnitDescriptor};
use super::error::{RunFailure, RunStage, StackError};
use super::resolver;
use super::types::*;
use crate::tripwire::hasher;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

// ============================================================================
// Builder interface
// ============================================================================

/// Stack-wide values every builder may use for naming and tagging.
#[derive(Debug, Clone, Copy)]
pub struct StackContext<'a> {
    pub name: &'a str,
    pub environment: &'a str,
    pub region: &'a str,
    pub tags: &'a IndexMap<String, String>,
}

impl<'a> StackContext<'a> {
    pub fn of(config: &'a StackConfig) -> Self {
        Self {
            name: &config.name,
            environment: &config.environment,
            region: &config.region,
            tags: &config.tags,
        }
    }

    /// `{stack}-{environment}-{suffix}`
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.name, self.environment, suffix)
    }
}

/// Everything a builder receives for one unit.
#[derive(Debug)]
pub struct BuildRequest<'a> {
    pub unit: &'a str,
    pub enabled: bool,
    pub stack: StackContext<'a>,
    pub config: CategoryConfig<'a>,
    pub inputs: &'a BoundInputs,
}

/// Provisions one unit. Implemented outside the core.
pub trait UnitBuilder: Send + Sync {
    fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<HandleMap>;
}

/// Adapter turning a closure into a [`UnitBuilder`].
pub struct FnBuilder<F>(F);

impl<F> FnBuilder<F>
where
    F: Fn(&BuildRequest<'_>) -> anyhow::Result<HandleMap> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> UnitBuilder for FnBuilder<F>
where
    F: Fn(&BuildRequest<'_>) -> anyhow::Result<HandleMap> + Send + Sync,
{
    fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<HandleMap> {
        (self.0)(request)
    }
}

/// Builders keyed by unit name.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, Arc<dyn UnitBuilder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B>(&mut self, unit: &str, builder: B) -> &mut Self
    where
        B: UnitBuilder + 'static,
    {
        self.builders.insert(unit.to_string(), Arc::new(builder));
        self
    }

    pub fn register_fn<F>(&mut self, unit: &str, f: F) -> &mut Self
    where
        F: Fn(&BuildRequest<'_>) -> anyhow::Result<HandleMap> + Send + Sync + 'static,
    {
        self.register(unit, FnBuilder::new(f))
    }

    pub fn get(&self, unit: &str) -> Option<&dyn UnitBuilder> {
        self.builders.get(unit).map(|b| b.as_ref())
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.builders.contains_key(unit)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

// ============================================================================
// Run lifecycle
// ============================================================================

/// Cooperative cancellation, checked between units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of the run state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Executing { index: usize, unit: String },
    Completed,
    Failed(RunStage),
}

/// Hooks invoked as a run progresses. All methods default to no-ops.
pub trait RunObserver {
    fn state_changed(&mut self, _state: &RunState) {}
    fn run_started(&mut self, _plan: &ExecutionPlan, _config_hash: &str) {}
    fn unit_started(&mut self, _unit: &str) {}
    fn unit_completed(&mut self, _unit: &str, _handles: &HandleMap, _duration_seconds: f64) {}
    fn unit_failed(&mut self, _unit: &str, _error: &StackError) {}
    fn run_completed(&mut self, _outcome: &RunOutcome, _total_seconds: f64) {}
    fn run_failed(&mut self, _failure: &RunFailure) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub plan: ExecutionPlan,

    /// Final binder contents: unit → handle name → handle
    pub handles: IndexMap<String, HandleMap>,

    /// Build time per unit, in completion order
    pub durations: IndexMap<String, f64>,

    /// Fingerprint of the configuration the run used
    pub config_hash: String,
}

/// Mutable state of an in-flight run.
#[derive(Default)]
struct Progress {
    binder: ResourceBinder,
    completed: Vec<String>,
    durations: IndexMap<String, f64>,
}

/// A unit ready to be built: its descriptor, builder, and resolved inputs.
struct Prepared<'a> {
    descriptor: &'a UnitDescriptor,
    builder: &'a dyn UnitBuilder,
    inputs: BoundInputs,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one run over a catalog and a builder registry.
pub struct Orchestrator<'a> {
    catalog: &'a Catalog,
    builders: &'a BuilderRegistry,
    cancel: CancelToken,
    parallel: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(catalog: &'a Catalog, builders: &'a BuilderRegistry) -> Self {
        Self {
            catalog,
            builders,
            cancel: CancelToken::new(),
            parallel: false,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the units of each wave concurrently.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run to completion without observation.
    pub fn run(&self, config: &StackConfig) -> Result<RunOutcome, RunFailure> {
        self.run_observed(config, &mut NoopObserver)
    }

    /// Run to completion, reporting progress to `observer`.
    pub fn run_observed(
        &self,
        config: &StackConfig,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome, RunFailure> {
        let span = info_span!("run", stack = %config.name, parallel = self.parallel);
        let _enter = span.enter();
        let start = Instant::now();

        observer.state_changed(&RunState::Planning);
        let plan = match resolver::build_execution_plan(self.catalog, config) {
            Ok(plan) => plan,
            Err(e) => return Err(fail(observer, RunFailure::planning(e))),
        };
        let config_hash = hasher::hash_config(config);
        info!(units = plan.len(), waves = plan.waves.len(), "execution plan ready");
        observer.run_started(&plan, &config_hash);

        let mut progress = Progress::default();
        let executed = if self.parallel {
            self.execute_waves(config, &plan, &mut progress, observer)
        } else {
            self.execute_in_order(config, &plan, &mut progress, observer)
        };
        if let Err(failure) = executed {
            return Err(fail(observer, failure));
        }

        let outcome = RunOutcome {
            plan,
            handles: progress.binder.into_contents(),
            durations: progress.durations,
            config_hash,
        };
        let total = start.elapsed().as_secs_f64();
        observer.state_changed(&RunState::Completed);
        observer.run_completed(&outcome, total);
        info!(units = outcome.handles.len(), total_seconds = total, "run completed");
        Ok(outcome)
    }

    fn execute_in_order(
        &self,
        config: &StackConfig,
        plan: &ExecutionPlan,
        progress: &mut Progress,
        observer: &mut dyn RunObserver,
    ) -> Result<(), RunFailure> {
        for (index, unit) in plan.order.iter().enumerate() {
            self.check_cancelled(unit, progress)?;
            observer.state_changed(&RunState::Executing {
                index,
                unit: unit.clone(),
            });
            observer.unit_started(unit);

            let _span = info_span!("unit", unit = %unit).entered();
            let start = Instant::now();
            let built = self
                .prepare(config, plan, unit, &progress.binder)
                .and_then(|prepared| invoke(config, unit, &prepared));
            match built {
                Ok(handles) => {
                    let duration = start.elapsed().as_secs_f64();
                    commit(unit, handles, duration, progress, observer)?;
                }
                Err(e) => return Err(unit_failure(observer, unit, progress, e)),
            }
        }
        Ok(())
    }

    fn execute_waves(
        &self,
        config: &StackConfig,
        plan: &ExecutionPlan,
        progress: &mut Progress,
        observer: &mut dyn RunObserver,
    ) -> Result<(), RunFailure> {
        for wave in &plan.waves {
            let Some(first) = wave.first() else {
                continue;
            };
            self.check_cancelled(first, progress)?;
            if let Err(e) = check_wave_independent(self.catalog, plan, wave) {
                return Err(unit_failure(observer, first, progress, e));
            }

            // Inputs come only from earlier waves, which are fully recorded
            let mut prepared = Vec::with_capacity(wave.len());
            for unit in wave {
                match self.prepare(config, plan, unit, &progress.binder) {
                    Ok(p) => prepared.push((unit, p)),
                    Err(e) => return Err(unit_failure(observer, unit, progress, e)),
                }
            }
            for (unit, _) in &prepared {
                observer.state_changed(&RunState::Executing {
                    index: plan.position(unit).unwrap_or_default(),
                    unit: unit.to_string(),
                });
                observer.unit_started(unit);
            }

            debug!(units = wave.len(), "building wave");
            let results: Vec<(Result<HandleMap, StackError>, f64)> = std::thread::scope(|scope| {
                let workers: Vec<_> = prepared
                    .iter()
                    .map(|(unit, p)| {
                        scope.spawn(move || {
                            let start = Instant::now();
                            let built = invoke(config, unit, p);
                            (built, start.elapsed().as_secs_f64())
                        })
                    })
                    .collect();
                workers
                    .into_iter()
                    .zip(prepared.iter())
                    .map(|(worker, (unit, _))| {
                        worker.join().unwrap_or_else(|_| {
                            let panicked = StackError::UnitBuildFailure {
                                unit: unit.to_string(),
                                source: anyhow::anyhow!("builder panicked"),
                            };
                            (Err(panicked), 0.0)
                        })
                    })
                    .collect()
            });

            // Record every success; the first failure in plan order is the root cause
            let mut root_cause: Option<(&String, StackError)> = None;
            for ((unit, _), (result, duration)) in prepared.iter().zip(results) {
                match result {
                    Ok(handles) => commit(unit, handles, duration, progress, observer)?,
                    Err(e) if root_cause.is_none() => root_cause = Some((*unit, e)),
                    Err(e) => {
                        warn!(unit = %unit, error = %e, "unit failed in the same wave");
                        observer.unit_failed(unit, &e);
                    }
                }
            }
            if let Some((unit, e)) = root_cause {
                return Err(unit_failure(observer, unit, progress, e));
            }
        }
        Ok(())
    }

    /// Re-check enablement, resolve inputs, and find the builder.
    fn prepare(
        &self,
        config: &StackConfig,
        plan: &ExecutionPlan,
        unit: &str,
        binder: &ResourceBinder,
    ) -> Result<Prepared<'a>, StackError> {
        let descriptor = self.catalog.get(unit).ok_or_else(|| {
            StackError::InvariantViolation(format!("planned unit '{}' is not in the catalog", unit))
        })?;
        if !descriptor.is_enabled(config) {
            return Err(StackError::InvariantViolation(format!(
                "planned unit '{}' is disabled at execution time",
                unit
            )));
        }

        let refs = descriptor.bound_requirements(|dep| plan.contains(dep));
        let inputs = binder.resolve_refs(&refs)?;
        let builder = self
            .builders
            .get(unit)
            .ok_or_else(|| StackError::MissingBuilder(unit.to_string()))?;

        debug!(unit, inputs = inputs.len(), "inputs bound");
        Ok(Prepared {
            descriptor,
            builder,
            inputs,
        })
    }

    fn check_cancelled(&self, next: &str, progress: &Progress) -> Result<(), RunFailure> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        Err(RunFailure {
            stage: RunStage::Cancelled,
            unit: Some(next.to_string()),
            completed: progress.completed.clone(),
            error: StackError::Cancelled,
        })
    }
}

/// Invoke the builder and check it published every declared handle.
fn invoke(config: &StackConfig, unit: &str, prepared: &Prepared<'_>) -> Result<HandleMap, StackError> {
    let request = BuildRequest {
        unit,
        enabled: true,
        stack: StackContext::of(config),
        config: config.category(prepared.descriptor.category),
        inputs: &prepared.inputs,
    };
    let handles = prepared
        .builder
        .build(&request)
        .map_err(|source| StackError::UnitBuildFailure {
            unit: unit.to_string(),
            source,
        })?;

    if let Some(absent) = prepared
        .descriptor
        .produces
        .iter()
        .find(|h| !handles.contains_key(h.as_str()))
    {
        return Err(StackError::MissingHandle {
            unit: unit.to_string(),
            handle: absent.clone(),
        });
    }
    Ok(handles)
}

/// Record a built unit and the explicit ordering it now satisfies.
fn commit(
    unit: &str,
    handles: HandleMap,
    duration: f64,
    progress: &mut Progress,
    observer: &mut dyn RunObserver,
) -> Result<(), RunFailure> {
    let published = handles.clone();
    if let Err(e) = progress.binder.record(unit, handles) {
        return Err(unit_failure(observer, unit, progress, e));
    }
    progress.completed.push(unit.to_string());
    progress.durations.insert(unit.to_string(), duration);
    observer.unit_completed(unit, &published, duration);
    info!(unit, handles = published.len(), duration_seconds = duration, "unit built");
    Ok(())
}

/// Units sharing a wave must not depend on each other among planned units.
fn check_wave_independent(
    catalog: &Catalog,
    plan: &ExecutionPlan,
    wave: &[String],
) -> Result<(), StackError> {
    for (i, a) in wave.iter().enumerate() {
        for b in &wave[i + 1..] {
            if !catalog.independent(a, b, |u| plan.contains(u)) {
                return Err(StackError::InvariantViolation(format!(
                    "units '{}' and '{}' share a wave but depend on each other",
                    a, b
                )));
            }
        }
    }
    Ok(())
}

fn unit_failure(
    observer: &mut dyn RunObserver,
    unit: &str,
    progress: &Progress,
    error: StackError,
) -> RunFailure {
    warn!(unit, error = %error, "unit failed");
    observer.unit_failed(unit, &error);
    RunFailure {
        stage: RunStage::Executing,
        unit: Some(unit.to_string()),
        completed: progress.completed.clone(),
        error,
    }
}

fn fail(observer: &mut dyn RunObserver, failure: RunFailure) -> RunFailure {
    warn!(
        stage = %failure.stage,
        completed = failure.completed.len(),
        error = %failure.error,
        "run failed"
    );
    observer.state_changed(&RunState::Failed(failure.stage));
    observer.run_failed(&failure);
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::UnitDescriptor;
    use std::sync::Mutex;

    fn config_with(categories: &[Category]) -> StackConfig {
        let mut config = StackConfig::named("test");
        for category in Category::ALL {
            config.set_enabled(category, categories.contains(&category));
        }
        config
    }

    /// Builder that publishes every declared handle of its unit.
    fn publish_declared(catalog: &Catalog, unit: &str) -> impl UnitBuilder + 'static {
        let produces = catalog.get(unit).unwrap().produces.clone();
        let unit = unit.to_string();
        FnBuilder::new(move |_req| {
            Ok(produces
                .iter()
                .map(|h| (h.clone(), ResourceHandle::new(h.as_str(), format!("{unit}-{h}"))))
                .collect())
        })
    }

    fn registry_for(catalog: &Catalog) -> BuilderRegistry {
        let mut registry = BuilderRegistry::new();
        for unit in catalog.units() {
            registry.register(&unit.name, publish_declared(catalog, &unit.name));
        }
        registry
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<RunState>,
        started: Vec<String>,
        completed: Vec<String>,
        failed: Vec<String>,
        run_failed: bool,
    }

    impl RunObserver for Recorder {
        fn state_changed(&mut self, state: &RunState) {
            self.states.push(state.clone());
        }
        fn unit_started(&mut self, unit: &str) {
            self.started.push(unit.to_string());
        }
        fn unit_completed(&mut self, unit: &str, _handles: &HandleMap, _d: f64) {
            self.completed.push(unit.to_string());
        }
        fn unit_failed(&mut self, unit: &str, _error: &StackError) {
            self.failed.push(unit.to_string());
        }
        fn run_failed(&mut self, _failure: &RunFailure) {
            self.run_failed = true;
        }
    }

    #[test]
    fn test_sp006_run_all_units() {
        let catalog = Catalog::standard().unwrap();
        let registry = registry_for(&catalog);
        let outcome = Orchestrator::new(&catalog, &registry)
            .run(&config_with(&Category::ALL))
            .unwrap();
        assert_eq!(outcome.plan.len(), 7);
        assert_eq!(outcome.handles.len(), 7);
        assert_eq!(outcome.handles["database"]["endpoint"].id(), "database-endpoint");
        assert!(outcome.config_hash.starts_with("blake3:"));
    }

    #[test]
    fn test_sp006_state_machine_sequence() {
        let catalog = Catalog::standard().unwrap();
        let registry = registry_for(&catalog);
        let mut recorder = Recorder::default();
        Orchestrator::new(&catalog, &registry)
            .run_observed(&config_with(&[Category::Network, Category::Database]), &mut recorder)
            .unwrap();
        assert_eq!(
            recorder.states,
            vec![
                RunState::Planning,
                RunState::Executing {
                    index: 0,
                    unit: "network".into()
                },
                RunState::Executing {
                    index: 1,
                    unit: "database".into()
                },
                RunState::Completed,
            ]
        );
    }

    #[test]
    fn test_sp006_dependent_receives_dependency_handle() {
        let catalog = Catalog::standard().unwrap();
        let seen: Arc<Mutex<Option<ResourceHandle>>> = Arc::new(Mutex::new(None));
        let mut registry = registry_for(&catalog);
        let sink = Arc::clone(&seen);
        registry.register_fn("database", move |req| {
            let sg = req.inputs.require("network", "security_group")?;
            *sink.lock().unwrap() = Some(sg.clone());
            let mut out = HandleMap::new();
            for h in ["cluster", "endpoint", "secret"] {
                out.insert(h.into(), ResourceHandle::new(h, h));
            }
            Ok(out)
        });

        let outcome = Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[Category::Network, Category::Database]))
            .unwrap();
        let published = &outcome.handles["network"]["security_group"];
        let received = seen.lock().unwrap().clone().unwrap();
        assert!(received.same_as(published));
    }

    #[test]
    fn test_sp006_optional_inputs_absent_when_disabled() {
        let catalog = Catalog::standard().unwrap();
        let mut registry = registry_for(&catalog);
        registry.register_fn("compute", |req| {
            assert!(req.inputs.get("database", "endpoint").is_none());
            assert!(req.inputs.get("network", "vpc").is_some());
            assert_eq!(req.inputs.len(), 2);
            Ok(["cluster", "service", "load_balancer"]
                .iter()
                .map(|h| (h.to_string(), ResourceHandle::new(*h, *h)))
                .collect())
        });
        Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[Category::Network, Category::Compute]))
            .unwrap();
    }

    #[test]
    fn test_sp006_builder_receives_category_config() {
        let catalog = Catalog::standard().unwrap();
        let mut registry = registry_for(&catalog);
        registry.register_fn("storage", |req| {
            assert!(req.enabled);
            assert_eq!(req.stack.resource_name("assets"), "test-dev-assets");
            match req.config {
                CategoryConfig::Storage(s) => assert!(s.versioned),
                other => panic!("wrong subtree: {other:?}"),
            }
            Ok(HandleMap::from([(
                "bucket".to_string(),
                ResourceHandle::new("bucket", "b"),
            )]))
        });
        Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[Category::Storage]))
            .unwrap();
    }

    #[test]
    fn test_sp006_planning_failure_builds_nothing() {
        let catalog = Catalog::standard().unwrap();
        let registry = registry_for(&catalog);
        let mut recorder = Recorder::default();
        let failure = Orchestrator::new(&catalog, &registry)
            .run_observed(&config_with(&[Category::Database]), &mut recorder)
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Planning);
        assert_eq!(failure.unit.as_deref(), Some("database"));
        assert!(failure.completed.is_empty());
        assert!(matches!(
            failure.error,
            StackError::DependencyUnsatisfied { ref unit, ref dependency }
                if unit == "database" && dependency == "network"
        ));
        assert!(recorder.started.is_empty());
        assert!(recorder.run_failed);
        assert_eq!(
            recorder.states.last(),
            Some(&RunState::Failed(RunStage::Planning))
        );
    }

    fn four_unit_catalog() -> Catalog {
        Catalog::new(vec![
            UnitDescriptor::new("a", Category::Network).produces(&["out"]),
            UnitDescriptor::new("b", Category::Network)
                .depends_on("a")
                .requires("a", &["out"])
                .produces(&["out"]),
            UnitDescriptor::new("c", Category::Network)
                .depends_on("b")
                .produces(&["out"]),
            UnitDescriptor::new("d", Category::Network).depends_on("c"),
        ])
        .unwrap()
    }

    #[test]
    fn test_sp006_third_unit_fails() {
        let catalog = four_unit_catalog();
        let mut registry = registry_for(&catalog);
        registry.register_fn("c", |_req| Err(anyhow::anyhow!("quota exceeded")));
        let mut recorder = Recorder::default();

        let failure = Orchestrator::new(&catalog, &registry)
            .run_observed(&config_with(&[Category::Network]), &mut recorder)
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Executing);
        assert_eq!(failure.unit.as_deref(), Some("c"));
        assert_eq!(failure.completed, vec!["a", "b"]);
        match failure.error {
            StackError::UnitBuildFailure { unit, source } => {
                assert_eq!(unit, "c");
                assert_eq!(source.to_string(), "quota exceeded");
            }
            other => panic!("expected UnitBuildFailure, got {other:?}"),
        }
        assert_eq!(recorder.failed, vec!["c"]);
        assert_eq!(recorder.started, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sp006_missing_declared_output() {
        let catalog = four_unit_catalog();
        let mut registry = registry_for(&catalog);
        registry.register_fn("a", |_req| Ok(HandleMap::new()));
        let failure = Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[Category::Network]))
            .unwrap_err();
        assert_eq!(failure.unit.as_deref(), Some("a"));
        assert!(matches!(
            failure.error,
            StackError::MissingHandle { ref unit, ref handle } if unit == "a" && handle == "out"
        ));
    }

    #[test]
    fn test_sp006_missing_builder() {
        let catalog = four_unit_catalog();
        let mut registry = BuilderRegistry::new();
        registry.register("a", publish_declared(&catalog, "a"));
        let failure = Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[Category::Network]))
            .unwrap_err();
        assert_eq!(failure.completed, vec!["a"]);
        assert!(matches!(failure.error, StackError::MissingBuilder(ref u) if u == "b"));
    }

    #[test]
    fn test_sp006_enablement_drift_is_invariant_violation() {
        // Predicate flips after the first evaluation, as if configuration drifted
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let catalog = Catalog::new(vec![UnitDescriptor::new("flaky", Category::Network)
            .enabled_when(move |_| counter.fetch_add(1, Ordering::SeqCst) == 0)])
        .unwrap();
        let mut registry = BuilderRegistry::new();
        registry.register_fn("flaky", |_req| Ok(HandleMap::new()));
        let failure = Orchestrator::new(&catalog, &registry)
            .run(&StackConfig::named("x"))
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Executing);
        assert!(matches!(failure.error, StackError::InvariantViolation(_)));
    }

    #[test]
    fn test_sp006_cancel_between_units() {
        let catalog = four_unit_catalog();
        let token = CancelToken::new();
        let mut registry = registry_for(&catalog);
        let trigger = token.clone();
        registry.register_fn("b", move |_req| {
            trigger.cancel();
            Ok(HandleMap::from([(
                "out".to_string(),
                ResourceHandle::new("out", "b"),
            )]))
        });
        let failure = Orchestrator::new(&catalog, &registry)
            .with_cancel(token)
            .run(&config_with(&[Category::Network]))
            .unwrap_err();
        assert_eq!(failure.stage, RunStage::Cancelled);
        assert_eq!(failure.completed, vec!["a", "b"]);
        assert_eq!(failure.unit.as_deref(), Some("c"));
        assert!(matches!(failure.error, StackError::Cancelled));
    }

    #[test]
    fn test_sp006_parallel_matches_sequential() {
        let catalog = Catalog::standard().unwrap();
        let registry = registry_for(&catalog);
        let config = config_with(&Category::ALL);
        let seq = Orchestrator::new(&catalog, &registry).run(&config).unwrap();
        let par = Orchestrator::new(&catalog, &registry)
            .parallel(true)
            .run(&config)
            .unwrap();
        assert_eq!(seq.plan, par.plan);
        for (unit, handles) in &seq.handles {
            assert_eq!(handles, &par.handles[unit]);
        }
    }

    #[test]
    fn test_sp006_parallel_wave_failure_records_siblings() {
        let catalog = Catalog::standard().unwrap();
        let mut registry = registry_for(&catalog);
        registry.register_fn("storage", |_req| Err(anyhow::anyhow!("bucket name taken")));
        let failure = Orchestrator::new(&catalog, &registry)
            .parallel(true)
            .run(&config_with(&[Category::Network, Category::Storage, Category::Auth]))
            .unwrap_err();
        assert_eq!(failure.unit.as_deref(), Some("storage"));
        assert_eq!(failure.completed, vec!["network", "auth"]);
    }

    #[test]
    fn test_sp006_parallel_prepare_failure_starts_nothing() {
        let catalog = Catalog::standard().unwrap();
        let mut registry = BuilderRegistry::new();
        for unit in ["network", "storage"] {
            registry.register(unit, publish_declared(&catalog, unit));
        }
        let mut recorder = Recorder::default();
        let failure = Orchestrator::new(&catalog, &registry)
            .parallel(true)
            .run_observed(
                &config_with(&[Category::Network, Category::Storage, Category::Auth]),
                &mut recorder,
            )
            .unwrap_err();
        assert_eq!(failure.unit.as_deref(), Some("auth"));
        assert!(matches!(failure.error, StackError::MissingBuilder(ref u) if u == "auth"));
        assert!(failure.completed.is_empty());
        assert!(recorder.started.is_empty());
        assert!(recorder.completed.is_empty());
        assert_eq!(recorder.failed, vec!["auth"]);
    }

    #[test]
    fn test_sp006_parallel_durations_are_per_unit() {
        let catalog = Catalog::new(vec![
            UnitDescriptor::new("fast", Category::Network),
            UnitDescriptor::new("slow", Category::Network),
        ])
        .unwrap();
        let mut registry = BuilderRegistry::new();
        registry.register_fn("fast", |_req| Ok(HandleMap::new()));
        registry.register_fn("slow", |_req| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(HandleMap::new())
        });
        let outcome = Orchestrator::new(&catalog, &registry)
            .parallel(true)
            .run(&config_with(&[Category::Network]))
            .unwrap();
        assert_eq!(outcome.plan.waves.len(), 1);
        assert!(outcome.durations["slow"] >= 0.05);
        assert!(outcome.durations["fast"] < outcome.durations["slow"]);
    }

    #[test]
    fn test_sp006_wave_rejects_dependent_pair() {
        let catalog = four_unit_catalog();
        let config = config_with(&[Category::Network]);
        let plan = resolver::build_execution_plan(&catalog, &config).unwrap();
        let ok = vec!["a".to_string()];
        assert!(check_wave_independent(&catalog, &plan, &ok).is_ok());

        let bad = vec!["a".to_string(), "c".to_string()];
        match check_wave_independent(&catalog, &plan, &bad) {
            Err(StackError::InvariantViolation(msg)) => {
                assert!(msg.contains("'a' and 'c'"), "{msg}");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_sp006_wave_ignores_paths_through_absent_units() {
        let catalog = Catalog::new(vec![
            UnitDescriptor::new("base", Category::Network),
            UnitDescriptor::new("middle", Category::Storage).depends_on("base"),
            UnitDescriptor::new("top", Category::Network).optionally_after("middle"),
        ])
        .unwrap();
        let registry = registry_for(&catalog);
        let outcome = Orchestrator::new(&catalog, &registry)
            .parallel(true)
            .run(&config_with(&[Category::Network]))
            .unwrap();
        assert_eq!(outcome.plan.waves, vec![vec!["base".to_string(), "top".to_string()]]);
    }

    #[test]
    fn test_sp006_empty_plan_completes() {
        let catalog = Catalog::standard().unwrap();
        let registry = BuilderRegistry::new();
        let outcome = Orchestrator::new(&catalog, &registry)
            .run(&config_with(&[]))
            .unwrap();
        assert!(outcome.plan.is_empty());
        assert!(outcome.handles.is_empty());
    }
}
