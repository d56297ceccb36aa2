//! End-to-end scenarios over the standard catalog and custom tables.

use stackplan::core::catalog::{Catalog, UnitDescriptor};
use stackplan::core::error::{RunStage, StackError};
use stackplan::core::executor::{BuilderRegistry, Orchestrator};
use stackplan::core::resolver;
use stackplan::core::types::{Category, HandleMap, ResourceHandle, StackConfig};
use stackplan::units;
use std::sync::{Arc, Mutex};

fn only(categories: &[Category]) -> StackConfig {
    let mut config = StackConfig::named("scenario");
    for category in Category::ALL {
        config.set_enabled(category, categories.contains(&category));
    }
    config
}

#[test]
fn network_and_storage_are_independent() {
    let catalog = Catalog::standard().unwrap();
    let config = only(&[Category::Network, Category::Storage]);
    let plan = resolver::build_execution_plan(&catalog, &config).unwrap();

    let mut sorted = plan.order.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["network", "storage"]);
    assert!(plan.edges.is_empty());
    assert_eq!(plan.waves.len(), 1);
}

#[test]
fn database_runs_after_network_and_receives_its_handle() {
    let catalog = Catalog::standard().unwrap();
    let config = only(&[Category::Network, Category::Database]);

    let produced: Arc<Mutex<Option<ResourceHandle>>> = Arc::default();
    let received: Arc<Mutex<Option<ResourceHandle>>> = Arc::default();

    let mut registry = units::simulated_registry();
    {
        let produced = Arc::clone(&produced);
        registry.register_fn("network", move |req| {
            let handles = units::network::build(req)?;
            *produced.lock().unwrap() = Some(handles["security_group"].clone());
            Ok(handles)
        });
    }
    {
        let received = Arc::clone(&received);
        registry.register_fn("database", move |req| {
            let sg = req.inputs.require("network", "security_group")?;
            *received.lock().unwrap() = Some(sg.clone());
            units::database::build(req)
        });
    }

    let outcome = Orchestrator::new(&catalog, &registry).run(&config).unwrap();
    assert_eq!(outcome.plan.order, vec!["network", "database"]);

    let produced = produced.lock().unwrap().clone().unwrap();
    let received = received.lock().unwrap().clone().unwrap();
    assert!(received.same_as(&produced));
    assert!(outcome.handles["network"]["security_group"].same_as(&produced));
}

#[test]
fn database_alone_fails_before_building_anything() {
    let catalog = Catalog::standard().unwrap();
    let config = only(&[Category::Database]);

    let calls = Arc::new(Mutex::new(0u32));
    let mut registry = BuilderRegistry::new();
    for unit in catalog.units() {
        let calls = Arc::clone(&calls);
        registry.register_fn(&unit.name, move |_req| {
            *calls.lock().unwrap() += 1;
            Ok(HandleMap::new())
        });
    }

    let failure = Orchestrator::new(&catalog, &registry)
        .run(&config)
        .unwrap_err();
    assert_eq!(failure.stage, RunStage::Planning);
    match &failure.error {
        StackError::DependencyUnsatisfied { unit, dependency } => {
            assert_eq!(unit, "database");
            assert_eq!(dependency, "network");
        }
        other => panic!("expected DependencyUnsatisfied, got {other:?}"),
    }
    assert!(failure.completed.is_empty());
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn third_of_four_failing_reports_two_completed() {
    let catalog = Catalog::new(vec![
        UnitDescriptor::new("edge", Category::Network),
        UnitDescriptor::new("cache", Category::Network).depends_on("edge"),
        UnitDescriptor::new("queue", Category::Network).depends_on("cache"),
        UnitDescriptor::new("worker", Category::Network).depends_on("queue"),
    ])
    .unwrap();
    let mut config = StackConfig::named("scenario");
    config.network.enabled = true;

    let mut registry = BuilderRegistry::new();
    for name in ["edge", "cache", "worker"] {
        registry.register_fn(name, |_req| Ok(HandleMap::new()));
    }
    registry.register_fn("queue", |_req| Err(anyhow::anyhow!("quota exceeded")));

    let failure = Orchestrator::new(&catalog, &registry)
        .run(&config)
        .unwrap_err();
    assert_eq!(failure.stage, RunStage::Executing);
    assert_eq!(failure.unit.as_deref(), Some("queue"));
    assert_eq!(failure.completed, vec!["edge", "cache"]);
    match &failure.error {
        StackError::UnitBuildFailure { unit, source } => {
            assert_eq!(unit, "queue");
            assert!(source.to_string().contains("quota exceeded"));
        }
        other => panic!("expected UnitBuildFailure, got {other:?}"),
    }
}

#[test]
fn full_stack_plan_and_wiring() {
    let catalog = Catalog::standard().unwrap();
    let config = only(&Category::ALL);
    let registry = units::simulated_registry();

    let outcome = Orchestrator::new(&catalog, &registry)
        .parallel(true)
        .run(&config)
        .unwrap();
    assert_eq!(
        outcome.plan.order,
        vec!["network", "storage", "auth", "database", "compute", "serverless", "monitoring"]
    );

    let function = outcome.handles["serverless"]["function"].value();
    assert_eq!(function.attributes["bucket"], outcome.handles["storage"]["bucket"].id());
    assert_eq!(function.attributes["vpc"], outcome.handles["network"]["vpc"].id());
    let api = outcome.handles["serverless"]["api"].value();
    assert_eq!(api.attributes["authorizer"], outcome.handles["auth"]["user_pool"].id());
}

#[test]
fn monitoring_is_on_by_default() {
    let catalog = Catalog::standard().unwrap();
    let plan = resolver::build_execution_plan(&catalog, &StackConfig::named("bare")).unwrap();
    assert_eq!(plan.order, vec!["monitoring"]);
}
