//! Benchmarks for stackplan core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stackplan::core::catalog::{Catalog, UnitDescriptor};
use stackplan::core::executor::Orchestrator;
use stackplan::core::resolver;
use stackplan::core::types::{Category, StackConfig};
use stackplan::tripwire::hasher;
use stackplan::units;

fn everything() -> StackConfig {
    let mut config = StackConfig::named("bench");
    for category in Category::ALL {
        config.set_enabled(category, true);
    }
    config
}

/// A layered catalog: each unit depends on up to three units of the layer above.
fn layered_catalog(n: usize) -> Catalog {
    let width = 8;
    let units = (0..n)
        .map(|i| {
            let mut unit = UnitDescriptor::new(&format!("unit-{i:04}"), Category::Network);
            if i >= width {
                let layer_start = (i / width - 1) * width;
                for j in 0..3 {
                    unit = unit.depends_on(&format!("unit-{:04}", layer_start + (i + j) % width));
                }
            }
            unit
        })
        .collect();
    Catalog::new(units).unwrap()
}

fn bench_hash_config(c: &mut Criterion) {
    let config = everything();
    c.bench_function("hash_config", |b| {
        b.iter(|| black_box(hasher::hash_config(black_box(&config))));
    });
}

fn bench_yaml_parse(c: &mut Criterion) {
    let yaml = r#"
version: "1.0"
name: bench-stack
environment: prod
region: eu-west-1
tags:
  team: platform
  cost-center: "1234"
network:
  enabled: true
  cidr: 10.1.0.0/16
  max_azs: 3
  nat_gateways: 3
storage:
  enabled: true
  bucket_prefix: media
database:
  enabled: true
  multi_az: true
compute:
  enabled: true
  cpu: 512
  memory_mib: 1024
  desired_count: 3
serverless:
  enabled: true
monitoring:
  alarm_email: ops@example.com
"#;

    c.bench_function("yaml_parse_config", |b| {
        b.iter(|| {
            let config = stackplan::core::parser::parse_config(black_box(yaml)).unwrap();
            black_box(config);
        });
    });
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_execution_plan");
    let mut network_on = StackConfig::named("bench");
    network_on.network.enabled = true;
    for n in [10, 100, 1000] {
        let catalog = layered_catalog(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &catalog, |b, catalog| {
            b.iter(|| black_box(resolver::build_execution_plan(catalog, &network_on).unwrap()));
        });
    }
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let catalog = Catalog::standard().unwrap();
    let builders = units::simulated_registry();
    let config = everything();
    let mut group = c.benchmark_group("orchestrator_run");
    for parallel in [false, true] {
        let orchestrator = Orchestrator::new(&catalog, &builders).parallel(parallel);
        group.bench_with_input(BenchmarkId::from_parameter(parallel), &config, |b, config| {
            b.iter(|| black_box(orchestrator.run(config).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hash_config, bench_yaml_parse, bench_plan, bench_run);
criterion_main!(benches);
