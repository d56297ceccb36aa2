//! SP-011: CLI subcommands: init, validate, catalog, plan, apply, status, graph, schema.

use crate::core::apply::{self, ApplyConfig};
use crate::core::catalog::{Catalog, DependencyKind};
use crate::core::planner::{self, PlanReport};
use crate::core::types::{ExecutionPlan, StackConfig};
use crate::core::{parser, resolver, state};
use crate::tripwire::eventlog;
use crate::units;
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stack project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate stack.yaml and the unit catalog
    Validate {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,
    },

    /// List the unit catalog: dependencies, inputs, outputs
    Catalog,

    /// Show execution plan (order, waves, wiring, changes since last run)
    Plan {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every enabled unit with the simulated builders
    Apply {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,

        /// Build independent units of a wave concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Show the last recorded run from lock files
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Target specific stack
        #[arg(short, long)]
        stack: Option<String>,
    },

    /// Emit the enabled-unit graph
    Graph {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },

    /// Print the JSON schema of stack.yaml
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}

/// Dispatch a CLI command. Completions are generated by the binary, which
/// owns the top-level command definition.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Catalog => cmd_catalog(),
        Commands::Plan {
            file,
            state_dir,
            json,
        } => cmd_plan(&file, &state_dir, json),
        Commands::Apply {
            file,
            state_dir,
            dry_run,
            parallel,
        } => cmd_apply(&file, &state_dir, dry_run, parallel),
        Commands::Status { state_dir, stack } => cmd_status(&state_dir, stack.as_deref()),
        Commands::Graph { file, format } => cmd_graph(&file, format),
        Commands::Schema => cmd_schema(),
        Commands::Completions { .. } => {
            Err("completions are generated by the stackplan binary".to_string())
        }
    }
}

const TEMPLATE: &str = r#"version: "1.0"
name: my-stack
description: "Managed by stackplan"
environment: dev
region: us-east-1

network:
  enabled: true
  cidr: 10.0.0.0/16

storage:
  enabled: true

database:
  enabled: false

auth:
  enabled: false

compute:
  enabled: true
  image: nginx:latest

serverless:
  enabled: false

monitoring:
  enabled: true

policy:
  parallel: false
  event_log: true
  lock_file: true
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("stack.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;
    std::fs::write(&config_path, TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized stackplan project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let mut config = parser::parse_config_file(file).map_err(|e| e.to_string())?;
    parser::apply_env_overrides(&mut config, std::env::vars()).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let catalog = Catalog::standard().map_err(|e| e.to_string())?;
    let plan = resolver::build_execution_plan(&catalog, &config).map_err(|e| e.to_string())?;
    println!(
        "OK: {} ({} of {} units enabled, {} waves)",
        config.name,
        plan.len(),
        catalog.len(),
        plan.waves.len()
    );
    Ok(())
}

fn cmd_catalog() -> Result<(), String> {
    let catalog = Catalog::standard().map_err(|e| e.to_string())?;
    for unit in catalog.units() {
        println!("{} [{}]", unit.name, unit.category);
        for dep in &unit.depends_on {
            let marker = match dep.kind {
                DependencyKind::Required => "",
                DependencyKind::Optional => " (optional)",
            };
            println!("  after:    {}{}", dep.unit, marker);
        }
        for input in &unit.requires {
            println!("  input:    {}", input);
        }
        println!("  produces: {}", unit.produces.join(", "));
    }
    Ok(())
}

/// Load config with env overrides and validation; the catalog and plan too.
fn load_planned(file: &Path) -> Result<(StackConfig, Catalog, ExecutionPlan), String> {
    let config = parser::load_config(file, std::env::vars()).map_err(|e| e.to_string())?;
    let catalog = Catalog::standard().map_err(|e| e.to_string())?;
    let plan = resolver::build_execution_plan(&catalog, &config).map_err(|e| e.to_string())?;
    Ok((config, catalog, plan))
}

fn cmd_plan(file: &Path, state_dir: &Path, json: bool) -> Result<(), String> {
    let (config, catalog, plan) = load_planned(file)?;
    let previous = state::load_lock(state_dir, &config.name).map_err(|e| e.to_string())?;
    let report = planner::plan(&catalog, &config, &plan, previous.as_ref());

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
    } else {
        print_plan(&report);
    }
    Ok(())
}

/// Display a plan report to stdout.
fn print_plan(report: &PlanReport) {
    println!("Planning: {} ({} units)", report.stack, report.units.len());
    println!();

    let mut current_wave = usize::MAX;
    for unit in &report.units {
        if unit.wave != current_wave {
            current_wave = unit.wave;
            println!("wave {}:", current_wave);
        }
        println!("  {} {}", unit.change, unit.description);
        for input in &unit.inputs {
            println!("      <- {}", input);
        }
    }
    for unit in &report.destroy {
        println!("  - {}: destroy", unit);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        report.to_create, report.to_update, report.to_destroy, report.unchanged
    );
}

fn cmd_apply(file: &Path, state_dir: &Path, dry_run: bool, parallel: bool) -> Result<(), String> {
    let config = parser::load_config(file, std::env::vars()).map_err(|e| e.to_string())?;
    let catalog = Catalog::standard().map_err(|e| e.to_string())?;
    let builders = units::simulated_registry();

    let cfg = ApplyConfig {
        config: &config,
        catalog: &catalog,
        builders: &builders,
        state_dir,
        dry_run,
        parallel: parallel.then_some(true),
        cancel: None,
    };

    let result = match apply::apply(&cfg) {
        Ok(result) => result,
        Err(failure) => {
            if !failure.completed.is_empty() {
                eprintln!("Completed before failure: {}", failure.completed.join(", "));
            }
            return Err(failure.to_string());
        }
    };

    if dry_run {
        print_plan(&result.report);
        println!("Dry run: no changes applied.");
        return Ok(());
    }

    if let Some(outcome) = &result.outcome {
        for (unit, handles) in &outcome.handles {
            let duration = outcome
                .durations
                .get(unit)
                .map(|d| format!(" ({:.3}s)", d))
                .unwrap_or_default();
            println!("{}: {} handle(s){}", unit, handles.len(), duration);
        }
    }
    println!();
    println!(
        "Apply complete: run {} built {} unit(s) in {:.1}s.",
        result.run_id,
        result.report.units.len(),
        result.total_duration.as_secs_f64()
    );
    if let Some(path) = &result.lock_path {
        println!("  Lock: {}", path.display());
    }
    Ok(())
}

fn cmd_status(state_dir: &Path, stack_filter: Option<&str>) -> Result<(), String> {
    let entries = std::fs::read_dir(state_dir)
        .map_err(|e| format!("cannot read state dir {}: {}", state_dir.display(), e))?;

    let mut found = false;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(filter) = stack_filter {
            if name != filter {
                continue;
            }
        }

        if !entry.path().is_dir() {
            continue;
        }

        if let Some(lock) = state::load_lock(state_dir, &name).map_err(|e| e.to_string())? {
            found = true;
            let events = eventlog::read_events(state_dir, &name)?;
            println!("Stack: {} (run {})", lock.stack, lock.run_id);
            println!("  Generated: {}", lock.generated_at);
            println!("  Generator: {}", lock.generator);
            println!("  Config:    {}", lock.config_hash);
            println!("  Events:    {}", events.len());
            println!("  Units:     {}", lock.units.len());

            for (unit, ul) in &lock.units {
                let duration = ul
                    .duration_seconds
                    .map(|d| format!(" ({:.3}s)", d))
                    .unwrap_or_default();
                println!("    {}: [{}] {} handle(s){}", unit, ul.category, ul.handles.len(), duration);
                for (handle, value) in &ul.handles {
                    println!("      {} = {}", handle, value.id());
                }
            }
            println!();
        }
    }

    if !found {
        println!("No state found. Run `stackplan apply` first.");
    }

    Ok(())
}

fn cmd_graph(file: &Path, format: GraphFormat) -> Result<(), String> {
    let (_, catalog, plan) = load_planned(file)?;
    let rendered = match format {
        GraphFormat::Mermaid => render_mermaid(&catalog, &plan),
        GraphFormat::Dot => render_dot(&catalog, &plan),
    };
    print!("{}", rendered);
    Ok(())
}

/// Handles wired along one edge, e.g. `vpc, security_group`.
fn edge_label(catalog: &Catalog, plan: &ExecutionPlan, before: &str, after: &str) -> String {
    catalog
        .get(after)
        .map(|unit| {
            unit.bound_requirements(|dep| plan.contains(dep))
                .into_iter()
                .filter(|r| r.unit == before)
                .map(|r| r.handle)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn render_mermaid(catalog: &Catalog, plan: &ExecutionPlan) -> String {
    let mut out = String::from("graph TD\n");
    for unit in &plan.order {
        out.push_str(&format!("    {}\n", unit));
    }
    for edge in &plan.edges {
        let label = edge_label(catalog, plan, &edge.before, &edge.after);
        if label.is_empty() {
            out.push_str(&format!("    {} --> {}\n", edge.before, edge.after));
        } else {
            out.push_str(&format!("    {} -->|{}| {}\n", edge.before, label, edge.after));
        }
    }
    out
}

fn render_dot(catalog: &Catalog, plan: &ExecutionPlan) -> String {
    let mut out = String::from("digraph stack {\n    rankdir=LR;\n");
    for unit in &plan.order {
        out.push_str(&format!("    \"{}\";\n", unit));
    }
    for edge in &plan.edges {
        let label = edge_label(catalog, plan, &edge.before, &edge.after);
        out.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
            edge.before, edge.after, label
        ));
    }
    out.push_str("}\n");
    out
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(StackConfig);
    let out = serde_json::to_string_pretty(&schema)
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    println!("{}", out);
    Ok(())
}
