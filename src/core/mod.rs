//! Core orchestration logic: configuration, catalog, planning, binding, execution.

pub mod apply;
pub mod binder;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod types;
