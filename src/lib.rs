//! stackplan: declarative infrastructure stack orchestration.
//!
//! One configuration decides which units exist. The planner orders them,
//! the binder threads each unit's handles into its dependents, and the
//! orchestrator drives the run. BLAKE3 fingerprints and a JSONL event log
//! record what happened.

pub mod cli;
pub mod core;
pub mod tripwire;
pub mod units;
