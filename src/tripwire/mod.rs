//! Tripwire: provenance tracing and BLAKE3 fingerprints.

pub mod eventlog;
pub mod hasher;
