//! Mock kstat registry for testing.
//!
//! This module provides `MockKstat` and pre-built scenarios for exercising
//! the chain tracker, decoders and reader without an illumos kernel.

mod registry;
mod scenarios;

pub use registry::{MockIo, MockKstat, MockTimer};
pub use scenarios::{TYPICAL_NCPUS, cpu_sys_fields, cpu_vm_fields};
