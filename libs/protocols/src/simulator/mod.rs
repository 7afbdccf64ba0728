//! Simulators used to test protocols.
//!
//! Simulators must only be used for tests. Do not include in anything that is not a test.

pub mod symmetric;
