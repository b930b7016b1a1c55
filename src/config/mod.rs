//! Simulation configuration.
//!
//! Every tunable of the engine is a public field on [`Parameters`] so an
//! external loader can set it before the first iteration.

pub mod parameters;

pub use parameters::Parameters;
