//! Cellchain - ball-and-spring microbial cell mechanics engine
//!
//! Cells are spheres (one ball) or rods (two balls joined by a spring) that
//! grow, divide and interact through contact forces, adhesive stick springs,
//! filament chains and substratum anchors. Mechanics relax between growth
//! steps by integrating the damped Newtonian equations of motion with an
//! adaptive high-order Runge-Kutta solver.

pub mod bonds;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod growth;
pub mod model;
pub mod physics;
pub mod simulation;

pub use config::Parameters;
pub use error::SimError;
pub use export::{CheckpointSink, JsonSink, NullSink};
pub use growth::{FluxCollaborator, GrowthMethod};
pub use model::{Ball, Cell, Model, Shape};
pub use simulation::Simulation;
