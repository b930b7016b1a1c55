//! Point masses: the unit that collides and integrates.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::Parameters;
use crate::model::Shape;

/// A ball: point mass with radius, velocity and accumulated force.
///
/// The radius is derived from the chemical amount `n` and the owning cell's
/// species; it is recomputed whenever `n` changes and never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    /// Position [m].
    pub pos: DVec3,
    /// Velocity [m s^-1].
    pub vel: DVec3,
    /// Accumulated force [N]; scratch space for the force evaluation.
    pub force: DVec3,
    /// Chemical amount [Cmol].
    pub n: f64,
    /// Radius [m], derived from `n`.
    pub radius: f64,
    /// Index of the owning cell.
    pub cell: usize,
}

impl Ball {
    /// Mass of the ball [kg].
    pub fn mass(&self, params: &Parameters) -> f64 {
        self.n * params.mw_x
    }
}

/// Radius of a ball holding amount `n` [Cmol] for the given species.
///
/// Spheres derive the radius from the ball volume alone. Variable-radius rods
/// spread the volume over a sphero-cylinder at the species' aspect ratio, so
/// the radius grows with mass. Fixed-radius rods keep the radius at its
/// maximum (plus the per-cell modifier) and grow in length instead.
pub fn ball_radius(params: &Parameters, species: usize, n: f64, radius_modifier: f64) -> f64 {
    use std::f64::consts::PI;
    let mw = params.mw_x;
    let rho = params.rho_x;
    match params.shape[species] {
        Shape::Sphere => (n * mw / (PI * rho * 4.0 / 3.0)).cbrt(),
        Shape::RodVariable => {
            let aspect = params.aspect(species);
            // Ball amount is half the cell amount for a rod.
            (2.0 * n * mw / (PI * rho * (aspect + 4.0 / 3.0))).cbrt()
        }
        Shape::RodFixed => {
            let aspect = params.aspect(species);
            (params.n_cell_max(species) * mw / (PI * rho * (aspect + 4.0 / 3.0))).cbrt()
                + radius_modifier
        }
    }
}
