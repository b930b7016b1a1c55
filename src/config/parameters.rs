//! Flat parameter set for the cell mechanics engine.
//!
//! All values are SI: metres, seconds, moles, kilograms. Spring constants are
//! specific stiffnesses that get scaled by ball mass (in Cmol) when a spring
//! is built, so cells of very different size relax on comparable time scales.

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::growth::GrowthMethod;
use crate::model::Shape;

/// Top-level parameter container.
///
/// Per-species values are parallel vectors indexed by the cell's species
/// index; [`Parameters::validate`] checks they agree in length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    /// Run name, used as the output directory.
    pub name: String,
    /// Base seed; growth and relaxation reseed deterministically from this.
    pub random_seed: u64,

    // === Feature switches ===
    /// Allow stick spring formation between colliding cells.
    pub sticking: bool,
    /// Allow cells near the floor to anchor to the substratum.
    pub anchoring: bool,
    /// Allow filament spring formation at division.
    pub filament: bool,
    /// Apply buoyancy-corrected gravity along -y.
    pub gravity: bool,
    /// Apply gravity along z instead of y (no floor interaction).
    pub gravity_z: bool,
    /// Apply the substratum normal force at y = 0.
    pub normal_force: bool,
    /// Keep growing even while cells overlap after relaxation.
    pub allow_overlap_during_growth: bool,
    /// Place initial cells resting on the substratum.
    pub initial_at_substratum: bool,
    /// Transfer the straight filament chain through dividing spheres.
    pub fil_sphere_straight: bool,

    // === Spring constants (specific, scaled by ball amount) ===
    /// Collision stiffness.
    pub kc: f64,
    /// Substratum (wall) stiffness.
    pub kw: f64,
    /// Internal rod spring stiffness.
    pub kr: f64,
    /// Filament spring stiffness.
    pub kf: f64,
    /// Anchor spring stiffness.
    pub kan: f64,
    /// Stick spring stiffness.
    pub ks: f64,
    /// Drag coefficient.
    pub kd: f64,

    // === Bond thresholds ===
    /// Anchor break band: extension outside `[lo, hi] * rest` breaks.
    pub stretch_lim_anchor: [f64; 2],
    /// Anchor formation factor on ball radius.
    pub form_lim_anchor: f64,
    /// Stick break band.
    pub stretch_lim_stick: [f64; 2],
    /// Stick formation factor on the sum of radii.
    pub form_lim_stick: f64,
    /// Filament break band.
    pub stretch_lim_fil: [f64; 2],
    /// Sphere filament rest length factor on the sum of radii.
    pub fil_length_sphere: f64,
    /// Rod filament rest length factors: `[short, long]`.
    pub fil_length_rod: [f64; 2],
    /// Probability that a dividing rod filament branches.
    pub fil_branch_frequency: f64,
    /// Collision over-push factor; slightly above 1 so contacts do not stall
    /// asymptotically at exact touching. Empirical, kept configurable.
    pub overpush: f64,

    // === Domain and material ===
    /// Acceleration due to gravity [m s^-2], negative is down.
    pub g: f64,
    /// Density of the bulk liquid [kg m^-3].
    pub rho_water: f64,
    /// Biomass density [kg m^-3].
    pub rho_x: f64,
    /// Biomass molar weight [kg mol^-1], composition CH1.8O0.5N0.2.
    pub mw_x: f64,
    /// Domain dimensions [m].
    pub domain: DVec3,
    /// Inner sub-domain for initial cell placement [m].
    pub domain_init: DVec3,

    // === Per-species arrays ===
    /// Shape class per species.
    pub shape: Vec<Shape>,
    /// Maximum ball radius per species [m].
    pub radius_cell_max: Vec<f64>,
    /// Maximum rod length per species [m] (zero for spheres).
    pub length_cell_max: Vec<f64>,
    /// Std dev of the per-cell radius modifier [m] (fixed-radius rods only).
    pub radius_cell_stdev: Vec<f64>,
    /// Whether cells of this species form filaments (gated by `filament`).
    pub fil_species: Vec<bool>,
    /// Biomass yield per flux reaction [Cmol X / mol reacted], flux growth.
    pub yield_coeff: Vec<f64>,

    // === Initial population ===
    /// Species drawn from (uniformly) when creating the initial population.
    pub init_species: Vec<usize>,
    /// Number of initial cells.
    pub n_init_cells: usize,

    // === Growth ===
    /// How cell amounts advance each growth iteration.
    pub growth_method: GrowthMethod,
    /// Uniform band for the simple stochastic growth factor per step.
    pub growth_factor_range: [f64; 2],
    /// Mass bonus factor when stuck to a cell of the other metabolic group.
    pub syntrophy_factor: f64,
    /// Growth time step [s].
    pub growth_time_step: f64,
    /// Growth iteration limit.
    pub growth_iter_max: u32,

    // === Relaxation / ODE ===
    /// Physical time relaxed per growth iteration [s].
    pub relaxation_time_step: f64,
    /// Time integrated per relaxation sub-iteration [s]; also the
    /// checkpoint cadence.
    pub relaxation_dt: f64,
    /// Absolute error tolerance.
    pub ode_atol: f64,
    /// Relative error tolerance.
    pub ode_rtol: f64,
    /// Initial step size guess [s].
    pub ode_h1: f64,
    /// Minimum step size floor [s].
    pub ode_hmin: f64,
    /// Hard cap on internal steps per integration call.
    pub ode_max_steps: usize,
    /// Step count above which the stiffness control is lowered.
    pub ode_step_warn: usize,
    /// Initial value of the step controller's beta (PI stabilisation).
    pub ode_beta: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            name: "default".into(),
            random_seed: 5,

            sticking: true,
            anchoring: false,
            filament: false,
            gravity: false,
            gravity_z: false,
            normal_force: true,
            allow_overlap_during_growth: false,
            initial_at_substratum: false,
            fil_sphere_straight: false,

            kc: 2e7,
            kw: 1e7,
            kr: 2.5e5,
            kf: 1e6,
            kan: 5e4,
            ks: 5e4,
            kd: 2.5e3,

            stretch_lim_anchor: [0.6, 1.4],
            form_lim_anchor: 1.1,
            stretch_lim_stick: [0.6, 1.4],
            form_lim_stick: 1.1,
            stretch_lim_fil: [0.4, 1.6],
            fil_length_sphere: 1.1,
            fil_length_rod: [1.1, 1.6],
            fil_branch_frequency: 0.1,
            overpush: 1.01,

            g: -9.8,
            rho_water: 1000.0,
            rho_x: 1010.0,
            mw_x: 24.6e-3,
            domain: DVec3::splat(20e-6),
            domain_init: DVec3::splat(4e-6),

            shape: vec![
                Shape::Sphere,
                Shape::Sphere,
                Shape::RodVariable,
                Shape::RodVariable,
                Shape::RodFixed,
                Shape::RodFixed,
            ],
            radius_cell_max: vec![0.3125e-6, 0.4375e-6, 0.25e-6, 0.35e-6, 0.25e-6, 0.35e-6],
            length_cell_max: vec![0.0, 0.0, 1.0e-6, 0.7e-6, 1.25e-6, 1.05e-6],
            radius_cell_stdev: vec![0.0; 6],
            fil_species: vec![true; 6],
            yield_coeff: vec![0.309, 0.309, 0.106, 0.106, 0.106, 0.106],

            init_species: vec![1, 5],
            n_init_cells: 6,

            growth_method: GrowthMethod::Simple,
            growth_factor_range: [0.95, 1.15],
            syntrophy_factor: 1.2,
            growth_time_step: 3600.0,
            growth_iter_max: 50,

            relaxation_time_step: 5e-4,
            relaxation_dt: 1e-4,
            ode_atol: 1e-6,
            ode_rtol: 1e-6,
            ode_h1: 1e-6,
            ode_hmin: 0.0,
            ode_max_steps: 50_000,
            ode_step_warn: 4000,
            ode_beta: 0.08,
        }
    }
}

impl Parameters {
    /// Load parameters from a JSON file, or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(params) => {
                    log::info!("Loaded parameters from {:?}", path.as_ref());
                    params
                }
                Err(e) => {
                    log::warn!("Failed to parse parameters: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Parameter file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Number of configured species.
    pub fn n_species(&self) -> usize {
        self.shape.len()
    }

    /// Check the per-species arrays agree and every referenced species exists.
    pub fn validate(&self) -> Result<(), SimError> {
        let n = self.n_species();
        let lengths = [
            self.radius_cell_max.len(),
            self.length_cell_max.len(),
            self.radius_cell_stdev.len(),
            self.fil_species.len(),
            self.yield_coeff.len(),
        ];
        if lengths.iter().any(|&l| l != n) {
            return Err(SimError::Config(format!(
                "per-species arrays disagree in length (shape has {} entries)",
                n
            )));
        }
        if let Some(&bad) = self.init_species.iter().find(|&&s| s >= n) {
            return Err(SimError::Config(format!(
                "initial species index {} out of range ({} species configured)",
                bad, n
            )));
        }
        for (s, &shape) in self.shape.iter().enumerate() {
            if shape != Shape::Sphere && self.length_cell_max[s] <= 0.0 {
                return Err(SimError::Config(format!(
                    "rod species {} needs a positive maximum length",
                    s
                )));
            }
        }
        Ok(())
    }

    /// Aspect ratio (max length over max radius) of a rod species.
    pub fn aspect(&self, species: usize) -> f64 {
        match self.shape[species] {
            Shape::Sphere => 0.0,
            Shape::RodVariable | Shape::RodFixed => {
                self.length_cell_max[species] / self.radius_cell_max[species]
            }
        }
    }

    /// Number of balls a cell of this species owns.
    pub fn ball_count(&self, species: usize) -> usize {
        match self.shape[species] {
            Shape::Sphere => 1,
            Shape::RodVariable | Shape::RodFixed => 2,
        }
    }

    /// Maximum chemical amount before division [Cmol], from the species'
    /// maximum geometry (sphere, or sphero-cylinder for rods).
    pub fn n_cell_max(&self, species: usize) -> f64 {
        let r = self.radius_cell_max[species];
        let volume = match self.shape[species] {
            Shape::Sphere => 4.0 / 3.0 * std::f64::consts::PI * r.powi(3),
            Shape::RodVariable | Shape::RodFixed => {
                4.0 / 3.0 * std::f64::consts::PI * r.powi(3)
                    + std::f64::consts::PI * r * r * self.length_cell_max[species]
            }
        };
        volume * self.rho_x / self.mw_x
    }

    /// Reference amount of a freshly created ball [Cmol]; used as the mass
    /// scale for specific spring constants.
    pub fn n_ball_init(&self, species: usize) -> f64 {
        self.n_cell_max(species) / (2.0 * self.ball_count(species) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = Parameters::default();
        params.validate().unwrap();
    }

    #[test]
    fn test_serialization_round_trip() {
        let params = Parameters::default();
        let json = serde_json::to_string_pretty(&params).unwrap();
        let parsed: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.n_species(), params.n_species());
        assert!((parsed.kc - params.kc).abs() < 1e-12);
    }

    #[test]
    fn test_bad_species_index_rejected() {
        let params = Parameters {
            init_species: vec![0, 17],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_amount_max_monotone_in_radius() {
        let params = Parameters::default();
        // Species 1 is the bigger sphere.
        assert!(params.n_cell_max(1) > params.n_cell_max(0));
    }

    #[test]
    fn test_rod_needs_length() {
        let mut params = Parameters::default();
        params.length_cell_max[2] = 0.0;
        assert!(params.validate().is_err());
    }
}
