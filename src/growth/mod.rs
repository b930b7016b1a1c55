//! Growth, division and the filament topology that division creates.

use glam::DVec3;
use rand::Rng;
use rand_distr::{Distribution, Normal, UnitSphere};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::model::{Model, Shape, SpringKind};

/// How cell amounts advance each growth iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowthMethod {
    /// Stochastic factor drawn uniformly from `growth_factor_range`.
    Simple,
    /// As `Simple`, with a bonus factor for cells stuck to a partner of the
    /// other metabolic group (spheres and rods form the two groups).
    Syntrophy,
    /// Mass balance from per-cell surface reaction rates supplied by a
    /// [`FluxCollaborator`].
    Flux,
}

/// External supplier of per-cell reaction rates for flux-driven growth.
///
/// `rates` returns one rate per cell, in cell order, in
/// mol reacted per Cmol biomass per second.
pub trait FluxCollaborator {
    fn rates(&mut self, model: &Model) -> Vec<f64>;
}

/// Outcome of one growth iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthStats {
    pub divided: usize,
    pub fil_springs_formed: usize,
    pub branches_formed: usize,
}

/// Advance every cell's amount by one `growth_time_step`, divide the cells
/// that exceed their species maximum and wire up division filaments.
pub fn step<R: Rng>(
    model: &mut Model,
    rng: &mut R,
    mut flux: Option<&mut dyn FluxCollaborator>,
) -> Result<GrowthStats, SimError> {
    let n_cells = model.cells.len();
    let rates = match (model.params.growth_method, flux.as_mut()) {
        (GrowthMethod::Flux, Some(collab)) => Some(collab.rates(model)),
        (GrowthMethod::Flux, None) => {
            return Err(SimError::Config(
                "flux growth selected but no flux collaborator supplied".into(),
            ))
        }
        _ => None,
    };

    for cell in 0..n_cells {
        let amount = model.amount(cell);
        let new_amount = match model.params.growth_method {
            GrowthMethod::Simple => amount * draw_factor(model, rng),
            GrowthMethod::Syntrophy => {
                let mut factor = draw_factor(model, rng);
                if has_syntrophic_partner(model, cell) {
                    factor *= model.params.syntrophy_factor;
                }
                amount * factor
            }
            GrowthMethod::Flux => {
                let q = rates.as_ref().expect("rates computed above")[cell];
                model.cells[cell].q = q;
                let species = model.cells[cell].species;
                amount
                    + q * amount
                        * model.params.growth_time_step
                        * model.params.yield_coeff[species]
            }
        };
        model.set_amount(cell, new_amount);
    }

    let dividing: Vec<usize> = (0..n_cells)
        .filter(|&c| model.amount(c) > model.params.n_cell_max(model.cells[c].species))
        .collect();

    let mut stats = GrowthStats {
        divided: dividing.len(),
        ..Default::default()
    };
    for mother in dividing {
        let daughter = divide(model, mother, rng)?;
        if !model.cells[mother].filament {
            continue;
        }
        match model.shape(mother) {
            Shape::Sphere => {
                if model.params.fil_sphere_straight {
                    transfer_filament(model, mother, daughter);
                }
                create_sphere_filament(model, mother, daughter);
                stats.fil_springs_formed += 1;
            }
            Shape::RodVariable | Shape::RodFixed => {
                let neighbour = model.fil_neighbour(mother);
                let branch = model.fil_spring_count(mother) > 2
                    && rng.gen::<f64>() < model.params.fil_branch_frequency
                    && neighbour.is_some();
                if branch {
                    create_branched_filament(model, daughter, mother, neighbour.unwrap());
                    stats.fil_springs_formed += 4;
                    stats.branches_formed += 1;
                } else {
                    transfer_filament(model, mother, daughter);
                    create_straight_filament(model, mother, daughter);
                    stats.fil_springs_formed += 2;
                }
            }
        }
    }
    Ok(stats)
}

fn draw_factor<R: Rng>(model: &Model, rng: &mut R) -> f64 {
    let [lo, hi] = model.params.growth_factor_range;
    rng.gen_range(lo..hi)
}

/// Whether any stick partner belongs to the other metabolic group.
fn has_syntrophic_partner(model: &Model, cell: usize) -> bool {
    let rod = model.shape(cell).is_rod();
    model.cells[cell]
        .stick_partners
        .iter()
        .any(|&p| model.shape(p).is_rod() != rod)
}

/// Split `cell` in two; both halves get exactly half the amount. Returns the
/// daughter's id with lineage recorded.
pub fn divide<R: Rng>(model: &mut Model, cell: usize, rng: &mut R) -> Result<usize, SimError> {
    let species = model.cells[cell].species;
    let filament = model.cells[cell].filament;
    let n = model.amount(cell);
    // Halve the mother first so radii and rod rest length are never stale.
    model.set_amount(cell, n / 2.0);

    let stdev = model.params.radius_cell_stdev[species];
    let modifier = if stdev > 0.0 {
        Normal::new(0.0, stdev).expect("positive stdev").sample(rng)
    } else {
        0.0
    };

    let daughter = match model.params.shape[species] {
        Shape::Sphere => {
            let b = model.cells[cell].balls[0];
            let r = model.balls[b].radius;
            let dir: DVec3 = {
                let v: [f64; 3] = UnitSphere.sample(rng);
                DVec3::from_array(v)
            };
            let pos = model.balls[b].pos;
            let daughter_pos = pos - dir * r;
            model.balls[b].pos = pos + dir * r;
            model.balls[b].pos.y = model.balls[b].pos.y.max(r);
            let daughter =
                model.create_cell(species, n / 2.0, daughter_pos, DVec3::ZERO, filament, modifier)?;
            let db = model.cells[daughter].balls[0];
            model.balls[db].pos.y = model.balls[db].pos.y.max(model.balls[db].radius);
            model.balls[db].vel = model.balls[b].vel;
            model.balls[db].force = model.balls[b].force;
            daughter
        }
        Shape::RodVariable | Shape::RodFixed => {
            let b0 = model.cells[cell].balls[0];
            let b1 = model.cells[cell].balls[1];
            let p0 = model.balls[b0].pos;
            let p1 = model.balls[b1].pos;
            let dir = (p1 - p0).normalize();
            let mid = (p0 + p1) / 2.0;
            let disp = model.balls[b1].radius / 2.0;

            // Daughter takes over the far half; its first ball is nudged off
            // the axis so the pair does not relax into a perfect line.
            let mut base0 = mid + dir * disp;
            base0.y *= 1.01;
            let base1 = p1;
            model.balls[b1].pos = mid - dir * disp;

            let daughter = model.create_cell(species, n / 2.0, base0, base1, filament, modifier)?;
            for &db in model.cells[daughter].balls.clone().iter() {
                model.balls[db].vel = model.balls[b1].vel;
                model.balls[db].force = model.balls[b1].force;
            }
            // The daughter inherits the mother's rest length verbatim.
            let mother_rod = model.cells[cell].rod_spring.expect("rod cell");
            let daughter_rod = model.cells[daughter].rod_spring.expect("rod cell");
            model.rod_springs[daughter_rod].rest_length =
                model.rod_springs[mother_rod].rest_length;
            daughter
        }
    };
    // The daughter starts from the mother's last surface rate rather than
    // zero, so flux growth is continuous until the next collaborator call.
    model.cells[daughter].q = model.cells[cell].q;
    model.cells[daughter].mother = Some(cell);
    Ok(daughter)
}

/// Move every filament spring endpoint from the mother's first ball to the
/// daughter's first ball, so an existing chain passes through the daughter.
pub fn transfer_filament(model: &mut Model, mother: usize, daughter: usize) {
    let from = model.cells[mother].balls[0];
    let to = model.cells[daughter].balls[0];
    let mut moved = Vec::new();
    for g in 0..model.fil_groups.len() {
        let mut touched = false;
        for s in 0..model.fil_groups[g].springs.len() {
            for end in 0..2 {
                if model.fil_groups[g].springs[s].balls[end] == from {
                    model.fil_groups[g].springs[s].balls[end] = to;
                    touched = true;
                }
            }
        }
        if touched {
            moved.push(model.fil_groups[g].id);
        }
    }
    for id in moved {
        let idx = model
            .fil_groups
            .iter()
            .position(|g| g.id == id)
            .expect("group id just seen");
        let springs = model.fil_groups[idx].springs.clone();
        let still_attached = springs.iter().any(|s| {
            s.balls
                .iter()
                .any(|&b| model.balls[b].cell == mother)
        });
        if !still_attached {
            model.cells[mother].fil_groups.retain(|&g| g != id);
        }
        if !model.cells[daughter].fil_groups.contains(&id) {
            model.cells[daughter].fil_groups.push(id);
        }
    }
}

/// One short filament spring between a dividing sphere and its daughter.
fn create_sphere_filament(model: &mut Model, mother: usize, daughter: usize) {
    let mb = model.cells[mother].balls[0];
    let db = model.cells[daughter].balls[0];
    model.add_fil_group(vec![(SpringKind::FilShort, mb, db)]);
}

/// The short + long sibling pair of a straight rod chain.
fn create_straight_filament(model: &mut Model, mother: usize, daughter: usize) {
    let m0 = model.cells[mother].balls[0];
    let m1 = model.cells[mother].balls[1];
    let d0 = model.cells[daughter].balls[0];
    let d1 = model.cells[daughter].balls[1];
    model.add_fil_group(vec![
        (SpringKind::FilShort, d0, m1),
        (SpringKind::FilLong, d1, m0),
    ]);
}

/// The four-spring branched linkage: daughter to mother and daughter to the
/// mother's straight-chain neighbour, one atomic group.
fn create_branched_filament(model: &mut Model, daughter: usize, mother: usize, neighbour: usize) {
    let d0 = model.cells[daughter].balls[0];
    let d1 = model.cells[daughter].balls[1];
    let m0 = model.cells[mother].balls[0];
    let m1 = model.cells[mother].balls[1];
    let n0 = model.cells[neighbour].balls[0];
    let n1 = model.cells[neighbour].balls[1];
    model.add_fil_group(vec![
        (SpringKind::FilBranchShort, d0, m1),
        (SpringKind::FilBranchLong, d1, m0),
        (SpringKind::FilBranchShort, d0, n1),
        (SpringKind::FilBranchLong, d1, n0),
    ]);
}
