//! The outer growth/relaxation loop.
//!
//! Each iteration reseeds deterministically, grows and divides cells (unless
//! the previous iteration left unresolved overlap), rebuilds rest lengths,
//! then alternates bond maintenance sweeps with integration sub-windows,
//! checkpointing after every sub-window. An exact overlap scan at the end
//! gates the next iteration's growth.

use anyhow::Result;
use glam::DVec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, UnitSphere};

use crate::bonds;
use crate::export::CheckpointSink;
use crate::growth::{self, FluxCollaborator, GrowthStats};
use crate::model::Model;
use crate::physics;

/// Accumulated outcome of one iteration's relaxation phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelaxationStats {
    /// Total internal solver steps over all sub-iterations.
    pub steps: usize,
    pub sticks_formed: usize,
    pub sticks_broken: usize,
    pub anchors_formed: usize,
    pub anchors_broken: usize,
    pub filaments_broken: usize,
}

/// Outcome of one full growth/relaxation iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterationStats {
    pub growth: GrowthStats,
    pub relaxation: RelaxationStats,
    /// Cells still overlapping after relaxation.
    pub overlapping: usize,
}

/// Driver owning the model and the checkpoint sink.
pub struct Simulation<S: CheckpointSink> {
    pub model: Model,
    sink: S,
    overlap: bool,
}

impl<S: CheckpointSink> Simulation<S> {
    pub fn new(model: Model, sink: S) -> Self {
        // Recompute the growth gate from the model state, so a resumed
        // checkpoint behaves exactly like the run it was taken from.
        let overlap =
            !model.params.allow_overlap_during_growth && !model.detect_overlap(1.0).is_empty();
        Self {
            model,
            sink,
            overlap,
        }
    }

    /// Create the initial population: random species from `init_species`,
    /// random positions inside the inner sub-domain, rods oriented randomly
    /// at their rest length. Relaxes until no cells overlap.
    pub fn initialize(&mut self) -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.model.params.random_seed);
        let n_init = self.model.params.n_init_cells;
        for _ in 0..n_init {
            let pick = rng.gen_range(0..self.model.params.init_species.len());
            let species = self.model.params.init_species[pick];
            let n = rng.gen_range(0.5..1.0) * self.model.params.n_cell_max(species);

            let p = &self.model.params;
            let offset = (p.domain - p.domain_init) * 0.5;
            let base0 = offset
                + DVec3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>())
                    * p.domain_init;
            let stdev = p.radius_cell_stdev[species];
            let modifier = if stdev > 0.0 {
                Normal::new(0.0, stdev).expect("positive stdev").sample(&mut rng)
            } else {
                0.0
            };
            let filament = p.filament && p.fil_species[species];
            let rod = p.shape[species].is_rod();
            let dir: DVec3 = DVec3::from_array(UnitSphere.sample(&mut rng));

            let cell = self.model.create_cell(
                species,
                n,
                base0,
                base0 + dir * 1e-9,
                filament,
                modifier,
            )?;
            if rod {
                // Stretch the rod to its rest length along the drawn axis.
                let rest = self.model.rod_rest_length(cell);
                let b1 = self.model.cells[cell].balls[1];
                self.model.balls[b1].pos = base0 + dir * rest;
            }
            if self.model.params.initial_at_substratum {
                for &b in self.model.cells[cell].balls.clone().iter() {
                    let r = self.model.balls[b].radius;
                    self.model.balls[b].pos.y = r;
                }
            }
        }
        log::info!("{} initial cells created", self.model.cells.len());

        // Push freshly placed cells apart before the first growth step.
        let mut attempts = 0;
        while !self.model.detect_overlap(1.0).is_empty() {
            attempts += 1;
            if attempts > 100 {
                log::warn!("initial cells still overlap after {} relaxations", attempts);
                break;
            }
            physics::relax(&mut self.model)?;
        }
        // Placement transients should not leak into the run clock.
        self.model.relaxation_time = 0.0;
        self.sink.save(&self.model)?;
        Ok(())
    }

    /// One growth/relaxation iteration.
    pub fn iterate(&mut self, flux: Option<&mut dyn FluxCollaborator>) -> Result<IterationStats> {
        let p = &self.model.params;
        let seed = (p.random_seed + 1)
            * (self.model.growth_iter as u64 + 1)
            * (self.model.relaxation_iter as u64 + 1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut stats = IterationStats::default();

        if self.overlap {
            log::warn!(
                "cells overlap after previous relaxation, skipping growth in iteration {}",
                self.model.growth_iter
            );
        } else {
            stats.growth = growth::step(&mut self.model, &mut rng, flux)?;
            if stats.growth.divided > 0 {
                log::info!(
                    "{} cells divided, total {} cells",
                    stats.growth.divided,
                    self.model.cells.len()
                );
            }
        }
        self.model.growth_iter += 1;
        self.model.growth_time += self.model.params.growth_time_step;

        // Amounts changed, so every amount-derived rest length is stale.
        for cell in 0..self.model.cells.len() {
            self.model.reset_rod_rest_length(cell);
        }
        self.model.reset_filament_rest_lengths();

        let n_sub = (self.model.params.relaxation_time_step / self.model.params.relaxation_dt)
            .round()
            .max(1.0) as usize;
        for _ in 0..n_sub {
            let bond_stats = bonds::maintain(&mut self.model);
            stats.relaxation.sticks_formed += bond_stats.sticks_formed;
            stats.relaxation.sticks_broken += bond_stats.sticks_broken;
            stats.relaxation.anchors_formed += bond_stats.anchors_formed;
            stats.relaxation.anchors_broken += bond_stats.anchors_broken;
            stats.relaxation.filaments_broken += bond_stats.fils_broken;

            let ode = physics::relax(&mut self.model).map_err(|e| {
                log::error!(
                    "relaxation failed at growth iteration {}, last checkpoint g{:04}r{:04}: {}",
                    self.model.growth_iter,
                    self.model.growth_iter,
                    self.model.relaxation_iter,
                    e
                );
                e
            })?;
            stats.relaxation.steps += ode.n_steps();
            if ode.n_steps() > self.model.params.ode_step_warn {
                self.model.lower_ode_beta();
                log::warn!(
                    "{} solver steps in one sub-iteration, lowering ode beta to {:.4}",
                    ode.n_steps(),
                    self.model.ode_beta
                );
            }
            self.model.relaxation_iter += 1;
            self.sink.save(&self.model)?;
        }

        let overlapping = self.model.detect_overlap(1.0);
        stats.overlapping = overlapping.len();
        self.overlap = !self.model.params.allow_overlap_during_growth && !overlapping.is_empty();
        if self.overlap {
            log::warn!("{} cells overlapping after relaxation", overlapping.len());
        }
        log::info!(
            "iteration {}: {} solver steps, sticks +{}/-{}, anchors +{}/-{}, filaments -{}",
            self.model.growth_iter,
            stats.relaxation.steps,
            stats.relaxation.sticks_formed,
            stats.relaxation.sticks_broken,
            stats.relaxation.anchors_formed,
            stats.relaxation.anchors_broken,
            stats.relaxation.filaments_broken
        );
        Ok(stats)
    }

    /// Run until `growth_iter_max`, initializing first if the model is empty.
    pub fn run(&mut self, mut flux: Option<&mut dyn FluxCollaborator>) -> Result<()> {
        if self.model.cells.is_empty() {
            self.initialize()?;
        }
        while self.model.growth_iter < self.model.params.growth_iter_max {
            // Reborrow per iteration; the collaborator outlives the loop.
            match flux {
                Some(ref mut f) => self.iterate(Some(&mut **f))?,
                None => self.iterate(None)?,
            };
        }
        Ok(())
    }
}
