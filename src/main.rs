//! Cellchain - entry point
//!
//! Usage:
//!   cargo run --release                          # defaults
//!   cargo run --release -- my_params.json        # custom parameters
//!   cargo run --release -- --resume g0004r0019.json

use std::time::Instant;

use anyhow::Result;
use cellchain::export::{export_cells_csv, load_checkpoint, CheckpointSink, JsonSink};
use cellchain::{Model, Parameters, Simulation};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let model = match args.first().map(String::as_str) {
        Some("--resume") => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("--resume needs a checkpoint path"))?;
            load_checkpoint(path)?
        }
        Some(path) => Model::new(Parameters::load_or_default(path))?,
        None => Model::new(Parameters::load_or_default("parameters.json"))?,
    };

    let out_dir = model.params.name.clone();
    log::info!(
        "starting run '{}': {} species, {} growth iterations",
        out_dir,
        model.params.n_species(),
        model.params.growth_iter_max
    );

    let mut sim = Simulation::new(model, JsonSink::new(&out_dir));
    let start = Instant::now();
    sim.run(None)?;
    let elapsed = start.elapsed();

    let csv_path = format!("{}/cells.csv", out_dir);
    export_cells_csv(&sim.model, &csv_path)?;
    // Leave a final resumable snapshot alongside the per-iteration ones.
    JsonSink::new(&out_dir).save(&sim.model)?;

    log::info!(
        "finished: {} cells, {} balls, {} growth iterations in {:.1} s",
        sim.model.cells.len(),
        sim.model.balls.len(),
        sim.model.growth_iter,
        elapsed.as_secs_f64()
    );
    Ok(())
}
