//! Checkpoint and table export.

pub mod csv_export;
pub mod json_export;

pub use csv_export::export_cells_csv;
pub use json_export::{load_checkpoint, JsonSink};

use anyhow::Result;

use crate::model::Model;

/// Destination for per-sub-iteration checkpoints.
///
/// The model carries its parameters and counters, so one call captures
/// everything needed to resume a run.
pub trait CheckpointSink {
    fn save(&mut self, model: &Model) -> Result<()>;
}

/// Sink that drops every checkpoint; for tests and dry runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl CheckpointSink for NullSink {
    fn save(&mut self, _model: &Model) -> Result<()> {
        Ok(())
    }
}
