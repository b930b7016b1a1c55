//! JSON checkpoint export for simulation snapshots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::export::CheckpointSink;
use crate::model::Model;

/// Full checkpoint structure written to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Export timestamp
    pub exported_at: String,
    /// Export version for compatibility
    pub version: String,
    /// Complete entity graph, counters and parameters
    pub model: Model,
}

const CHECKPOINT_VERSION: &str = "1.0.0";

/// Checkpoint sink writing one JSON file per relaxation sub-iteration.
///
/// Filenames encode the iteration counters: `g0003r0015.json` is growth
/// iteration 3, relaxation iteration 15.
#[derive(Debug)]
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    /// Create a sink rooted at `dir`; the directory is created on demand.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, model: &Model) -> PathBuf {
        self.dir.join(format!(
            "g{:04}r{:04}.json",
            model.growth_iter, model.relaxation_iter
        ))
    }
}

impl CheckpointSink for JsonSink {
    fn save(&mut self, model: &Model) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;
        let path = self.path_for(model);
        let checkpoint = Checkpoint {
            exported_at: Local::now().to_rfc3339(),
            version: CHECKPOINT_VERSION.into(),
            model: model.clone(),
        };
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating checkpoint {}", path.display()))?;
        serde_json::to_writer_pretty(file, &checkpoint)?;
        log::debug!("checkpoint written: {}", path.display());
        Ok(())
    }
}

/// Load a checkpoint back into a resumable model.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Model> {
    let contents = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading checkpoint {}", path.as_ref().display()))?;
    let checkpoint: Checkpoint = serde_json::from_str(&contents)?;
    log::info!(
        "loaded checkpoint {} (written {})",
        path.as_ref().display(),
        checkpoint.exported_at
    );
    Ok(checkpoint.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use glam::DVec3;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cellchain-test-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_checkpoint_save_and_load_round_trip() {
        let dir = scratch_dir("roundtrip");
        let mut m = Model::new(Parameters::default()).unwrap();
        m.create_cell(
            2,
            2e-16,
            DVec3::new(0.0, 1e-6, 0.0),
            DVec3::new(1e-6, 1e-6, 0.0),
            false,
            0.0,
        )
        .unwrap();
        m.growth_iter = 2;
        m.relaxation_iter = 9;

        let mut sink = JsonSink::new(&dir);
        sink.save(&m).unwrap();

        let path = dir.join("g0002r0009.json");
        assert!(path.exists());
        let restored = load_checkpoint(&path).unwrap();
        assert_eq!(restored.cells.len(), 1);
        assert_eq!(restored.growth_iter, 2);
        assert_eq!(restored.balls.len(), m.balls.len());
        assert_eq!(restored.params.n_species(), m.params.n_species());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
