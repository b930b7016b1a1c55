//! Flat per-cell CSV table for quick inspection of a run.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Model;

/// Write one row per cell: lineage, amount, geometry and bond counts.
pub fn export_cells_csv<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    let mut file = std::fs::File::create(path.as_ref())
        .with_context(|| format!("creating csv {}", path.as_ref().display()))?;
    writeln!(
        file,
        "cell,species,born,mother,amount,radius,x0,y0,z0,x1,y1,z1,stick_partners,fil_groups,anchored"
    )?;
    for (i, cell) in model.cells.iter().enumerate() {
        let b0 = &model.balls[cell.balls[0]];
        let (p1x, p1y, p1z) = match cell.balls.get(1) {
            Some(&b1) => {
                let p = model.balls[b1].pos;
                (p.x, p.y, p.z)
            }
            None => (f64::NAN, f64::NAN, f64::NAN),
        };
        writeln!(
            file,
            "{},{},{},{},{:e},{:e},{:e},{:e},{:e},{:e},{:e},{:e},{},{},{}",
            i,
            cell.species,
            cell.born,
            cell.mother.map_or(-1i64, |m| m as i64),
            model.amount(i),
            b0.radius,
            b0.pos.x,
            b0.pos.y,
            b0.pos.z,
            p1x,
            p1y,
            p1z,
            cell.stick_partners.len(),
            cell.fil_groups.len(),
            cell.anchor_group.is_some()
        )?;
    }
    log::debug!(
        "cell table written: {} ({} cells)",
        path.as_ref().display(),
        model.cells.len()
    );
    Ok(())
}
