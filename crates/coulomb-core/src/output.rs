// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Gather I/O
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rank-0 output: per-species CSV series and gathered binary position
//! frames. All ranks participate in the gathers; only rank 0 touches disk.

use crate::cloud::{contiguous, ParticleCloud};
use crate::comm::Communicator;
use coulomb_types::error::{ExplosionError, ExplosionResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appending CSV writer for one species' time series.
///
/// Header `Time(s), Energy, MaxR2, NumParticles, MPI_Ranks` is written
/// once, on the first append. Construct on rank 0 only.
pub struct SpeciesSeries {
    path: PathBuf,
    buffer_size: usize,
    wrote_header: bool,
}

impl SpeciesSeries {
    pub fn new(dir: &Path, species: &str, buffer_size: usize) -> Self {
        SpeciesSeries {
            path: dir.join(format!("simulation_output_{species}.csv")),
            buffer_size,
            wrote_header: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &mut self,
        time: f64,
        energy: f64,
        max_r2: f64,
        n_total: u64,
        ranks: usize,
    ) -> ExplosionResult<()> {
        let file = if self.wrote_header {
            OpenOptions::new().append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        let mut w = BufWriter::with_capacity(self.buffer_size, file);
        if !self.wrote_header {
            writeln!(w, "Time(s), Energy, MaxR2, NumParticles, MPI_Ranks")?;
            self.wrote_header = true;
        }
        writeln!(w, "{time:.6}, {energy:.6e}, {max_r2:.6e}, {n_total}, {ranks}")?;
        w.flush()?;
        Ok(())
    }
}

/// A decoded binary position frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFrame {
    pub step: i32,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// Gather all positions to rank 0 and write one binary frame:
/// `i32 step, i32 n_total, f64 x[n], f64 y[n], f64 z[n]`, little-endian.
/// Collective: every rank must call this; only rank 0 writes.
pub fn write_position_frame<C: Communicator>(
    path: &Path,
    cloud: &ParticleCloud,
    step: i32,
    buffer_size: usize,
    comm: &C,
) -> ExplosionResult<()> {
    let counts = comm.gather(cloud.len());
    let xs = comm.gather_v(contiguous(&cloud.x));
    let ys = comm.gather_v(contiguous(&cloud.y));
    let zs = comm.gather_v(contiguous(&cloud.z));

    let (Some(counts), Some(xs), Some(ys), Some(zs)) = (counts, xs, ys, zs) else {
        return Ok(());
    };
    let n_total: usize = counts.iter().sum();
    debug_assert_eq!(xs.len(), n_total);

    let file = File::create(path)?;
    let mut w = BufWriter::with_capacity(buffer_size, file);
    w.write_all(&step.to_le_bytes())?;
    w.write_all(&(n_total as i32).to_le_bytes())?;
    for axis in [&xs, &ys, &zs] {
        for v in axis.iter() {
            w.write_all(&v.to_le_bytes())?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Read back a binary position frame written by [`write_position_frame`].
pub fn read_position_frame(path: &Path) -> ExplosionResult<PositionFrame> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 8 {
        return Err(ExplosionError::FrameFormat(format!(
            "{} bytes is shorter than the frame header",
            bytes.len()
        )));
    }
    let step = i32::from_le_bytes(bytes[0..4].try_into().expect("4-byte slice"));
    let n = i32::from_le_bytes(bytes[4..8].try_into().expect("4-byte slice"));
    if n < 0 {
        return Err(ExplosionError::FrameFormat(format!(
            "negative particle count {n}"
        )));
    }
    let n = n as usize;
    let expected = 8 + 3 * n * 8;
    if bytes.len() != expected {
        return Err(ExplosionError::FrameFormat(format!(
            "expected {expected} bytes for {n} particles, found {}",
            bytes.len()
        )));
    }

    let read_axis = |axis: usize| -> Vec<f64> {
        let start = 8 + axis * n * 8;
        bytes[start..start + n * 8]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("8-byte chunk")))
            .collect()
    };
    Ok(PositionFrame {
        step,
        x: read_axis(0),
        y: read_axis(1),
        z: read_axis(2),
    })
}

/// Create the output directory. Rank 0 calls this before the first write.
pub fn ensure_output_dir(dir: &Path) -> ExplosionResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
