// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Simulation Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Step loop: INIT → RUN → DONE.
//!
//! Per step and species the phase order is fixed: sort, field, push, then
//! the optional energy check and output on the save cadence. The field is
//! always evaluated against the current post-sort arrangement. Any
//! collective failure is fatal; there is no in-run recovery and no
//! checkpointing.

use crate::cloud::{local_share, seed_for_rank, ParticleCloud};
use crate::comm::Communicator;
use crate::energy::{total_energy, EnergyMethod};
use crate::field::update_radial_field;
use crate::metrics::{estimate, print_summary, PerfSummary};
use crate::output::{ensure_output_dir, write_position_frame, SpeciesSeries};
use crate::push::push_euler;
use crate::sort::RadialSorter;
use coulomb_types::config::SimulationConfig;
use coulomb_types::constants::SEED_BASE;
use coulomb_types::error::ExplosionResult;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

/// How the initial ensembles are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedMode {
    /// Production: rank r samples its own stream seeded `10 + r·12345`.
    RankOffset,
    /// One shared stream sliced by rank; the global ensemble is identical
    /// for every P. Used by the scaling-invariance checks.
    GlobalStream,
}

/// What the run writes, and where. Must be identical on every rank.
#[derive(Debug, Clone)]
pub struct OutputPolicy {
    pub output_dir: PathBuf,
    /// Binary position frames on the save cadence.
    pub save_positions: bool,
    /// Per-species CSV time series.
    pub save_series: bool,
    /// Reserved; accepted but produces no output.
    pub save_energy_distribution: bool,
}

impl OutputPolicy {
    /// Benchmark mode: no output at all.
    pub fn disabled() -> Self {
        OutputPolicy {
            output_dir: PathBuf::from("output"),
            save_positions: false,
            save_series: false,
            save_energy_distribution: false,
        }
    }

    fn writes_anything(&self) -> bool {
        self.save_positions || self.save_series
    }
}

/// Rank-0-observable outcome of a finished run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub steps: usize,
    pub initial_energy: f64,
    pub final_energy: f64,
    /// |E(t_end) − E₀| / |E₀|.
    pub relative_drift: f64,
    pub perf: PerfSummary,
}

/// Run the full simulation on this rank. SPMD: every rank of the
/// communicator calls this with the same config and policy.
pub fn run_simulation<C: Communicator>(
    cfg: &SimulationConfig,
    policy: &OutputPolicy,
    method: EnergyMethod,
    seed_mode: SeedMode,
    comm: &C,
) -> ExplosionResult<RunSummary> {
    let rank = comm.rank();
    let nranks = comm.size();
    let steps = cfg.step_count();

    if rank == 0 && policy.writes_anything() {
        ensure_output_dir(&policy.output_dir)?;
    }
    comm.barrier();

    // ── INIT ─────────────────────────────────────────────────────────
    let n_local = local_share(cfg.n_particles, rank, nranks) as usize;
    let charge = cfg.charge_per_particle();

    if rank == 0 {
        info!(
            "coulomb explosion: N={} ranks={} local≈{} steps={} species={}",
            cfg.n_particles,
            nranks,
            n_local,
            steps,
            cfg.species.len()
        );
    }

    let start = Instant::now();

    let mut clouds: Vec<ParticleCloud> = cfg
        .species
        .iter()
        .map(|s| match seed_mode {
            SeedMode::RankOffset => ParticleCloud::sample_sphere(
                &s.name,
                s.iqom,
                n_local,
                cfg.n_particles,
                cfg.radius,
                charge,
                seed_for_rank(SEED_BASE, rank),
            ),
            SeedMode::GlobalStream => ParticleCloud::sample_sphere_slice(
                &s.name,
                s.iqom,
                cfg.n_particles,
                cfg.radius,
                charge,
                SEED_BASE,
                rank,
                nranks,
            ),
        })
        .collect();

    let mut series: Vec<Option<SpeciesSeries>> = cfg
        .species
        .iter()
        .map(|s| {
            (rank == 0 && policy.save_series)
                .then(|| SpeciesSeries::new(&policy.output_dir, &s.name, cfg.buffer_size))
        })
        .collect();

    let mut sorter = RadialSorter::new();
    let mut initial_energy = 0.0;
    let mut max_r2_global: f64 = 0.0;

    for cloud in clouds.iter_mut() {
        max_r2_global = max_r2_global.max(comm.all_reduce_max(cloud.max_r2_local()));

        sorter.sort(cloud, comm);
        update_radial_field(cloud, comm);
        initial_energy += total_energy(cloud, method, comm);
    }

    if rank == 0 {
        info!("initial max r² {max_r2_global:e}, initial energy {initial_energy:e}");
    }

    // ── RUN ──────────────────────────────────────────────────────────
    for it in 0..steps {
        let save_step = it % cfg.save_interval == 0;
        let mut step_energy = 0.0;

        for (cloud, series) in clouds.iter_mut().zip(series.iter_mut()) {
            sorter.sort(cloud, comm);
            update_radial_field(cloud, comm);
            push_euler(cloud, cfg.dt);

            if save_step && policy.save_positions {
                let path = policy
                    .output_dir
                    .join(format!("positions_{}_step_{it}.bin", cloud.name));
                write_position_frame(&path, cloud, it as i32, cfg.buffer_size, comm)?;
            }

            if save_step {
                let energy = total_energy(cloud, method, comm);
                step_energy += energy;

                if policy.save_series {
                    let max_r2 = comm.all_reduce_max(cloud.max_r2_local());
                    if let Some(series) = series {
                        series.append(
                            it as f64 * cfg.dt,
                            energy,
                            max_r2,
                            cfg.n_particles,
                            nranks,
                        )?;
                    }
                }
            }
        }

        if save_step && rank == 0 {
            let drift = (step_energy - initial_energy).abs() / initial_energy.abs() * 100.0;
            println!(
                "Step {it:6} | Time {:.4} | Energy error: {drift:.6}%",
                it as f64 * cfg.dt
            );
        }
    }

    // ── DONE ─────────────────────────────────────────────────────────
    let final_energy: f64 = clouds
        .iter()
        .map(|cloud| total_energy(cloud, method, comm))
        .sum();
    let relative_drift = (final_energy - initial_energy).abs() / initial_energy.abs();

    comm.barrier();
    let elapsed = start.elapsed().as_secs_f64();
    let perf = estimate(steps, cfg.n_particles, cfg.species.len(), elapsed);

    if rank == 0 {
        info!("final energy {final_energy:e}, relative drift {relative_drift:e}");
        print_summary(&perf, nranks);
    }

    Ok(RunSummary {
        steps,
        initial_energy,
        final_energy,
        relative_drift,
        perf,
    })
}
