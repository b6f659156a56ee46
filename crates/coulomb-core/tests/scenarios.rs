// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — End-to-End Scenarios
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Whole-run scenarios: drift bounds, rank-count invariance, sort order,
//! degenerate radii, charge conservation, binary round-trip.

use coulomb_core::cloud::{seed_for_rank, ParticleCloud};
use coulomb_core::comm::{run_on_ranks, Communicator, SelfComm};
use coulomb_core::driver::{run_simulation, OutputPolicy, RunSummary, SeedMode};
use coulomb_core::energy::EnergyMethod;
use coulomb_core::field::update_radial_field;
use coulomb_core::output::{read_position_frame, write_position_frame};
use coulomb_core::push::push_euler;
use coulomb_core::sort::RadialSorter;
use coulomb_types::config::SimulationConfig;
use std::path::PathBuf;

fn deck(n: u64, dt: f64, tend: f64, save: usize) -> SimulationConfig {
    SimulationConfig::from_str_contents(&format!(
        "N = {n}\nR = 1.0\ndt = {dt}\ntend = {tend}\nSAVE_INTERVAL = {save}\nspecies electron 1.0\n"
    ))
    .expect("valid deck")
}

fn run(cfg: &SimulationConfig, seed_mode: SeedMode, p: usize) -> RunSummary {
    if p == 1 {
        run_simulation(
            cfg,
            &OutputPolicy::disabled(),
            EnergyMethod::Exact,
            seed_mode,
            &SelfComm,
        )
        .expect("run must succeed")
    } else {
        let summaries = run_on_ranks(p, |comm| {
            run_simulation(
                cfg,
                &OutputPolicy::disabled(),
                EnergyMethod::Exact,
                seed_mode,
                &comm,
            )
            .expect("run must succeed")
        });
        summaries[0]
    }
}

/// 1000 particles, dt = 0.001, 100 steps: the exact-energy drift of the
/// uniform-sphere explosion stays below 0.05%.
#[test]
fn test_serial_drift_under_five_hundredths_percent() {
    let cfg = deck(1000, 0.001, 0.1, 100);
    let summary = run(&cfg, SeedMode::RankOffset, 1);
    assert_eq!(summary.steps, 100);
    assert!(
        summary.relative_drift < 5e-4,
        "drift {} too large",
        summary.relative_drift
    );
}

/// The same global ensemble run on 1 and 4 ranks lands on the same final
/// energy to reduction-order noise.
#[test]
fn test_final_energy_invariant_under_rank_count() {
    let cfg = deck(1000, 0.001, 0.1, 100);
    let serial = run(&cfg, SeedMode::GlobalStream, 1);
    let quad = run(&cfg, SeedMode::GlobalStream, 4);
    let rel = (quad.final_energy - serial.final_energy).abs() / serial.final_energy.abs();
    assert!(rel < 1e-8, "final energies diverge: rel = {rel:e}");
    assert!(quad.relative_drift < 5e-4);
}

/// Ten particles on two ranks: after one sort, the concatenation of the
/// rank-local arrays is globally non-decreasing in r².
#[test]
fn test_tiny_ensemble_globally_sorted_after_one_sort() {
    let per_rank = run_on_ranks(2, |comm| {
        let mut cloud = ParticleCloud::sample_sphere(
            "electron",
            1.0,
            5,
            10,
            1.0,
            0.1,
            seed_for_rank(10, comm.rank()),
        );
        let mut sorter = RadialSorter::new();
        sorter.sort(&mut cloud, &comm);
        cloud.r2.to_vec()
    });
    let concatenated: Vec<f64> = per_rank.into_iter().flatten().collect();
    assert_eq!(concatenated.len(), 10);
    for w in concatenated.windows(2) {
        assert!(w[0] <= w[1], "global order broken: {} > {}", w[0], w[1]);
    }
}

/// 100 particles all at (1, 0, 0) on 4 ranks: the degenerate-span guard
/// fires, the sort succeeds, and the outermost particle's field is the
/// full enclosed charge over r² = 1.
#[test]
fn test_degenerate_radius_field() {
    let q = 0.03;
    let results = run_on_ranks(4, |comm| {
        let mut cloud = ParticleCloud::new("electron", 1.0, 25, 100);
        for i in 0..cloud.len() {
            cloud.x[i] = 1.0;
            cloud.q[i] = q;
        }
        let mut sorter = RadialSorter::new();
        sorter.sort(&mut cloud, &comm);
        update_radial_field(&mut cloud, &comm);
        (cloud.len(), cloud.e_r.to_vec())
    });

    let total: usize = results.iter().map(|(n, _)| n).sum();
    assert_eq!(total, 100, "degenerate sort must conserve particles");

    // Ties accumulate in prefix order, so the globally last particle
    // encloses every charge: E_r = 100·q / 1².
    let last = results
        .iter()
        .rev()
        .find_map(|(_, e_r)| e_r.last().copied())
        .expect("some rank holds particles");
    assert!(
        (last - 100.0 * q).abs() < 1e-12,
        "outermost field {last} != {}",
        100.0 * q
    );
    for (_, e_r) in &results {
        for v in e_r {
            assert!(v.is_finite());
        }
    }
}

/// 1000 particles on 8 ranks, 10 steps: the global charge is conserved to
/// 1e-12 relative.
#[test]
fn test_charge_conserved_across_steps() {
    let cfg = deck(1000, 0.001, 0.01, 100);
    let charges = run_on_ranks(8, |comm| {
        let n_local = coulomb_core::cloud::local_share(cfg.n_particles, comm.rank(), comm.size());
        let mut cloud = ParticleCloud::sample_sphere(
            "electron",
            1.0,
            n_local as usize,
            cfg.n_particles,
            cfg.radius,
            cfg.charge_per_particle(),
            seed_for_rank(10, comm.rank()),
        );
        let mut sorter = RadialSorter::new();

        let before = comm.all_reduce_sum(cloud.total_charge_local());
        for _ in 0..cfg.step_count() {
            sorter.sort(&mut cloud, &comm);
            update_radial_field(&mut cloud, &comm);
            push_euler(&mut cloud, cfg.dt);
        }
        let after = comm.all_reduce_sum(cloud.total_charge_local());
        (before, after)
    });

    for (before, after) in charges {
        assert!(
            (after - before).abs() <= 1e-12 * before.abs(),
            "charge drifted: {before} -> {after}"
        );
    }
}

/// Round-trip: initial positions, zero steps, gather-write, reparse — the
/// decoded frame is bit-exact against the in-memory ensemble.
#[test]
fn test_position_frame_roundtrip_bit_exact() {
    let path: PathBuf =
        std::env::temp_dir().join(format!("coulomb_s6_{}.bin", std::process::id()));
    let path_ref = &path;

    let originals = run_on_ranks(2, |comm| {
        let cloud = ParticleCloud::sample_sphere(
            "electron",
            1.0,
            50,
            100,
            1.0,
            0.1,
            seed_for_rank(10, comm.rank()),
        );
        write_position_frame(path_ref, &cloud, 0, 4096, &comm).expect("frame write");
        (cloud.x.to_vec(), cloud.y.to_vec(), cloud.z.to_vec())
    });

    let frame = read_position_frame(&path).expect("frame read");
    std::fs::remove_file(&path).ok();

    assert_eq!(frame.step, 0);
    let expect_x: Vec<f64> = originals.iter().flat_map(|(x, _, _)| x.clone()).collect();
    let expect_y: Vec<f64> = originals.iter().flat_map(|(_, y, _)| y.clone()).collect();
    let expect_z: Vec<f64> = originals.iter().flat_map(|(_, _, z)| z.clone()).collect();
    // Bitwise equality: the doubles survive the write/read unchanged.
    assert!(frame.x.iter().zip(&expect_x).all(|(a, b)| a.to_bits() == b.to_bits()));
    assert!(frame.y.iter().zip(&expect_y).all(|(a, b)| a.to_bits() == b.to_bits()));
    assert!(frame.z.iter().zip(&expect_z).all(|(a, b)| a.to_bits() == b.to_bits()));
    assert_eq!(frame.x.len(), 100);
}
