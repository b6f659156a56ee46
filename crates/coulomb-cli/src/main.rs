// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use anyhow::{bail, Context, Result};
use clap::Parser;
use coulomb_core::comm::{run_on_ranks, SelfComm};
use coulomb_core::driver::{run_simulation, OutputPolicy, RunSummary, SeedMode};
use coulomb_core::energy::EnergyMethod;
use coulomb_types::config::SimulationConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "coulomb",
    version,
    about = "Distributed radial solver for Coulomb-explosion dynamics"
)]
struct Args {
    /// Input deck (N, R, dt, tend, SAVE_INTERVAL, species ...)
    input_file: String,

    /// Save binary particle positions at the save cadence
    #[arg(short = 'p')]
    save_positions: bool,

    /// Save the per-species CSV series (on by default)
    #[arg(short = 's')]
    save_series: bool,

    /// Save the energy distribution (reserved, currently a no-op)
    #[arg(short = 'e')]
    save_energy_distribution: bool,

    /// Disable all output (benchmark mode)
    #[arg(short = 'n')]
    no_save: bool,

    /// Number of in-process ranks to run on
    #[arg(long, default_value_t = 1)]
    ranks: usize,

    /// Use the O(N) Gauss-law potential instead of the exact O(N²) sum
    #[arg(long)]
    fast_energy: bool,

    /// Output directory
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    // Bad arguments exit with code 1, like an unreadable input deck.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            err.print().ok();
            std::process::exit(1);
        }
    };

    if args.ranks == 0 {
        bail!("--ranks must be >= 1");
    }
    if args.save_energy_distribution {
        log::warn!("-e is reserved; no energy-distribution output is produced");
    }

    if args.save_series && args.no_save {
        log::warn!("-n disables all output and overrides -s");
    }

    let config = SimulationConfig::from_file(&args.input_file)?;

    let policy = OutputPolicy {
        output_dir: args.output_dir.clone(),
        save_positions: args.save_positions && !args.no_save,
        // The CSV series is on by default; -s is its explicit spelling.
        save_series: !args.no_save,
        save_energy_distribution: args.save_energy_distribution,
    };
    let method = if args.fast_energy {
        EnergyMethod::GaussLaw
    } else {
        EnergyMethod::Exact
    };

    if policy.save_positions || policy.save_series {
        write_manifest(&args, &config, method)?;
    }

    let summary = if args.ranks == 1 {
        run_simulation(&config, &policy, method, SeedMode::RankOffset, &SelfComm)?
    } else {
        let results = run_on_ranks(args.ranks, |comm| {
            run_simulation(&config, &policy, method, SeedMode::RankOffset, &comm)
        });
        let mut root: Option<RunSummary> = None;
        for (rank, result) in results.into_iter().enumerate() {
            let summary = result.with_context(|| format!("rank {rank} failed"))?;
            if rank == 0 {
                root = Some(summary);
            }
        }
        root.expect("rank 0 always reports a summary")
    };

    log::info!(
        "done: {} steps, relative energy drift {:.3e}",
        summary.steps,
        summary.relative_drift
    );
    Ok(())
}

/// Provenance record for the run: resolved config plus execution shape.
fn write_manifest(args: &Args, config: &SimulationConfig, method: EnergyMethod) -> Result<()> {
    std::fs::create_dir_all(&args.output_dir)?;
    let manifest = serde_json::json!({
        "config": config,
        "ranks": args.ranks,
        "energy_method": match method {
            EnergyMethod::Exact => "exact",
            EnergyMethod::GaussLaw => "gauss-law",
        },
        "save_positions": args.save_positions,
        "save_series": !args.no_save,
    });
    let path = args.output_dir.join("run_manifest.json");
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
