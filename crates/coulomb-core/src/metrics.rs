//! Wall-time and derived-rate heuristics for the run summary.

/// Aggregate performance summary for a finished run.
#[derive(Debug, Clone, Copy)]
pub struct PerfSummary {
    pub total_seconds: f64,
    pub gflops: f64,
    pub memory_bandwidth_gbs: f64,
}

/// Derive throughput estimates from the run shape.
///
/// FLOP heuristic: ~25 N per species-step (sort comparisons, field
/// add+divide, push). Bandwidth heuristic: 9 doubles = 72 B per particle,
/// read and written a few times per step.
pub fn estimate(steps: usize, n_global: u64, num_species: usize, total_seconds: f64) -> PerfSummary {
    let n = n_global as f64;
    let species = num_species as f64;
    let flops_per_step = 25.0 * n * species;
    let total_flops = flops_per_step * steps as f64;

    let bytes_per_step = 72.0 * n * species * 4.0;
    let total_bytes = bytes_per_step * steps as f64;

    PerfSummary {
        total_seconds,
        gflops: total_flops / (total_seconds * 1e9),
        memory_bandwidth_gbs: total_bytes / (total_seconds * 1e9),
    }
}

/// Rank-0 console block with the final rates.
pub fn print_summary(summary: &PerfSummary, ranks: usize) {
    println!("\n=== Performance Summary ===");
    println!("Total execution time: {:.3} seconds", summary.total_seconds);
    println!("Throughput: {:.3} GFLOPS", summary.gflops);
    println!(
        "Memory bandwidth: {:.3} GB/s",
        summary.memory_bandwidth_gbs
    );
    println!("Ranks: {ranks}");
    println!("===========================\n");
}
