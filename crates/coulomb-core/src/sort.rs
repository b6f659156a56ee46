// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Radial Sort
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Parallel histogram sort: redistributes particles by r² so that each
//! rank ends up with a contiguous, locally sorted shell of the global
//! radial order.
//!
//! Five phases: local index sort, histogram-based splitter selection
//! (every rank derives the identical splitters from the summed histogram,
//! no root bottleneck), binary-search partition, one packed all-to-all-v
//! of 9-double records, and a k-way min-heap merge of the received chunks.

use crate::cloud::ParticleCloud;
use crate::comm::Communicator;
use coulomb_types::constants::{DEGENERATE_SPAN, HISTOGRAM_BINS, PARTICLE_RECORD_LEN};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Head of one received chunk during the k-way merge.
struct MergeHead {
    r2: f64,
    record: usize,
    chunk: usize,
}

impl PartialEq for MergeHead {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeHead {}

impl PartialOrd for MergeHead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeHead {
    fn cmp(&self, other: &Self) -> Ordering {
        self.r2
            .total_cmp(&other.r2)
            .then(self.chunk.cmp(&other.chunk))
            .then(self.record.cmp(&other.record))
    }
}

/// Radial sorter with long-lived scratch buffers.
///
/// The buffers proportional to N are owned here and reused across steps,
/// so a steady-state step allocates nothing on this path.
pub struct RadialSorter {
    order: Vec<usize>,
    gather_scratch: Vec<f64>,
    local_hist: Vec<u64>,
    splitters: Vec<f64>,
    send_counts: Vec<usize>,
    send_buf: Vec<f64>,
}

impl RadialSorter {
    pub fn new() -> Self {
        RadialSorter {
            order: Vec::new(),
            gather_scratch: Vec::new(),
            local_hist: Vec::new(),
            splitters: Vec::new(),
            send_counts: Vec::new(),
            send_buf: Vec::new(),
        }
    }

    /// Sort the cloud by r², redistributing particles across ranks.
    ///
    /// Postconditions: r² is non-decreasing on every rank; rank i's
    /// largest r² is ≤ rank j's smallest for i < j (equal keys go to the
    /// lowest qualifying rank); all nine attributes of a particle travel
    /// together; the global particle count is unchanged.
    pub fn sort<C: Communicator>(&mut self, cloud: &mut ParticleCloud, comm: &C) {
        let n = cloud.len();
        cloud.compute_r2();
        self.sort_local(cloud);

        let p = comm.size();
        if p == 1 {
            return;
        }

        // Splitter selection from the shared global histogram.
        let r2_min_local = if n > 0 { cloud.r2[0] } else { f64::INFINITY };
        let r2_max_local = if n > 0 {
            cloud.r2[n - 1]
        } else {
            f64::NEG_INFINITY
        };
        let r2_min = comm.all_reduce_min(r2_min_local);
        let mut r2_max = comm.all_reduce_max(r2_max_local);
        if r2_max - r2_min < DEGENERATE_SPAN {
            // All particles share one radius; widen so binning stays defined.
            r2_max = r2_min + 1.0;
        }
        let bin_width = (r2_max - r2_min) / HISTOGRAM_BINS as f64;

        self.local_hist.clear();
        self.local_hist.resize(HISTOGRAM_BINS, 0);
        for i in 0..n {
            let bin = (((cloud.r2[i] - r2_min) / bin_width) as usize).min(HISTOGRAM_BINS - 1);
            self.local_hist[bin] += 1;
        }
        let global_hist = comm.all_reduce_sum_u64(&self.local_hist);

        let total: u64 = global_hist.iter().sum();
        let target = total.div_ceil(p as u64);
        self.splitters.clear();
        let mut cumsum = 0u64;
        for (b, &count) in global_hist.iter().enumerate() {
            if self.splitters.len() == p - 1 {
                break;
            }
            cumsum += count;
            if cumsum >= target * (self.splitters.len() as u64 + 1) {
                self.splitters.push(r2_min + (b as f64 + 1.0) * bin_width);
            }
        }
        while self.splitters.len() < p - 1 {
            self.splitters.push(r2_max);
        }

        // Partition. lower_bound semantics: equal keys go to the lowest
        // qualifying rank, keeping r² non-decreasing across the boundary.
        self.send_counts.clear();
        self.send_counts.resize(p, 0);
        for i in 0..n {
            let dest = self.splitters.partition_point(|&s| s < cloud.r2[i]);
            self.send_counts[dest] += 1;
        }
        let recv_counts = comm.all_to_all(&self.send_counts);

        // Pack into 9-double records and exchange in a single collective.
        // The local sort makes destinations non-decreasing in i, so packing
        // in particle order already groups the buffer by destination rank.
        self.send_buf.clear();
        self.send_buf.reserve(n * PARTICLE_RECORD_LEN);
        for i in 0..n {
            self.send_buf.extend_from_slice(&[
                cloud.x[i],
                cloud.y[i],
                cloud.z[i],
                cloud.vx[i],
                cloud.vy[i],
                cloud.vz[i],
                cloud.q[i],
                cloud.e_r[i],
                cloud.r2[i],
            ]);
        }
        let send_packed: Vec<usize> = self
            .send_counts
            .iter()
            .map(|c| c * PARTICLE_RECORD_LEN)
            .collect();
        let recv_packed: Vec<usize> = recv_counts
            .iter()
            .map(|c| c * PARTICLE_RECORD_LEN)
            .collect();
        let recv_buf = comm.all_to_all_v(&self.send_buf, &send_packed, &recv_packed);

        // K-way merge: each source chunk arrived sorted, so a min-heap over
        // the chunk heads yields the merged order in O(n_recv · log P).
        let n_recv: usize = recv_counts.iter().sum();
        let mut chunk_end = vec![0usize; p];
        let mut heap = BinaryHeap::with_capacity(p);
        let mut cursor = 0usize;
        for (c, &count) in recv_counts.iter().enumerate() {
            let start = cursor;
            cursor += count;
            chunk_end[c] = cursor;
            if count > 0 {
                heap.push(Reverse(MergeHead {
                    r2: recv_buf[start * PARTICLE_RECORD_LEN + 8],
                    record: start,
                    chunk: c,
                }));
            }
        }

        cloud.resize(n_recv);
        let mut out = 0usize;
        while let Some(Reverse(head)) = heap.pop() {
            let base = head.record * PARTICLE_RECORD_LEN;
            cloud.x[out] = recv_buf[base];
            cloud.y[out] = recv_buf[base + 1];
            cloud.z[out] = recv_buf[base + 2];
            cloud.vx[out] = recv_buf[base + 3];
            cloud.vy[out] = recv_buf[base + 4];
            cloud.vz[out] = recv_buf[base + 5];
            cloud.q[out] = recv_buf[base + 6];
            cloud.e_r[out] = recv_buf[base + 7];
            cloud.r2[out] = recv_buf[base + 8];
            out += 1;

            let next = head.record + 1;
            if next < chunk_end[head.chunk] {
                heap.push(Reverse(MergeHead {
                    r2: recv_buf[next * PARTICLE_RECORD_LEN + 8],
                    record: next,
                    chunk: head.chunk,
                }));
            }
        }
        debug_assert_eq!(out, n_recv);
    }

    /// Local ascending index sort by r², applied to every field as an
    /// out-of-place gather.
    fn sort_local(&mut self, cloud: &mut ParticleCloud) {
        let n = cloud.len();
        self.order.clear();
        self.order.extend(0..n);
        {
            let r2 = &cloud.r2;
            self.order
                .sort_unstable_by(|&a, &b| r2[a].total_cmp(&r2[b]));
        }
        for field in cloud.fields_mut() {
            self.gather_scratch.clear();
            self.gather_scratch
                .extend(self.order.iter().map(|&j| field[j]));
            for (i, v) in self.gather_scratch.iter().enumerate() {
                field[i] = *v;
            }
        }
    }
}

impl Default for RadialSorter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::seed_for_rank;
    use crate::comm::{run_on_ranks, SelfComm};

    fn scrambled_cloud(n: usize) -> ParticleCloud {
        let mut cloud = ParticleCloud::new("e", 1.0, n, n as u64);
        for i in 0..n {
            // Deterministic scatter of radii, unique per particle.
            let t = ((i * 73 + 17) % n) as f64 / n as f64;
            cloud.x[i] = 0.1 + t;
            cloud.y[i] = 0.5 - t * 0.3;
            cloud.z[i] = t * t;
            cloud.vx[i] = i as f64;
            cloud.q[i] = 1.0 + i as f64; // unique tag per particle
        }
        cloud
    }

    fn assert_locally_sorted(cloud: &ParticleCloud) {
        for i in 1..cloud.len() {
            assert!(
                cloud.r2[i - 1] <= cloud.r2[i],
                "r2 not sorted at {i}: {} > {}",
                cloud.r2[i - 1],
                cloud.r2[i]
            );
        }
    }

    #[test]
    fn test_single_rank_sorts_and_keeps_attributes_together() {
        let mut cloud = scrambled_cloud(64);
        cloud.compute_r2();
        let before: Vec<(f64, f64, f64, f64)> = (0..cloud.len())
            .map(|i| (cloud.q[i], cloud.x[i], cloud.vx[i], cloud.r2[i]))
            .collect();

        let mut sorter = RadialSorter::new();
        sorter.sort(&mut cloud, &SelfComm);

        assert_eq!(cloud.len(), 64);
        assert_locally_sorted(&cloud);
        // Every particle, identified by its unique charge tag, still
        // carries its original attributes.
        for i in 0..cloud.len() {
            let original = before
                .iter()
                .find(|(tag, _, _, _)| *tag == cloud.q[i])
                .expect("tag must survive the sort");
            assert_eq!(original.1, cloud.x[i]);
            assert_eq!(original.2, cloud.vx[i]);
            assert_eq!(original.3, cloud.r2[i]);
        }
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut cloud = scrambled_cloud(50);
        let mut sorter = RadialSorter::new();
        sorter.sort(&mut cloud, &SelfComm);
        let snapshot = cloud.clone();
        sorter.sort(&mut cloud, &SelfComm);
        assert_eq!(snapshot.x, cloud.x);
        assert_eq!(snapshot.vz, cloud.vz);
        assert_eq!(snapshot.r2, cloud.r2);
    }

    #[test]
    fn test_multi_rank_global_order() {
        for p in [2usize, 4, 8] {
            let results = run_on_ranks(p, |comm| {
                let n_global = 40 * comm.size() as u64;
                let mut cloud = ParticleCloud::sample_sphere(
                    "e",
                    1.0,
                    40,
                    n_global,
                    1.0,
                    0.1,
                    seed_for_rank(10, comm.rank()),
                );
                let mut sorter = RadialSorter::new();
                sorter.sort(&mut cloud, &comm);
                assert_locally_sorted(&cloud);
                (cloud.len(), cloud.r2.to_vec())
            });

            let total: usize = results.iter().map(|(n, _)| n).sum();
            assert_eq!(total, 40 * p, "particles lost or duplicated at P={p}");

            // Concatenation over ranks must be globally non-decreasing.
            let mut last = f64::NEG_INFINITY;
            for (_, r2s) in &results {
                for &v in r2s {
                    assert!(v >= last, "global order broken at P={p}");
                    last = v;
                }
            }
        }
    }

    #[test]
    fn test_degenerate_equal_radii() {
        // Every particle at the same point: the bin-width guard must fire
        // and the sort must still succeed with all counts preserved.
        let results = run_on_ranks(4, |comm| {
            let mut cloud = ParticleCloud::new("e", 1.0, 25, 100);
            for i in 0..cloud.len() {
                cloud.x[i] = 1.0;
                cloud.q[i] = 0.01;
            }
            let mut sorter = RadialSorter::new();
            sorter.sort(&mut cloud, &comm);
            for i in 0..cloud.len() {
                assert!((cloud.r2[i] - 1.0).abs() < 1e-15);
            }
            cloud.len()
        });
        assert_eq!(results.iter().sum::<usize>(), 100);
    }

    #[test]
    fn test_empty_rank_tolerated() {
        // One rank starts with everything; the sort spreads it out.
        let results = run_on_ranks(3, |comm| {
            let n = if comm.rank() == 0 { 60 } else { 0 };
            let mut cloud =
                ParticleCloud::sample_sphere("e", 1.0, n, 60, 1.0, 0.1, seed_for_rank(10, 0));
            let mut sorter = RadialSorter::new();
            sorter.sort(&mut cloud, &comm);
            assert_locally_sorted(&cloud);
            cloud.len()
        });
        assert_eq!(results.iter().sum::<usize>(), 60);
    }
}
