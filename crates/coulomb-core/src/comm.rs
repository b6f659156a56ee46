// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Communicator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Bulk-synchronous collective operations over a flat set of P ranks.
//!
//! The trait mirrors the MPI collective surface one-to-one, so an rsmpi
//! binding can be wired in as a third implementation without touching the
//! solver components. The bindings shipped here are `SelfComm` (P = 1,
//! every collective is a local identity) and `ThreadComm` (P in-process
//! ranks on OS threads, rendezvousing through a shared hub).
//!
//! Contract: ranks issue the same sequence of collectives in the same
//! order; no rank leaves a collective before all have entered it. All
//! reductions fold contributions in rank order, so results for a fixed P
//! are deterministic. Collective failure is not recoverable — a broken
//! collective aborts the process group, so the methods return values
//! directly rather than `Result`.

use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};

pub trait Communicator: Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn all_reduce_sum(&self, value: f64) -> f64;
    fn all_reduce_min(&self, value: f64) -> f64;
    fn all_reduce_max(&self, value: f64) -> f64;
    /// Elementwise sum reduction of equal-length count vectors.
    fn all_reduce_sum_u64(&self, values: &[u64]) -> Vec<u64>;

    /// Sum of the contributions of all ranks below this one; 0 on rank 0.
    fn exclusive_scan_sum(&self, value: f64) -> f64;

    /// Each rank sends one count to every rank; returns what each source
    /// rank sent to this one.
    fn all_to_all(&self, send_counts: &[usize]) -> Vec<usize>;

    /// Variable all-to-all of a packed f64 payload. `send` holds the
    /// segments for ranks 0..P back to back, with lengths `send_counts`.
    /// Returns the segments received from ranks 0..P, concatenated;
    /// `recv_counts` must match what the sources actually send.
    fn all_to_all_v(&self, send: &[f64], send_counts: &[usize], recv_counts: &[usize])
        -> Vec<f64>;

    fn all_gather(&self, value: usize) -> Vec<usize>;
    fn all_gather_v(&self, send: &[f64]) -> Vec<f64>;

    /// Root-0 gather; `Some` on rank 0, `None` elsewhere.
    fn gather(&self, value: usize) -> Option<Vec<usize>>;
    fn gather_v(&self, send: &[f64]) -> Option<Vec<f64>>;

    fn barrier(&self);
}

// ── Single-rank binding ──────────────────────────────────────────────

/// The P = 1 communicator: every collective degenerates to the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_min(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_sum_u64(&self, values: &[u64]) -> Vec<u64> {
        values.to_vec()
    }

    fn exclusive_scan_sum(&self, _value: f64) -> f64 {
        0.0
    }

    fn all_to_all(&self, send_counts: &[usize]) -> Vec<usize> {
        debug_assert_eq!(send_counts.len(), 1);
        send_counts.to_vec()
    }

    fn all_to_all_v(
        &self,
        send: &[f64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<f64> {
        debug_assert_eq!(send_counts, recv_counts);
        debug_assert_eq!(send_counts.iter().sum::<usize>(), send.len());
        send.to_vec()
    }

    fn all_gather(&self, value: usize) -> Vec<usize> {
        vec![value]
    }

    fn all_gather_v(&self, send: &[f64]) -> Vec<f64> {
        send.to_vec()
    }

    fn gather(&self, value: usize) -> Option<Vec<usize>> {
        Some(vec![value])
    }

    fn gather_v(&self, send: &[f64]) -> Option<Vec<f64>> {
        Some(send.to_vec())
    }

    fn barrier(&self) {}
}

// ── In-process multi-rank binding ────────────────────────────────────

struct HubState {
    round: u64,
    arrived: usize,
    slots: Vec<Option<Box<dyn Any + Send>>>,
    published: Option<Arc<dyn Any + Send + Sync>>,
    failed: bool,
}

/// Rendezvous point shared by the P `ThreadComm` handles of one job.
///
/// One collective is one round: every rank deposits its contribution into
/// its slot; the last arrival publishes the full contribution vector and
/// wakes the rest. Nobody proceeds past a round before it is published,
/// which is exactly the synchronization barrier the collectives require.
pub struct CollectiveHub {
    nranks: usize,
    state: Mutex<HubState>,
    round_complete: Condvar,
}

impl CollectiveHub {
    pub fn new(nranks: usize) -> Self {
        assert!(nranks >= 1, "a communicator needs at least one rank");
        CollectiveHub {
            nranks,
            state: Mutex::new(HubState {
                round: 0,
                arrived: 0,
                slots: (0..nranks).map(|_| None).collect(),
                published: None,
                failed: false,
            }),
            round_complete: Condvar::new(),
        }
    }

    /// Mark the job dead and wake every waiter. A rank that dies inside a
    /// step must collapse the whole communicator, not leave peers blocked
    /// in a collective.
    fn mark_failed(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.failed = true;
        }
        self.round_complete.notify_all();
    }

    /// Deposit `value` for `rank` and return every rank's contribution,
    /// in rank order. Blocks until all ranks of the round have deposited.
    fn exchange<T: Clone + Send + Sync + 'static>(&self, rank: usize, value: T) -> Arc<Vec<T>> {
        let mut st = self.state.lock().expect("collective hub poisoned");
        assert!(!st.failed, "a peer rank died; communicator collapsed");
        let round = st.round;
        debug_assert!(
            st.slots[rank].is_none(),
            "rank {rank} deposited twice in one collective round"
        );
        st.slots[rank] = Some(Box::new(value));
        st.arrived += 1;

        if st.arrived == self.nranks {
            let mut all = Vec::with_capacity(self.nranks);
            for slot in st.slots.iter_mut() {
                let boxed = slot.take().expect("slot empty at publish");
                let typed = boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("ranks issued mismatched collectives in one round"));
                all.push(*typed);
            }
            st.published = Some(Arc::new(all));
            st.arrived = 0;
            st.round += 1;
            self.round_complete.notify_all();
        } else {
            while st.round == round && !st.failed {
                st = self
                    .round_complete
                    .wait(st)
                    .expect("collective hub poisoned");
            }
            assert!(!st.failed, "a peer rank died; communicator collapsed");
        }

        let published = st
            .published
            .as_ref()
            .expect("collective round published without a result")
            .clone();
        published
            .downcast::<Vec<T>>()
            .unwrap_or_else(|_| panic!("ranks issued mismatched collectives in one round"))
    }
}

/// One rank's handle onto an in-process communicator of P ranks.
pub struct ThreadComm {
    hub: Arc<CollectiveHub>,
    rank: usize,
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.nranks
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        self.hub.exchange(self.rank, value).iter().sum()
    }

    fn all_reduce_min(&self, value: f64) -> f64 {
        self.hub
            .exchange(self.rank, value)
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        self.hub
            .exchange(self.rank, value)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn all_reduce_sum_u64(&self, values: &[u64]) -> Vec<u64> {
        let all = self.hub.exchange(self.rank, values.to_vec());
        let mut out = vec![0u64; values.len()];
        for contribution in all.iter() {
            debug_assert_eq!(contribution.len(), out.len());
            for (o, v) in out.iter_mut().zip(contribution) {
                *o += v;
            }
        }
        out
    }

    fn exclusive_scan_sum(&self, value: f64) -> f64 {
        let all = self.hub.exchange(self.rank, value);
        all[..self.rank].iter().sum()
    }

    fn all_to_all(&self, send_counts: &[usize]) -> Vec<usize> {
        debug_assert_eq!(send_counts.len(), self.size());
        let all = self.hub.exchange(self.rank, send_counts.to_vec());
        all.iter().map(|counts| counts[self.rank]).collect()
    }

    fn all_to_all_v(
        &self,
        send: &[f64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<f64> {
        debug_assert_eq!(send_counts.iter().sum::<usize>(), send.len());
        let all = self
            .hub
            .exchange(self.rank, (send.to_vec(), send_counts.to_vec()));

        let total_recv: usize = recv_counts.iter().sum();
        let mut recv = Vec::with_capacity(total_recv);
        for (src, (buf, counts)) in all.iter().enumerate() {
            let offset: usize = counts[..self.rank].iter().sum();
            let len = counts[self.rank];
            debug_assert_eq!(
                len, recv_counts[src],
                "recv_counts disagree with what rank {src} sent"
            );
            recv.extend_from_slice(&buf[offset..offset + len]);
        }
        recv
    }

    fn all_gather(&self, value: usize) -> Vec<usize> {
        self.hub.exchange(self.rank, value).as_ref().clone()
    }

    fn all_gather_v(&self, send: &[f64]) -> Vec<f64> {
        let all = self.hub.exchange(self.rank, send.to_vec());
        all.iter().flatten().copied().collect()
    }

    fn gather(&self, value: usize) -> Option<Vec<usize>> {
        let all = self.hub.exchange(self.rank, value);
        (self.rank == 0).then(|| all.as_ref().clone())
    }

    fn gather_v(&self, send: &[f64]) -> Option<Vec<f64>> {
        let all = self.hub.exchange(self.rank, send.to_vec());
        (self.rank == 0).then(|| all.iter().flatten().copied().collect())
    }

    fn barrier(&self) {
        self.hub.exchange(self.rank, ());
    }
}

/// Run the SPMD closure `f` once per rank on `nranks` OS threads sharing
/// one hub; returns the per-rank results in rank order. A panicking rank
/// collapses the whole job, matching the fatal-global failure model.
pub fn run_on_ranks<T, F>(nranks: usize, f: F) -> Vec<T>
where
    F: Fn(ThreadComm) -> T + Sync,
    T: Send,
{
    let hub = Arc::new(CollectiveHub::new(nranks));
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..nranks)
            .map(|rank| {
                let comm = ThreadComm {
                    hub: Arc::clone(&hub),
                    rank,
                };
                let f = &f;
                let hub = Arc::clone(&hub);
                scope.spawn(move || {
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(comm))) {
                        Ok(result) => result,
                        Err(payload) => {
                            hub.mark_failed();
                            std::panic::resume_unwind(payload);
                        }
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}
