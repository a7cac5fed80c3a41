//! C9 — the extended per-template feature reduction, split across worker
//! threads by atomically-claimed chunks. Ported from `ef.c`'s
//! `getExtendedFeatures`.
//!
//! The original guards its shared aggregate with a process-wide spinlock and
//! a hand-rolled "first-entering-worker initializes, last one signals
//! completion" countdown, including a known bug where the chunk cursor's
//! overflow check (`(next += chunk) < 0`) is undefined behavior on signed
//! overflow in C. This port uses `AtomicI64` (which wraps, not UB, and in
//! practice never gets near overflow since chunk claims stay bounded by
//! `t_len`) for the cursor, a `Mutex` for the aggregate, and `std::sync::
//! Barrier` in place of the spin/countdown dance — same ordering guarantee
//! (no thread observes the folded aggregate until every thread has
//! contributed), constructed up front instead of raced into existence.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Barrier, Mutex};

use crate::consensus::Consensus;
use crate::matrix::AssemblyMatrix;
use crate::packed_dna::PackedDna;

const CHUNK: i64 = 8112;

/// Rescales `depth`/`depth_var` into a population variance, widening through
/// `f64` to avoid the integer overflow the source's fixed-point rescale
/// guarded against. Treated as an external utility per spec.md §4.7; called
/// once, single-threaded, before `ExtendedStats` workers start.
pub fn fix_var_overflow(assem: &mut Consensus, t_len: u32) {
    if t_len == 0 {
        assem.var = 0.0;
        return;
    }
    let t_len = t_len as f64;
    let mean = assem.depth as f64 / t_len;
    let mean_of_squares = assem.depth_var as f64 / t_len;
    assem.var = (mean_of_squares - mean * mean).max(0.0);
}

#[derive(Default)]
struct Aggregate {
    nuc_high_var: u64,
    max_depth: u64,
    snp_sum: u64,
    insert_sum: u64,
    deletion_sum: u64,
}

pub struct ExtendedStats {
    next: AtomicI64,
    agg: Mutex<Aggregate>,
    barrier: Barrier,
}

impl ExtendedStats {
    pub fn new(thread_num: usize) -> ExtendedStats {
        ExtendedStats {
            next: AtomicI64::new(0),
            agg: Mutex::new(Aggregate::default()),
            barrier: Barrier::new(thread_num.max(1)),
        }
    }

    /// One call per worker thread; every worker shares the same `depth`/`var`
    /// (already rescaled by `fix_var_overflow`) to compute the high-variance
    /// threshold, then races to claim `CHUNK`-sized slices of `[0, t_len)`
    /// until the range is exhausted.
    pub fn run_worker(&self, depth: u64, var: f64, t_len: u32, matrix: &AssemblyMatrix, tseq: &PackedDna) {
        let high_var_threshold = depth as f64 / t_len.max(1) as f64 + 3.0 * var.sqrt();

        let mut local = Aggregate::default();
        loop {
            let start = self.next.fetch_add(CHUNK, Ordering::SeqCst);
            if start >= t_len as i64 {
                break;
            }
            let end = ((start + CHUNK) as u32).min(t_len);
            let mut pos = start as u32;
            while pos < end {
                let node = &matrix.nodes[pos as usize];
                let depth_here = node.depth();
                let ref_base = tseq.get_base(pos as usize) as usize;
                let matched = node.counts[ref_base] as u64;
                local.snp_sum += depth_here.saturating_sub(matched);
                local.deletion_sum += node.counts[5] as u64;

                let total = node.total();
                local.max_depth = local.max_depth.max(total);
                if (total as f64) > high_var_threshold {
                    local.nuc_high_var += 1;
                }

                let mut ins = node.next;
                while ins != 0 && (ins as u32) >= t_len {
                    let inode = &matrix.nodes[ins as usize];
                    local.insert_sum += inode.depth();
                    let itotal = inode.total();
                    local.max_depth = local.max_depth.max(itotal);
                    if (itotal as f64) > high_var_threshold {
                        local.nuc_high_var += 1;
                    }
                    ins = inode.next;
                }
                pos += 1;
            }
        }

        let mut agg = self.agg.lock().unwrap();
        agg.nuc_high_var += local.nuc_high_var;
        agg.max_depth = agg.max_depth.max(local.max_depth);
        agg.snp_sum += local.snp_sum;
        agg.insert_sum += local.insert_sum;
        agg.deletion_sum += local.deletion_sum;
        drop(agg);

        self.barrier.wait();
    }

    /// Folds the final aggregate into `assem`, called once after all workers
    /// have returned from `run_worker`. Also applies the
    /// `fragmentCountAln = max(fragmentCountAln, ceil(readCountAln/2))` bump.
    pub fn apply(&self, assem: &mut Consensus) {
        let agg = self.agg.lock().unwrap();
        assem.nuc_high_var = agg.nuc_high_var;
        assem.max_depth = agg.max_depth;
        assem.snp_sum = agg.snp_sum;
        assem.insert_sum = agg.insert_sum;
        assem.deletion_sum = agg.deletion_sum;
        assem.fragment_count_aln = assem
            .fragment_count_aln
            .max(assem.read_count_aln.div_ceil(2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{AssemblyMatrix, AssemblyNode};

    fn node(counts: [u16; 6], next: u32) -> AssemblyNode {
        AssemblyNode { counts, next }
    }

    #[test]
    fn fix_var_overflow_computes_population_variance() {
        let mut assem = Consensus { depth: 20, depth_var: 104, ..Default::default() };
        fix_var_overflow(&mut assem, 4);
        // mean=5, mean_of_squares=26 -> var = 26 - 25 = 1
        assert!((assem.var - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_threaded_run_matches_naive_sum() {
        let matrix = AssemblyMatrix::new(vec![
            node([5, 0, 0, 0, 0, 2], 1),
            node([0, 5, 0, 0, 0, 0], 0),
        ]);
        let tseq = PackedDna::encode(b"AC");
        let mut assem = Consensus { depth: 10, depth_var: 50, ..Default::default() };
        fix_var_overflow(&mut assem, 2);

        let stats = ExtendedStats::new(1);
        stats.run_worker(assem.depth, assem.var, 2, &matrix, &tseq);
        stats.apply(&mut assem);

        assert_eq!(assem.deletion_sum, 2);
        assert_eq!(assem.snp_sum, 0); // both columns match the reference base
        assert_eq!(assem.max_depth, 7);
    }

    #[test]
    fn result_is_independent_of_thread_count() {
        let build_matrix = || {
            AssemblyMatrix::new(vec![
                node([5, 0, 0, 0, 0, 1], 1),
                node([0, 5, 0, 0, 0, 0], 2),
                node([0, 0, 5, 0, 0, 0], 3),
                node([0, 0, 0, 5, 0, 0], 0),
            ])
        };
        let tseq = PackedDna::encode(b"ACGT");

        let run_with = |threads: usize| {
            let matrix = build_matrix();
            let mut assem = Consensus { depth: 20, depth_var: 104, ..Default::default() };
            fix_var_overflow(&mut assem, 4);
            let stats = ExtendedStats::new(threads);
            std::thread::scope(|scope| {
                for _ in 0..threads {
                    let stats = &stats;
                    let matrix = &matrix;
                    let tseq = &tseq;
                    let (depth, var) = (assem.depth, assem.var);
                    scope.spawn(move || stats.run_worker(depth, var, 4, matrix, tseq));
                }
            });
            stats.apply(&mut assem);
            (assem.snp_sum, assem.deletion_sum, assem.max_depth)
        };

        assert_eq!(run_with(1), run_with(4));
    }
}
