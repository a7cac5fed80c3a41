//! C5 — slides k-mers (or minimizer cmers) across both strands of the query,
//! looking each up in the `KmerIndex` and tallying per-template scores.
//! Ported from `reassign_kmers`.
//!
//! Adjacent positions that land in the same value vector (by arena identity,
//! not structural equality) are compressed into a single run whose weight is
//! the run length — this is the `values == last` trick in the source.
//! `get_kmer` already does the two-word combine internally, so this port
//! recomputes each k-mer directly rather than maintaining a separate rolling
//! shift register; the resulting values are identical either way.

use crate::kmer_index::KmerIndex;
use crate::packed_dna::PackedDna;

pub struct ScanResult {
    pub best_templates: Vec<i64>,
}

/// Maximal runs of bases free of `N`, as `[start, end)` ranges.
fn stretches(seqlen: usize, n_positions: &[u32]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for &p in n_positions {
        let p = p as usize;
        if p > start {
            out.push((start, p));
        }
        start = p + 1;
    }
    if seqlen > start {
        out.push((start, seqlen));
    }
    out
}

/// Reduces a k-mer to a minimizer over its `mlen`-mers (the smallest
/// `mlen`-mer value found in any window of the k-mer). `stdnuc.c`'s
/// `getCmer`/`updateCmer` weren't in the retrieved source, so this is a
/// standard minimizer construction rather than a literal port. Callers gate
/// on `header.flag != 0` (mirroring `reassign_kmers`'s `flag ? getCmer(...) :
/// kmer`) rather than on `mlen` directly; `mlen` only sizes the window once
/// the reduction is already switched on.
fn minimizer(kmer: u64, kmersize: u32, mlen: u32) -> u64 {
    if mlen == 0 || mlen >= kmersize {
        return kmer;
    }
    let windows = kmersize - mlen + 1;
    let mask = if mlen >= 32 { u64::MAX } else { (1u64 << (2 * mlen)) - 1 };
    let mut best = u64::MAX;
    for w in 0..windows {
        let shift = 2 * (kmersize - mlen - w);
        let candidate = (kmer >> shift) & mask;
        if candidate < best {
            best = candidate;
        }
    }
    best
}

struct StrandScan {
    survivors: Vec<i64>,
}

fn scan_strand(
    index: &KmerIndex,
    template_lengths: &[u32],
    seq: &PackedDna,
    score: &mut [u32],
    threshold: impl Fn(usize) -> u32,
) -> StrandScan {
    let kmersize = index.header.kmersize;
    let shifter = 64 - 2 * kmersize;
    let prefix_len = index.header.prefix_len;
    let mlen = index.header.mlen;
    let use_minimizer = index.header.flag != 0;

    let mut touched: Vec<usize> = Vec::new();
    let mut last: Option<usize> = None;
    let mut reps: u32 = 0;

    let mut flush = |last: &mut Option<usize>, reps: &mut u32, touched: &mut Vec<usize>| {
        if let Some(idx) = *last {
            if *reps > 0 {
                for id in index.value_vector(idx).iter() {
                    let id = id as usize;
                    let before = score[id];
                    score[id] = score[id].saturating_add(*reps);
                    if before == 0 {
                        touched.push(id);
                    }
                }
            }
        }
        *reps = 0;
    };

    for (start, end) in stretches(seq.seqlen, &seq.n) {
        if prefix_len > 0 {
            if end <= start + prefix_len as usize {
                continue;
            }
            let prefix_shifter = 64 - 2 * prefix_len;
            let mut pos = start;
            while pos + prefix_len as usize + kmersize as usize <= end {
                let prefix_mer = seq.get_kmer(pos, prefix_shifter);
                if prefix_mer == index.header.prefix {
                    let kmer_pos = pos + prefix_len as usize;
                    let kmer = seq.get_kmer(kmer_pos, shifter);
                    let cmer = if use_minimizer { minimizer(kmer, kmersize, mlen) } else { kmer };
                    match index.lookup(cmer) {
                        Some(idx) if Some(idx) == last => reps += 1,
                        Some(idx) => {
                            flush(&mut last, &mut reps, &mut touched);
                            last = Some(idx);
                            reps = 1;
                        }
                        None => {
                            flush(&mut last, &mut reps, &mut touched);
                            last = None;
                            reps = 0;
                        }
                    }
                }
                pos += 1;
            }
        } else {
            if end < start + kmersize as usize {
                continue;
            }
            for pos in start..=(end - kmersize as usize) {
                let kmer = seq.get_kmer(pos, shifter);
                let cmer = if use_minimizer { minimizer(kmer, kmersize, mlen) } else { kmer };
                match index.lookup(cmer) {
                    Some(idx) if Some(idx) == last => reps += 1,
                    Some(idx) => {
                        flush(&mut last, &mut reps, &mut touched);
                        last = Some(idx);
                        reps = 1;
                    }
                    None => {
                        flush(&mut last, &mut reps, &mut touched);
                        last = None;
                        reps = 0;
                    }
                }
            }
        }
    }
    flush(&mut last, &mut reps, &mut touched);

    let mut survivors = Vec::new();
    for id in touched {
        if score[id] >= threshold(id) {
            survivors.push(id as i64);
        }
        score[id] = 0;
    }
    let _ = template_lengths;
    StrandScan { survivors }
}

/// Scans both strands of a query against `index`, returning the deduplicated
/// list of surviving candidate template ids (negative = reverse strand),
/// ready for `CandidateHeap::build`.
pub fn scan(index: &KmerIndex, template_lengths: &[u32], fw: &PackedDna, rc: &PackedDna) -> ScanResult {
    let db_size = template_lengths.len();
    let mut score = vec![0u32; db_size];
    let kmersize = index.header.kmersize;
    let prefix_mode = index.header.prefix_len > 0;

    let threshold = |id: usize| -> u32 {
        if prefix_mode {
            template_lengths[id]
        } else {
            template_lengths[id].saturating_sub(kmersize).saturating_add(1)
        }
    };

    if prefix_mode {
        let fw_scan = scan_strand(index, template_lengths, fw, &mut score, threshold);
        let rc_scan = scan_strand(index, template_lengths, rc, &mut score, threshold);
        let mut ids = fw_scan.survivors;
        for id in rc_scan.survivors {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ScanResult { best_templates: ids }
    } else {
        let fw_scan = scan_strand(index, template_lengths, fw, &mut score, threshold);
        let rc_scan = scan_strand(index, template_lengths, rc, &mut score, threshold);
        let mut ids: Vec<i64> = fw_scan.survivors;
        ids.extend(rc_scan.survivors.into_iter().map(|id| -id));
        ScanResult { best_templates: ids }
    }
}
