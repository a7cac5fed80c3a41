//! C7 — exact substring matching over packed DNA, respecting `N`
//! breakpoints and either strand. Ported from `reassign_getoffset`,
//! `reassign_cmpseqs`, `reassign_testNs`, `reassign_matchseqs`, and
//! `reassign_matchseqs_rc`.

use crate::packed_dna::PackedDna;

/// Finds the offset in `consensus` where `candidate` occurs exactly, or `-1`
/// if it doesn't (including when no `N`-free stretch of `consensus` is long
/// enough to hold it). Ported from `reassign_matchseqs`.
pub fn match_exact(consensus: &PackedDna, candidate: &PackedDna) -> i64 {
    let cand_len = candidate.seqlen as i64;
    let cons_len = consensus.seqlen as i64;

    // Pre-scan: is there any `N`-free stretch long enough for `candidate`?
    let mut start: i64 = 0;
    for &npos in &consensus.n {
        let npos = npos as i64;
        if cand_len <= npos - start {
            break;
        } else if cons_len - npos < cand_len {
            return -1;
        } else {
            start = npos + 1;
        }
    }

    start -= 1;
    let mut m: i64 = 1;
    while m != 0 {
        start += 1;
        if start < 0 || cand_len > cons_len - start {
            break;
        }
        let offset = get_offset(consensus, candidate.first_word(), start);
        start = if offset >= 0 { offset } else { cand_len };
        m = cmp_seqs(consensus, candidate, start);
        if m == 0 {
            let block = test_ns(&consensus.n, start, start + cand_len);
            if block != 0 {
                m = block;
                start = block;
            }
        }
    }
    if m != 0 {
        -1
    } else {
        start
    }
}

/// Ported from `reassign_getoffset`: scans forward from `start` for the
/// first position whose full 64-bit window equals `kmer`.
fn get_offset(consensus: &PackedDna, kmer: u64, start: i64) -> i64 {
    let mut offset = start - 1;
    let mut qmer = kmer.wrapping_add(1);
    while qmer != kmer {
        offset += 1;
        if offset < 0 || offset as usize >= consensus.seqlen {
            break;
        }
        qmer = consensus.get_kmer(offset as usize, 0);
    }
    if qmer == kmer {
        offset
    } else {
        -1
    }
}

/// Ported from `reassign_cmpseqs`: word-by-word comparison of `candidate`
/// against `consensus` starting at `offset`. Faithfully reproduces the
/// source's `while(--complen)` loop bound, which for a candidate whose
/// length is an exact multiple of 32 never re-verifies the final full word
/// (that word was already implicitly confirmed by the anchor search in
/// `get_offset`, which matches on the first word only) — not a deviation,
/// the original has the same comparison depth.
fn cmp_seqs(consensus: &PackedDna, candidate: &PackedDna, offset: i64) -> i64 {
    if offset < 0 {
        return -1;
    }
    let len = candidate.seqlen as u64;
    let mut complen = (len >> 5) + if (len & 31) != 0 { 1 } else { 0 };
    let mut offset = offset as usize;
    let mut target_idx = 0usize;

    while {
        complen -= 1;
        complen != 0
    } {
        let kmer = consensus.get_kmer(offset, 0);
        let word = candidate.seq[target_idx];
        if word != kmer {
            return if word < kmer { -1 } else { 1 };
        }
        target_idx += 1;
        offset += 32;
    }

    if (len & 31) != 0 {
        let shift = 64 - ((len & 31) << 1);
        let kmer = consensus.get_kmer(offset, shift as u32) << shift;
        let word = candidate.seq[target_idx];
        if word != kmer {
            return if word < kmer { -1 } else { 1 };
        }
    }
    0
}

/// Ported from `reassign_testNs`: returns the first `N` position strictly
/// inside `(start, end)`, or `0` if none.
fn test_ns(n_positions: &[u32], start: i64, end: i64) -> i64 {
    for &p in n_positions {
        let p = p as i64;
        if p >= end {
            break;
        }
        if start < p && p < end {
            return p;
        }
    }
    0
}

/// Ported from `reassign_matchseqs_rc`. The control flow is inverted from
/// what the name implies: it only tries the reverse-complement consensus
/// when the forward attempt returns a *nonzero* result (which includes any
/// forward match offset other than exactly 0, not just "no match"), and
/// whenever it doesn't try the rc strand it returns `0` rather than the
/// forward match offset. `reassign_template`'s own call site never uses this
/// helper (it dispatches directly on the prefix/sign convention instead);
/// kept here verbatim for API completeness per SPEC_FULL.md §F.
pub fn match_either_strand_legacy(consensus_fw: &PackedDna, consensus_rc: &PackedDna, candidate: &PackedDna) -> i64 {
    if match_exact(consensus_fw, candidate) != 0 {
        match_exact(consensus_rc, candidate)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_exact_substring() {
        let consensus = PackedDna::encode(b"ACGTTTGGCCAATTCGATCGATCG");
        for start in [0usize, 5, 12] {
            let candidate = PackedDna::encode(&consensus.decode()[start..start + 8]);
            assert_eq!(match_exact(&consensus, &candidate), start as i64);
        }
    }

    #[test]
    fn rejects_candidate_not_present() {
        let consensus = PackedDna::encode(b"ACGTACGTACGTACGTACGTACGT");
        let candidate = PackedDna::encode(b"TTTTTTTT");
        assert_eq!(match_exact(&consensus, &candidate), -1);
    }

    #[test]
    fn rejects_placement_spanning_an_n() {
        let consensus = PackedDna::encode(b"ACGTACGTNNACGTACGTACGTAC");
        let candidate = PackedDna::encode(b"GTNNAC"); // would need to straddle the N run
        assert_eq!(match_exact(&consensus, &candidate), -1);
    }

    #[test]
    fn candidate_longer_than_any_n_free_stretch_is_rejected() {
        let consensus = PackedDna::encode(b"ACGTNACGTNACGTNACGTN");
        let candidate = PackedDna::encode(b"ACGTACGT");
        assert_eq!(match_exact(&consensus, &candidate), -1);
    }
}
