//! C4 — the aligned consensus (`Assem`): template/match/query streams plus
//! the accumulated alignment statistics that feed `ExtendedStats` output.
//!
//! Grounded on `reassign.c`'s use of `Assem` throughout `reassign_template`
//! and on the `assem_rc`/`consensus2qseq` calls named in SPEC_FULL.md §F.

use crate::packed_dna::{PackedDna, COMPLEMENT, TO_2BIT};

/// Aligned consensus: `t`/`s`/`q` are parallel per-column byte streams
/// (template base, match marker, query base), each possibly containing `-`
/// for a gap column.
#[derive(Clone, Debug, Default)]
pub struct Consensus {
    pub t: Vec<u8>,
    pub s: Vec<u8>,
    pub q: Vec<u8>,

    pub score: u64,
    pub len: u32,
    pub aln_len: u32,
    pub cover: u32,

    pub depth: u64,
    pub depth_var: u64,
    pub var: f64,

    pub nuc_high_var: u64,
    pub max_depth: u64,
    pub snp_sum: u64,
    pub insert_sum: u64,
    pub deletion_sum: u64,

    pub read_count_aln: u32,
    pub fragment_count_aln: u32,
}

impl Consensus {
    /// Ported from `consensus2qseq`: drops gap columns entirely and returns
    /// the remaining query bytes, ready for `PackedDna::encode`.
    pub fn to_query_bytes(&self) -> Vec<u8> {
        self.q.iter().copied().filter(|&b| b != b'-').collect()
    }

    /// Ported from `assem_rc`: reverses column order and complements the
    /// template/query bases in place (the match-marker stream `s` is only
    /// reversed). Used before `MatrixRewriter::reanchor` when the winning
    /// template match was found on the reverse strand.
    pub fn reverse_complement_in_place(&mut self) {
        self.t.reverse();
        self.s.reverse();
        self.q.reverse();
        for b in self.t.iter_mut() {
            if *b != b'-' {
                *b = complement_base(*b);
            }
        }
        for b in self.q.iter_mut() {
            if *b != b'-' {
                *b = complement_base(*b);
            }
        }
    }
}

fn complement_base(b: u8) -> u8 {
    let code = TO_2BIT[b as usize];
    if code == 4 {
        b
    } else {
        let comp = code ^ COMPLEMENT;
        [b'A', b'C', b'G', b'T'][comp as usize]
    }
}

/// Convenience wrapper: packs a consensus's query stream, matching the
/// `consensus2qseq` -> `compDNA` pipeline in one call.
pub fn pack_query(assem: &Consensus) -> PackedDna {
    PackedDna::encode(&assem.to_query_bytes())
}
