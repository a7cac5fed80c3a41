//! Orchestrator: ties C1-C9 together into the one call the surrounding
//! pipeline makes per already-assembled consensus. Ported from
//! `reassign_template`'s control flow (the scan/heap/match/rewrite/stats
//! pipeline), with its init block (`seq_indexes`/`name_indexes` prefix sums,
//! built once and reused) becoming `ReassignCore::new`.

use std::fs::File;

use anyhow::Result;

use crate::consensus::{pack_query, Consensus};
use crate::heap::{norm, CandidateHeap};
use crate::kmer_index::KmerIndex;
use crate::matcher;
use crate::matrix::AssemblyMatrix;
use crate::packed_dna::PackedDna;
use crate::rewriter;
use crate::scanner;
use crate::stats::{fix_var_overflow, ExtendedStats};
use crate::template_db;

/// The one caller-tunable knob `ExtendedStats` needs; mirrors the teacher's
/// CLI-derived thread count but as a plain constructor argument, since this
/// crate has no CLI layer of its own.
#[derive(Clone, Copy, Debug)]
pub struct ReassignConfig {
    pub thread_num: usize,
}

/// The outcome of a single `reassign_template` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReassignOutcome {
    /// The new template id, or `0` if no candidate matched exactly.
    pub template_id: u32,
    /// The new template's name, loaded from `.name`, when `template_id != 0`.
    pub template_name: Option<String>,
}

/// Process-wide state tied to one database: the k-mer index plus the
/// prefix-sum tables into `.seq.b`/`.name`, built once and reused across
/// calls to `reassign_template`. Dropping a `ReassignCore` (or calling
/// `teardown` explicitly, for symmetry with the source's lazy-init/explicit-
/// destroy scratch) releases all of it; Rust's ownership model makes the
/// lazy half of that lifecycle unnecessary; everything here is built eagerly
/// in `new`.
pub struct ReassignCore {
    pub index: KmerIndex,
    pub template_lengths: Vec<u32>,
    pub seq_indexes: Vec<u64>,
    pub name_indexes: Vec<u64>,
    pub config: ReassignConfig,
}

impl ReassignCore {
    /// `template_lengths` is 1-indexed (`template_lengths[0]` is an unused
    /// sentinel, matching the id convention); `name_file`'s cursor is
    /// restored to wherever it started.
    pub fn new(
        index: KmerIndex,
        template_lengths: Vec<u32>,
        name_file: &mut File,
        config: ReassignConfig,
    ) -> Result<ReassignCore> {
        let seq_indexes = template_db::build_seq_indexes(&template_lengths);
        let name_indexes = template_db::build_name_indexes(name_file, template_lengths.len() - 1)?;
        Ok(ReassignCore { index, template_lengths, seq_indexes, name_indexes, config })
    }

    /// Explicit teardown for symmetry with the source's destroy call; simply
    /// consumes `self` so the scratch state cannot be used again.
    pub fn teardown(self) {}

    fn load_candidate(&self, seq_file: &mut File, id: usize) -> Result<PackedDna> {
        let len = self.template_lengths[id];
        let words = template_db::load_seq(seq_file, len, self.seq_indexes[id])?;
        Ok(PackedDna::from_words(words, len as usize))
    }

    /// Converts `assem` to packed DNA, scans it against the index, and tries
    /// candidates longest-first until one matches exactly, re-anchoring
    /// `matrix`/`assem` onto it. Returns id `0` with no mutation if none did.
    pub fn reassign_template(
        &self,
        assem: &mut Consensus,
        matrix: &mut AssemblyMatrix,
        seq_file: &mut File,
        name_file: &mut File,
    ) -> Result<ReassignOutcome> {
        let fw = pack_query(assem);
        let rc = fw.reverse_complement();

        let scan_result = scanner::scan(&self.index, &self.template_lengths, &fw, &rc);
        let mut heap = CandidateHeap::build(scan_result.best_templates, &self.template_lengths);

        let prefix_mode = self.index.header.prefix_len > 0;

        loop {
            let id = heap.pop();
            if id == 0 {
                return Ok(ReassignOutcome { template_id: 0, template_name: None });
            }

            let t_idx = norm(id);
            let t_len = self.template_lengths[t_idx];
            let candidate = self.load_candidate(seq_file, t_idx)?;

            let placement = if prefix_mode {
                let off = matcher::match_exact(&fw, &candidate);
                if off >= 0 {
                    Some((off, false))
                } else {
                    let off_rc = matcher::match_exact(&rc, &candidate);
                    (off_rc >= 0).then_some((off_rc, true))
                }
            } else if id > 0 {
                let off = matcher::match_exact(&fw, &candidate);
                (off >= 0).then_some((off, false))
            } else {
                let off = matcher::match_exact(&rc, &candidate);
                (off >= 0).then_some((off, true))
            };

            let Some((offset, is_rc)) = placement else {
                continue;
            };

            if is_rc {
                assem.reverse_complement_in_place();
                matrix.reverse_complement_in_place();
            }

            rewriter::reanchor(matrix, assem, offset as u32, &candidate, t_len);

            fix_var_overflow(assem, t_len);
            let reducer = ExtendedStats::new(self.config.thread_num.max(1));
            let matrix_ref = &*matrix;
            std::thread::scope(|scope| {
                for _ in 0..self.config.thread_num.max(1) {
                    let reducer = &reducer;
                    let candidate = &candidate;
                    let (depth, var) = (assem.depth, assem.var);
                    scope.spawn(move || reducer.run_worker(depth, var, t_len, matrix_ref, candidate));
                }
            });
            reducer.apply(assem);

            let name = template_db::load_name(name_file, self.name_indexes[t_idx])?;
            return Ok(ReassignOutcome { template_id: t_idx as u32, template_name: Some(name) });
        }
    }
}
