//! Template reassignment core for a k-mer indexed short-read mapper.
//!
//! After a primary assembler has aligned a consensus to one template, this
//! crate decides whether the consensus is actually a better exact match to a
//! different (typically longer) template sharing its k-mer signature, and if
//! so re-anchors the assembly matrix onto that template's coordinate frame.
//!
//! FASTA/FASTQ ingestion, the primary seeding/alignment engine, database
//! construction, CLI parsing, and SAM/BAM/VCF formatting are all out of
//! scope here; this crate only consumes the typed interfaces described in
//! `reassign::ReassignCore`.

pub mod consensus;
pub mod heap;
pub mod kmer_index;
pub mod matcher;
pub mod matrix;
pub mod output;
pub mod packed_dna;
pub mod reassign;
pub mod rewriter;
pub mod scanner;
pub mod stats;
pub mod template_db;

pub use consensus::Consensus;
pub use kmer_index::{KmerIndex, KmerIndexHeader};
pub use matrix::{AssemblyMatrix, AssemblyNode};
pub use packed_dna::PackedDna;
pub use reassign::{ReassignConfig, ReassignCore};
