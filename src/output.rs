//! Ancillary output writers: the extended-features TSV and the consensus
//! FASTA/alignment pretty-printer. Ported from `ef.c`'s
//! `initExtendedFeatures`/`printExtendedFeatures` and `printconsensus.c`'s
//! `printConsensus`.

use std::io::Write;

use anyhow::Result;

use crate::consensus::Consensus;

const WRAP: usize = 60;

/// Writes the `##`-prefixed metadata block plus the column header line.
/// `database_name` should already have any directory component stripped.
pub fn write_extended_features_header<W: Write>(
    mut w: W,
    database_name: &str,
    tot_frags: u32,
    date: &str,
    command: &str,
) -> Result<()> {
    writeln!(w, "## method\tKMA")?;
    writeln!(w, "## version\t{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(w, "## database\t{database_name}")?;
    writeln!(w, "## fragmentCount\t{tot_frags}")?;
    writeln!(w, "## date\t{date}")?;
    writeln!(w, "## command\t{command}")?;
    writeln!(
        w,
        "# refSequence\treadCount\tfragmentCount\tmapScoreSum\trefCoveredPositions\trefConsensusSum\tbpTotal\tdepthVariance\tnucHighDepthVariance\tdepthMax\tsnpSum\tinsertSum\tdeletionSum\treadCountAln\tfragmentCountAln"
    )?;
    Ok(())
}

/// Writes one row. `assem` is `None` for a template with no mapped reads at
/// all, matching the source's `aligned_assem == NULL` branch.
pub fn write_extended_features_row<W: Write>(
    mut w: W,
    template_name: &str,
    read_count: u32,
    fragment_count: u32,
    assem: Option<&Consensus>,
) -> Result<()> {
    match assem {
        Some(a) => {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                template_name,
                read_count,
                fragment_count,
                a.score,
                a.aln_len,
                a.cover,
                a.depth,
                a.var,
                a.nuc_high_var,
                a.max_depth,
                a.snp_sum,
                a.insert_sum,
                a.deletion_sum,
                a.read_count_aln,
                a.fragment_count_aln,
            )?;
        }
        None => {
            writeln!(
                w,
                "{template_name}\t0\t0\t0\t0\t0\t0\t0.000000\t0\t0\t0\t0\t0\t0\t0"
            )?;
        }
    }
    Ok(())
}

/// How query gap columns are rendered in the consensus FASTA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapMode {
    /// Gap columns are dropped entirely, shortening the sequence.
    Trimmed,
    /// Gap columns become lowercase `n`, preserving the reference frame.
    RefAligned,
}

/// Drops leading/trailing columns that are all-gap (`t == '-' && q == '-'`),
/// mirroring `printConsensus`'s in-place trim pass. Returns the trimmed
/// `(t, s, q)` triple; `assem.len` is updated to match.
fn trim_all_gap_columns(assem: &mut Consensus) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut t = Vec::with_capacity(assem.t.len());
    let mut s = Vec::with_capacity(assem.s.len());
    let mut q = Vec::with_capacity(assem.q.len());
    for i in 0..assem.t.len() {
        if assem.t[i] == b'-' && assem.q[i] == b'-' {
            continue;
        }
        t.push(assem.t[i]);
        s.push(assem.s[i]);
        q.push(assem.q[i]);
    }
    assem.len = t.len() as u32;
    (t, s, q)
}

/// Writes the `template:`/`s`/`query:` 60-column pretty-print block for
/// `assem`, after all-gap-column trimming.
pub fn write_alignment_block<W: Write>(mut w: W, header: &str, assem: &mut Consensus) -> Result<()> {
    let (t, s, q) = trim_all_gap_columns(assem);
    writeln!(w, "# {header}")?;
    let aln_len = t.len();
    let mut i = 0;
    while i < aln_len {
        let end = (i + WRAP).min(aln_len);
        writeln!(w, "{:<10}\t{}", "template:", String::from_utf8_lossy(&t[i..end]))?;
        writeln!(w, "{:<10}\t{}", "", String::from_utf8_lossy(&s[i..end]))?;
        writeln!(w, "{:<10}\t{}\n", "query:", String::from_utf8_lossy(&q[i..end]))?;
        i += WRAP;
    }
    Ok(())
}

/// Writes the `>`-prefixed consensus FASTA for `assem`, after all-gap-column
/// trimming and the requested gap-rendering mode.
pub fn write_consensus_fasta<W: Write>(mut w: W, header: &str, assem: &mut Consensus, gap_mode: GapMode) -> Result<()> {
    let (_, _, q) = trim_all_gap_columns(assem);
    let query = match gap_mode {
        GapMode::Trimmed => q.into_iter().filter(|&b| b != b'-').collect::<Vec<u8>>(),
        GapMode::RefAligned => q.into_iter().map(|b| if b == b'-' { b'n' } else { b }).collect(),
    };

    writeln!(w, ">{header}")?;
    let mut i = 0;
    while i < query.len() {
        let end = (i + WRAP).min(query.len());
        writeln!(w, "{}", String::from_utf8_lossy(&query[i..end]))?;
        i += WRAP;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Consensus {
        Consensus {
            t: b"-ACGT-".to_vec(),
            s: b"-||||-".to_vec(),
            q: b"-ACGT-".to_vec(),
            score: 42,
            aln_len: 4,
            cover: 4,
            depth: 100,
            var: 1.5,
            ..Default::default()
        }
    }

    #[test]
    fn header_contains_expected_columns() {
        let mut buf = Vec::new();
        write_extended_features_header(&mut buf, "db.fsa", 10, "2026-07-26", "reassign-core").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("## database\tdb.fsa"));
        assert!(text.contains("# refSequence\treadCount"));
    }

    #[test]
    fn row_with_no_assem_is_all_zero() {
        let mut buf = Vec::new();
        write_extended_features_row(&mut buf, "T1", 0, 0, None).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "T1\t0\t0\t0\t0\t0\t0\t0.000000\t0\t0\t0\t0\t0\t0\t0\n");
    }

    #[test]
    fn row_with_assem_reports_its_fields() {
        let assem = sample();
        let mut buf = Vec::new();
        write_extended_features_row(&mut buf, "T1", 3, 2, Some(&assem)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("T1\t3\t2\t42\t4\t4\t100\t1.5"));
    }

    #[test]
    fn trimmed_mode_drops_gap_columns() {
        let mut assem = sample();
        let mut buf = Vec::new();
        write_consensus_fasta(&mut buf, "T1", &mut assem, GapMode::Trimmed).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), ">T1\nACGT\n");
    }

    #[test]
    fn ref_aligned_mode_keeps_frame_with_lowercase_n() {
        let mut assem = Consensus {
            t: b"ACGT".to_vec(),
            s: b"| |-".to_vec(),
            q: b"A-GT".to_vec(),
            ..Default::default()
        };
        let mut buf = Vec::new();
        write_consensus_fasta(&mut buf, "T1", &mut assem, GapMode::RefAligned).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), ">T1\nAnGT\n");
    }

    #[test]
    fn alignment_block_wraps_at_60_columns() {
        let bases: Vec<u8> = (0..75).map(|_| b'A').collect();
        let mut assem = Consensus { t: bases.clone(), s: vec![b'|'; 75], q: bases, ..Default::default() };
        let mut buf = Vec::new();
        write_alignment_block(&mut buf, "T1", &mut assem).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].ends_with(&"A".repeat(60)));
        assert!(lines[4].ends_with(&"A".repeat(15)));
    }
}
