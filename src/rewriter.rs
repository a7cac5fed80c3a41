//! C8 — re-anchors an assembly matrix and consensus onto a newly matched
//! template's coordinate frame. Ported from `reassign_matrix_offset`.
//!
//! The original mutates a single arena in place and relies on a careful
//! `bias`-sized capacity reservation (`reassign_matrix_bias`) to keep the
//! still-unread tail of the old list from being clobbered by the new list's
//! writes, since both share one array. `AssemblyNode` is `Copy` here, so this
//! port takes the simpler and equally faithful route: snapshot the old list
//! (and its `t`/`q` columns) into a plain `Vec` first, then build the new
//! list from that snapshot with no aliasing to worry about. The free-list
//! reuse of vacated arena slots is therefore not replicated — it was a pure
//! memory-reuse detail with no effect on the final list's contents, which is
//! what spec.md §8's invariants (property 6, scenario S5) actually check.

use crate::consensus::Consensus;
use crate::matrix::{AssemblyMatrix, AssemblyNode};
use crate::packed_dna::PackedDna;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

struct OldColumn {
    node: AssemblyNode,
    t: u8,
    q: u8,
}

/// Re-anchors `matrix`/`assem` onto `tseq`, whose matched region starts
/// `offset` non-gap query columns into the current alignment and spans
/// `t_len` template positions.
pub fn reanchor(matrix: &mut AssemblyMatrix, assem: &mut Consensus, offset: u32, tseq: &PackedDna, t_len: u32) {
    // Phase 1: skip `offset` non-gap query columns, following the old list.
    let mut col = 0usize;
    let mut node_idx = 0u32;
    let mut left = offset;
    while left > 0 && col < assem.q.len() {
        if assem.q[col] != b'-' {
            left -= 1;
        }
        node_idx = matrix.nodes[node_idx as usize].next;
        col += 1;
    }

    // Phase 2: snapshot the remaining old list alongside its t/q columns.
    // `t`/`s`/`q` are a parallel-array invariant (§3) and should always be
    // the same length, but the walk is bounded by the shorter of the two so
    // a caller violating that invariant gets a truncated snapshot instead of
    // an out-of-bounds index into `t`.
    let col_count = assem.t.len().min(assem.q.len());
    let mut snapshot = Vec::new();
    {
        let mut c = col;
        let mut n = node_idx;
        while c < col_count {
            snapshot.push(OldColumn { node: matrix.nodes[n as usize], t: assem.t[c], q: assem.q[c] });
            n = matrix.nodes[n as usize].next;
            c += 1;
        }
    }

    // Phase 3: relink into template-position nodes (indices 0..t_len,
    // directly indexable) plus insertion nodes chained off their preceding
    // template position.
    let mut new_t = Vec::with_capacity(t_len as usize);
    let mut new_s = Vec::with_capacity(t_len as usize);
    let mut new_q = Vec::with_capacity(t_len as usize);
    let mut template_nodes = vec![AssemblyNode::default(); t_len as usize];
    let mut insertion_nodes: Vec<AssemblyNode> = Vec::new();
    let mut insertion_after: Vec<u32> = Vec::new();

    let mut aln_len: u32 = 0;
    let mut depth: u64 = 0;
    let mut depth_var: u64 = 0;
    let mut last_template: Option<u32> = None;

    for old in &snapshot {
        if aln_len == t_len {
            break;
        }
        if old.q != b'-' {
            // Real query content: since the candidate matched the new
            // template exactly, every non-gap query base — whether it lined
            // up with an old template base or was itself an old-frame
            // insertion — maps 1:1, in order, onto the next new template
            // position.
            let d = old.node.depth();
            depth += d;
            depth_var += d * d;

            new_t.push(BASES[tseq.get_base(aln_len as usize) as usize]);
            new_s.push(b'|');
            new_q.push(old.q);

            let mut node = old.node;
            node.next = 0;
            template_nodes[aln_len as usize] = node;
            last_template = Some(aln_len);
            aln_len += 1;
        } else if let Some(after) = last_template {
            // Old-frame deletion (real template base, no query content): no
            // new template position to assign, but the counts are worth
            // keeping, so it's preserved as an insertion node hanging off
            // the most recently emitted template position.
            let mut node = old.node;
            node.next = 0;
            insertion_nodes.push(node);
            insertion_after.push(after);
        }
        // A leading deletion column before any template position has been
        // emitted has no valid new-frame anchor and is dropped.
    }

    // Assemble the final arena: template backbone first, insertions after,
    // threading `next` pointers so each template position's insertion run
    // (if any) sits between it and the following template position.
    let mut final_nodes = template_nodes;
    let insertion_base = final_nodes.len() as u32;
    final_nodes.extend(insertion_nodes.iter().copied());

    let mut chains: std::collections::HashMap<u32, Vec<u32>> = std::collections::HashMap::new();
    for (i, &after) in insertion_after.iter().enumerate() {
        chains.entry(after).or_default().push(insertion_base + i as u32);
    }

    for i in 0..t_len {
        let next_template = if i + 1 < t_len { i + 1 } else { 0 };
        if let Some(chain) = chains.get(&i) {
            final_nodes[i as usize].next = chain[0];
            for pair in chain.windows(2) {
                final_nodes[pair[0] as usize].next = pair[1];
            }
            final_nodes[*chain.last().unwrap() as usize].next = next_template;
        } else {
            final_nodes[i as usize].next = next_template;
        }
    }

    let total = final_nodes.len() as u32;
    matrix.nodes = final_nodes;
    matrix.len = total;
    matrix.size = total;

    assem.t = new_t;
    assem.s = new_s;
    assem.q = new_q;
    assem.depth = depth;
    assem.depth_var = depth_var;
    assem.len = aln_len;
    assem.aln_len = aln_len;
    assem.cover = t_len;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(counts: [u16; 6]) -> AssemblyNode {
        AssemblyNode { counts, next: 0 }
    }

    fn chain(nodes: Vec<AssemblyNode>) -> AssemblyMatrix {
        let mut nodes = nodes;
        let n = nodes.len();
        for i in 0..n {
            nodes[i].next = if i + 1 < n { (i + 1) as u32 } else { 0 };
        }
        AssemblyMatrix::new(nodes)
    }

    #[test]
    fn reanchor_fills_every_template_position() {
        let mut matrix = chain(vec![
            node([5, 0, 0, 0, 0, 0]),
            node([0, 5, 0, 0, 0, 0]),
            node([0, 0, 5, 0, 0, 0]),
            node([0, 0, 0, 5, 0, 0]),
        ]);
        let mut assem = Consensus {
            t: b"ACGT".to_vec(),
            s: b"||||".to_vec(),
            q: b"ACGT".to_vec(),
            ..Default::default()
        };
        let tseq = PackedDna::encode(b"ACGT");

        reanchor(&mut matrix, &mut assem, 0, &tseq, 4);

        assert_eq!(assem.aln_len, 4);
        assert_eq!(assem.cover, 4);
        assert_eq!(assem.depth, 20);
        let depths: Vec<u64> = matrix.iter_live().map(|n| n.depth()).collect();
        assert_eq!(depths, vec![5, 5, 5, 5]);
    }

    #[test]
    fn old_frame_deletion_is_preserved_as_an_insertion_node() {
        let mut matrix = chain(vec![
            node([5, 0, 0, 0, 0, 0]), // template col 0 (A, matched)
            node([0, 0, 0, 0, 0, 7]), // old-frame deletion: real template base, no query content
            node([0, 0, 5, 0, 0, 0]), // template col 1 (G, matched)
        ]);
        let mut assem = Consensus {
            t: b"ACG".to_vec(),
            s: b"| |".to_vec(),
            q: b"A-G".to_vec(),
            ..Default::default()
        };
        let tseq = PackedDna::encode(b"AG");

        reanchor(&mut matrix, &mut assem, 0, &tseq, 2);

        assert_eq!(assem.aln_len, 2);
        assert_eq!(assem.q, b"AG");
        let first = matrix.nodes[0];
        assert_ne!(first.next, 1); // doesn't point straight at the next template slot...
        let insertion = matrix.nodes[first.next as usize];
        assert_eq!(insertion.counts[5], 7);
        assert_eq!(insertion.next, 1); // ...it runs through the preserved deletion column first
    }

    #[test]
    fn offset_skips_leading_query_columns() {
        let mut matrix = chain(vec![
            node([5, 0, 0, 0, 0, 0]),
            node([0, 5, 0, 0, 0, 0]),
            node([0, 0, 5, 0, 0, 0]),
        ]);
        let mut assem = Consensus {
            t: b"ACG".to_vec(),
            s: b"|||".to_vec(),
            q: b"ACG".to_vec(),
            ..Default::default()
        };
        let tseq = PackedDna::encode(b"CG");

        reanchor(&mut matrix, &mut assem, 1, &tseq, 2);

        assert_eq!(assem.q, b"CG");
        assert_eq!(assem.depth, 10);
    }
}
