//! Link-graph derivation and layout algorithms.
//!
//! Reference markers are `[[#<id>]]` tokens embedded in note content. The
//! scanner is a bounded single pass - fixed delimiters, digits only - so
//! adversarial content cannot trigger backtracking. The layout helpers
//! (connected components, reply-tree subtree sizes) are pure computations on
//! in-memory id sets, used for visual grouping only.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::GraphEdge;

/// Extract the set of note ids referenced by `[[#<id>]]` markers.
///
/// Malformed tokens (missing digits, unclosed brackets, zero, overflow) are
/// skipped, never fatal. Discovery order is irrelevant; the result is a set.
pub fn extract_references(content: &str) -> BTreeSet<i64> {
    let bytes = content.as_bytes();
    let mut ids = BTreeSet::new();
    let mut i = 0;

    while i + 4 < bytes.len() {
        if &bytes[i..i + 3] != b"[[#" {
            i += 1;
            continue;
        }

        let digits_start = i + 3;
        let mut j = digits_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }

        let closed = j > digits_start && bytes.len() >= j + 2 && &bytes[j..j + 2] == b"]]";
        if closed {
            // content is valid UTF-8 and the span is pure ASCII digits
            if let Ok(id) = content[digits_start..j].parse::<i64>() {
                if id > 0 {
                    ids.insert(id);
                }
            }
            i = j + 2;
        } else {
            // Malformed token: resume after the opening delimiter.
            i += 3;
        }
    }

    ids
}

/// Assign a component id to every node, treating edges as undirected.
///
/// Iterative flood fill; component ids start at 1 and are assigned in node
/// input order, which makes the result deterministic within one call. Edges
/// touching unknown nodes are ignored.
pub fn connected_components(node_ids: &[i64], edges: &[GraphEdge]) -> HashMap<i64, usize> {
    let mut adj: HashMap<i64, Vec<i64>> = node_ids.iter().map(|&id| (id, Vec::new())).collect();
    for e in edges {
        if !adj.contains_key(&e.from) || !adj.contains_key(&e.to) {
            continue;
        }
        if let Some(v) = adj.get_mut(&e.from) {
            v.push(e.to);
        }
        if let Some(v) = adj.get_mut(&e.to) {
            v.push(e.from);
        }
    }

    let mut comp: HashMap<i64, usize> = HashMap::with_capacity(node_ids.len());
    let mut cid = 0;

    for &start in node_ids {
        if comp.contains_key(&start) {
            continue;
        }
        cid += 1;
        comp.insert(start, cid);
        let mut stack = vec![start];

        while let Some(v) = stack.pop() {
            if let Some(neighbors) = adj.get(&v) {
                for &u in neighbors {
                    if !comp.contains_key(&u) {
                        comp.insert(u, cid);
                        stack.push(u);
                    }
                }
            }
        }
    }

    comp
}

/// Reinterpret edges as reply-to-parent and index children by parent.
///
/// An edge `(from, to)` means "from's content references to", i.e. `from`
/// is a reply to `to`. Edges touching nodes outside `node_ids` are dropped.
pub fn children_index(node_ids: &[i64], edges: &[GraphEdge]) -> HashMap<i64, Vec<i64>> {
    let node_set: HashSet<i64> = node_ids.iter().copied().collect();
    let mut index: HashMap<i64, Vec<i64>> = HashMap::new();

    for e in edges {
        if !node_set.contains(&e.from) || !node_set.contains(&e.to) {
            continue;
        }
        index.entry(e.to).or_default().push(e.from);
    }

    index
}

/// Compute, per node, the total descendant count in the reply tree.
///
/// The edge set is not guaranteed acyclic, so traversal carries an explicit
/// visiting set: a node revisited while still on the current path contributes
/// zero for that traversal. Memoized, iterative (explicit stack) so stack
/// depth stays bounded on adversarial inputs.
pub fn subtree_sizes(children: &HashMap<i64, Vec<i64>>) -> HashMap<i64, usize> {
    enum Frame {
        Enter(i64),
        Exit(i64),
    }

    let mut all_ids: BTreeSet<i64> = children.keys().copied().collect();
    for kids in children.values() {
        all_ids.extend(kids.iter().copied());
    }

    let mut memo: HashMap<i64, usize> = HashMap::with_capacity(all_ids.len());
    let empty: Vec<i64> = Vec::new();

    for &root in &all_ids {
        if memo.contains_key(&root) {
            continue;
        }

        let mut visiting: HashSet<i64> = HashSet::new();
        let mut stack = vec![Frame::Enter(root)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    if memo.contains_key(&id) || visiting.contains(&id) {
                        continue;
                    }
                    visiting.insert(id);
                    stack.push(Frame::Exit(id));
                    for &kid in children.get(&id).unwrap_or(&empty) {
                        stack.push(Frame::Enter(kid));
                    }
                }
                Frame::Exit(id) => {
                    let mut sum = 0;
                    for &kid in children.get(&id).unwrap_or(&empty) {
                        // Unmemoized kid here means a cycle back into the
                        // current path: it counts itself, nothing below.
                        sum += 1 + memo.get(&kid).copied().unwrap_or(0);
                    }
                    visiting.remove(&id);
                    memo.insert(id, sum);
                }
            }
        }
    }

    memo
}

/// Build a presentation excerpt: whitespace collapsed, leading `max` chars.
pub fn excerpt(content: &str, max: usize) -> String {
    let collapsed: String = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max).collect()
}
