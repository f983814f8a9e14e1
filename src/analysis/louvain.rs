//! Louvain modularity optimisation on weighted undirected graphs.
//!
//! Nodes are visited in index order and only move on a strictly positive
//! gain, so the same graph always yields the same partition.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;

const MAX_PASSES: usize = 100;
const EPSILON: f64 = 1e-12;

/// Collapsed graph worked on at one level.
struct Level {
    /// Neighbour weights, excluding self-loops.
    adj: Vec<HashMap<usize, f64>>,
    /// Self-loop weight per node, counted once.
    loops: Vec<f64>,
}

impl Level {
    fn from_graph<N>(graph: &UnGraph<N, f64>) -> Self {
        let n = graph.node_count();
        let mut adj = vec![HashMap::new(); n];
        let mut loops = vec![0.0; n];
        for edge in graph.edge_references() {
            let (a, b, w) = (edge.source().index(), edge.target().index(), *edge.weight());
            if a == b {
                loops[a] += w;
            } else {
                *adj[a].entry(b).or_insert(0.0) += w;
                *adj[b].entry(a).or_insert(0.0) += w;
            }
        }
        Self { adj, loops }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn degree(&self, i: usize) -> f64 {
        self.adj[i].values().sum::<f64>() + 2.0 * self.loops[i]
    }

    /// Move nodes between communities until no move improves modularity.
    ///
    /// Returns compact community labels and whether anything moved.
    fn local_moving(&self) -> (Vec<usize>, bool) {
        let n = self.len();
        let degrees: Vec<f64> = (0..n).map(|i| self.degree(i)).collect();
        let m2: f64 = degrees.iter().sum();
        let mut community: Vec<usize> = (0..n).collect();
        if m2 <= 0.0 {
            return (community, false);
        }
        let mut totals = degrees.clone();
        let mut moved_any = false;

        for _ in 0..MAX_PASSES {
            let mut moved = false;
            for i in 0..n {
                let current = community[i];
                let k_i = degrees[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for (&j, &w) in &self.adj[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }

                totals[current] -= k_i;
                let mut best = current;
                let mut best_gain =
                    links.get(&current).copied().unwrap_or(0.0) - totals[current] * k_i / m2;
                for (&c, &k_in) in &links {
                    let gain = k_in - totals[c] * k_i / m2;
                    if gain > best_gain + EPSILON {
                        best = c;
                        best_gain = gain;
                    }
                }
                totals[best] += k_i;

                if best != current {
                    community[i] = best;
                    moved = true;
                    moved_any = true;
                }
            }
            if !moved {
                break;
            }
        }

        (relabel(&community), moved_any)
    }

    fn aggregate(&self, community: &[usize]) -> Self {
        let size = community.iter().max().map_or(0, |m| m + 1);
        let mut adj = vec![HashMap::new(); size];
        let mut loops = vec![0.0; size];
        for i in 0..self.len() {
            let ci = community[i];
            loops[ci] += self.loops[i];
            for (&j, &w) in &self.adj[i] {
                let cj = community[j];
                if ci == cj {
                    // Each internal edge is seen from both ends.
                    loops[ci] += w / 2.0;
                } else {
                    *adj[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }
        Self { adj, loops }
    }
}

/// Renumber labels to 0..k in order of first appearance.
fn relabel(labels: &[usize]) -> Vec<usize> {
    let mut mapping = HashMap::new();
    labels
        .iter()
        .map(|l| {
            let next = mapping.len();
            *mapping.entry(*l).or_insert(next)
        })
        .collect()
}

/// Community label for every node, indexed by node index.
pub fn louvain<N>(graph: &UnGraph<N, f64>) -> Vec<usize> {
    let mut membership: Vec<usize> = (0..graph.node_count()).collect();
    let mut level = Level::from_graph(graph);

    loop {
        let (community, moved) = level.local_moving();
        if !moved {
            break;
        }
        for label in membership.iter_mut() {
            *label = community[*label];
        }
        level = level.aggregate(&community);
    }

    relabel(&membership)
}

/// Newman modularity of a partition.
pub fn modularity<N>(graph: &UnGraph<N, f64>, community: &[usize]) -> f64 {
    let n = graph.node_count();
    let mut degree = vec![0.0; n];
    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut m2 = 0.0;

    for edge in graph.edge_references() {
        let (a, b, w) = (edge.source().index(), edge.target().index(), *edge.weight());
        degree[a] += w;
        degree[b] += w;
        m2 += 2.0 * w;
        if community[a] == community[b] {
            *internal.entry(community[a]).or_insert(0.0) += 2.0 * w;
        }
    }
    if m2 <= 0.0 {
        return 0.0;
    }

    let mut totals: HashMap<usize, f64> = HashMap::new();
    for (i, k) in degree.iter().enumerate() {
        *totals.entry(community[i]).or_insert(0.0) += k;
    }

    totals
        .iter()
        .map(|(c, tot)| internal.get(c).copied().unwrap_or(0.0) / m2 - (tot / m2).powi(2))
        .sum()
}
