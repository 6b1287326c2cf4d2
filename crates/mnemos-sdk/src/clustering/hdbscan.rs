//! HDBSCAN over cosine distance.
//!
//! Steps:
//! 1. core distance of every point (distance to its `min_samples`-th nearest
//!    neighbour, counting the point itself)
//! 2. minimum spanning tree of the mutual reachability graph (dense Prim)
//! 3. single linkage hierarchy from the sorted MST edges
//! 4. condensed tree, dropping splits smaller than `min_cluster_size`
//! 5. excess-of-mass cluster selection on the condensed tree
//!
//! Memory and time are O(n²) in the number of points, which is fine for one
//! owner's memory set.

use crate::embeddings::cosine_similarity;
use std::collections::VecDeque;

/// Smallest distance used when converting to lambda = 1 / distance
const MIN_DISTANCE: f64 = 1e-12;

/// Clustering parameters
#[derive(Debug, Clone)]
pub struct HdbscanParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    /// Permit the root of the condensed tree to be selected as the only cluster
    pub allow_single_cluster: bool,
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            allow_single_cluster: false,
        }
    }
}

/// Cosine distance in [0, 2]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b) as f64).max(0.0)
}

/// Cluster `points`, returning one label per point (None = noise)
///
/// Labels are dense, starting at 0.
pub fn cluster(points: &[Vec<f32>], params: &HdbscanParams) -> Vec<Option<usize>> {
    let n = points.len();
    let min_cluster_size = params.min_cluster_size.max(2);
    if n < min_cluster_size {
        return vec![None; n];
    }

    let k = params.min_samples.max(1).min(min_cluster_size).min(n);
    let dist = distance_matrix(points);
    let core = core_distances(&dist, n, k);
    let mst = minimum_spanning_tree(&dist, &core, n);
    let hierarchy = single_linkage(mst, n);
    let condensed = condense(&hierarchy, n, min_cluster_size);
    label_points(&condensed, n, params.allow_single_cluster)
}

// ─────────────────────────────────────────────────────────────────────────────
// Distances and spanning tree
// ─────────────────────────────────────────────────────────────────────────────

fn distance_matrix(points: &[Vec<f32>]) -> Vec<f64> {
    let n = points.len();
    let mut dist = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&points[i], &points[j]);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }
    dist
}

fn core_distances(dist: &[f64], n: usize, k: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let mut row = dist[i * n..(i + 1) * n].to_vec();
            row.sort_by(|a, b| a.total_cmp(b));
            row[k - 1]
        })
        .collect()
}

/// (a, b, mutual reachability distance)
type Edge = (usize, usize, f64);

fn minimum_spanning_tree(dist: &[f64], core: &[f64], n: usize) -> Vec<Edge> {
    let reach = |a: usize, b: usize| dist[a * n + b].max(core[a]).max(core[b]);

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut nearest = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[current] = true;
    for _ in 1..n {
        for j in 0..n {
            if !in_tree[j] {
                let d = reach(current, j);
                if d < best[j] {
                    best[j] = d;
                    nearest[j] = current;
                }
            }
        }

        let Some(next) = (0..n)
            .filter(|j| !in_tree[*j])
            .min_by(|a, b| best[*a].total_cmp(&best[*b]))
        else {
            break;
        };

        edges.push((nearest[next], next, best[next]));
        in_tree[next] = true;
        current = next;
    }
    edges
}

// ─────────────────────────────────────────────────────────────────────────────
// Single linkage hierarchy
// ─────────────────────────────────────────────────────────────────────────────

/// Merge node; node `n + i` of the hierarchy is `hierarchy[i]`
#[derive(Debug, Clone)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next_label: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
            next_label: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let label = self.next_label;
        self.parent[a] = label;
        self.parent[b] = label;
        self.size[label] = self.size[a] + self.size[b];
        self.next_label += 1;
        label
    }
}

fn single_linkage(mut mst: Vec<Edge>, n: usize) -> Vec<Merge> {
    mst.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut uf = UnionFind::new(n);
    let mut hierarchy = Vec::with_capacity(mst.len());
    for (a, b, distance) in mst {
        let left = uf.find(a);
        let right = uf.find(b);
        let label = uf.union(left, right);
        hierarchy.push(Merge {
            left,
            right,
            distance,
            size: uf.size[label],
        });
    }
    hierarchy
}

fn node_size(hierarchy: &[Merge], n: usize, node: usize) -> usize {
    if node < n { 1 } else { hierarchy[node - n].size }
}

fn bfs_hierarchy(hierarchy: &[Merge], n: usize, start: usize) -> Vec<usize> {
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        if node >= n {
            let merge = &hierarchy[node - n];
            queue.push_back(merge.left);
            queue.push_back(merge.right);
        }
    }
    order
}

// ─────────────────────────────────────────────────────────────────────────────
// Condensed tree
// ─────────────────────────────────────────────────────────────────────────────

/// Edge of the condensed tree. Children below `n` are points, the rest are
/// clusters; the root cluster is labelled `n`.
#[derive(Debug, Clone)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn condense(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = n + hierarchy.len() - 1;
    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; root + 1];
    let mut edges = Vec::new();

    for node in bfs_hierarchy(hierarchy, n, root) {
        if node < n || ignore[node] {
            continue;
        }

        let merge = &hierarchy[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let parent = relabel[node];
        let (left, right) = (merge.left, merge.right);
        let left_size = node_size(hierarchy, n, left);
        let right_size = node_size(hierarchy, n, right);

        let mut fall_out = |child: usize, edges: &mut Vec<CondensedEdge>| {
            for sub in bfs_hierarchy(hierarchy, n, child) {
                if sub < n {
                    edges.push(CondensedEdge {
                        parent,
                        child: sub,
                        lambda,
                        size: 1,
                    });
                }
                ignore[sub] = true;
            }
        };

        match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
            (true, true) => {
                for (child, size) in [(left, left_size), (right, right_size)] {
                    relabel[child] = next_label;
                    next_label += 1;
                    edges.push(CondensedEdge {
                        parent,
                        child: relabel[child],
                        lambda,
                        size,
                    });
                }
            }
            (false, false) => {
                fall_out(left, &mut edges);
                fall_out(right, &mut edges);
            }
            (true, false) => {
                relabel[left] = parent;
                fall_out(right, &mut edges);
            }
            (false, true) => {
                relabel[right] = parent;
                fall_out(left, &mut edges);
            }
        }
    }
    edges
}

// ─────────────────────────────────────────────────────────────────────────────
// Excess-of-mass selection
// ─────────────────────────────────────────────────────────────────────────────

fn label_points(condensed: &[CondensedEdge], n: usize, allow_single_cluster: bool) -> Vec<Option<usize>> {
    let num_clusters = condensed
        .iter()
        .map(|e| e.parent.max(e.child))
        .max()
        .map_or(1, |max| max.max(n) - n + 1);

    // Cluster indexes below are `label - n`; 0 is the root
    let mut birth = vec![0.0_f64; num_clusters];
    let mut cluster_parent = vec![None; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    let mut point_edge: Vec<Option<(usize, f64)>> = vec![None; n];

    for e in condensed {
        let parent = e.parent - n;
        if e.child >= n {
            let child = e.child - n;
            birth[child] = e.lambda;
            cluster_parent[child] = Some(parent);
            children[parent].push(child);
        } else {
            point_edge[e.child] = Some((parent, e.lambda));
        }
    }

    let mut stability = vec![0.0_f64; num_clusters];
    for e in condensed {
        let parent = e.parent - n;
        stability[parent] += (e.lambda - birth[parent]) * e.size as f64;
    }

    let mut selected = vec![true; num_clusters];
    if !allow_single_cluster {
        selected[0] = false;
    }
    let first = if allow_single_cluster { 0 } else { 1 };

    // Children always carry higher labels than their parents
    for c in (first..num_clusters).rev() {
        let subtree: f64 = children[c].iter().map(|child| stability[*child]).sum();
        if subtree > stability[c] {
            selected[c] = false;
            stability[c] = subtree;
        } else {
            let mut stack = children[c].clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend(children[d].iter().copied());
            }
        }
    }

    let mut dense = vec![None; num_clusters];
    let mut next = 0;
    for (c, is_selected) in selected.iter().enumerate() {
        if *is_selected {
            dense[c] = Some(next);
            next += 1;
        }
    }

    // The root can only be selected on its own; its members are the points
    // that stay attached until the last split off the root
    let root_threshold = condensed
        .iter()
        .filter(|e| e.parent == n)
        .map(|e| e.lambda)
        .fold(f64::NEG_INFINITY, f64::max);

    point_edge
        .iter()
        .map(|edge| {
            let (mut c, lambda) = (*edge)?;
            loop {
                if selected[c] {
                    if c == 0 && lambda < root_threshold {
                        return None;
                    }
                    return dense[c];
                }
                c = cluster_parent[c]?;
            }
        })
        .collect()
}
