use serde::{Deserialize, Serialize};

/// Disjoint-set forest with path compression and union by size.
#[derive(Clone, Debug)]
pub struct Dsu {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl Dsu {
    #[inline]
    pub fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), size: vec![1; n] }
    }

    #[inline]
    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while root != self.parent[root] {
            root = self.parent[root];
        }
        // compress along the way
        while x != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    #[inline]
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    /// Components as sorted index lists, ordered by their smallest index.
    pub fn groups(mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root = vec![usize::MAX; n];
        let mut out: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let r = self.find(i);
            if slot_of_root[r] == usize::MAX {
                slot_of_root[r] = out.len();
                out.push(Vec::new());
            }
            out[slot_of_root[r]].push(i);
        }
        out
    }
}

/// Energy-weighted group of neighbouring hits on one plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Indices into the hit list the cluster was built from.
    pub members: Vec<usize>,
    pub centroid: f64,
    pub energy: f64,
}

/// Single-linkage grouping: two hits share a group if a chain of hits with
/// pairwise distance below `threshold` connects them.
///
/// # Arguments
///
/// * `hits` - `(coordinate, energy)` pairs of one plane.
/// * `threshold` - Linking distance, compared strictly.
///
pub fn group_hits(hits: &[(f64, f64)], threshold: f64) -> Vec<Vec<usize>> {
    let mut dsu = Dsu::new(hits.len());
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if (hits[i].0 - hits[j].0).abs() < threshold {
                dsu.union(i, j);
            }
        }
    }
    dsu.groups()
}

/// Groups hits and reduces every group to its energy-weighted centroid.
///
/// Groups whose summed energy is not positive have no defined centroid and
/// are dropped.
pub fn cluster_hits(hits: &[(f64, f64)], threshold: f64) -> Vec<Cluster> {
    group_hits(hits, threshold)
        .into_iter()
        .filter_map(|members| {
            let energy: f64 = members.iter().map(|&i| hits[i].1).sum();
            if !(energy > 0.0) {
                return None;
            }
            let weighted: f64 = members.iter().map(|&i| hits[i].0 * hits[i].1).sum();
            Some(Cluster { centroid: weighted / energy, energy, members })
        })
        .collect()
}
