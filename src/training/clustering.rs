//! Clustering algorithms: KMeans, DBSCAN and agglomerative clustering
//!
//! These are unsupervised models: they take X only and assign a cluster
//! label to every row.

use crate::error::{QuantError, Result};
use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Agglomerative clustering keeps a condensed n×n distance matrix in memory
pub const MAX_HIERARCHICAL_ROWS: usize = 5_000;

fn euclidean_sq(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(row: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .rows()
        .into_iter()
        .enumerate()
        .map(|(c, centroid)| (c, euclidean_sq(row, centroid)))
        .fold((0, f64::MAX), |best, cur| if cur.1 < best.1 { cur } else { best })
}

// ═══════════════════════════════════════════════════════════════════════════
//  K-Means Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// K-Means clustering with k-means++ initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
    /// Fitted cluster centroids (n_clusters × n_features)
    centroids: Option<Array2<f64>>,
    labels: Vec<usize>,
    /// Sum of squared distances to nearest centroid
    inertia: Option<f64>,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(3)
    }
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: 42,
            centroids: None,
            labels: Vec::new(),
            inertia: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// K-means++ initialization: pick centroids spread apart
    fn kmeans_pp_init(x: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let n_samples = x.nrows();
        let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
        centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n_samples)));

        for c in 1..k {
            let dists: Vec<f64> = (0..n_samples)
                .map(|i| {
                    (0..c)
                        .map(|j| euclidean_sq(x.row(i), centroids.row(j)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Weighted random selection proportional to D²
            let total: f64 = dists.iter().sum();
            let chosen = if total <= 0.0 {
                rng.gen_range(0..n_samples)
            } else {
                let r = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                dists
                    .iter()
                    .position(|&d| {
                        cumulative += d;
                        cumulative >= r
                    })
                    .unwrap_or(n_samples - 1)
            };
            centroids.row_mut(c).assign(&x.row(chosen));
        }
        centroids
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if self.n_clusters == 0 || self.n_clusters > n_samples {
            return Err(QuantError::InvalidParams(format!(
                "n_clusters must be between 1 and the number of rows ({}), got {}",
                n_samples, self.n_clusters
            )));
        }

        let k = self.n_clusters;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut centroids = Self::kmeans_pp_init(x, k, &mut rng);
        let mut labels = vec![usize::MAX; n_samples];

        for _ in 0..self.max_iter {
            // Assignment step
            let new_labels: Vec<usize> = (0..n_samples)
                .into_par_iter()
                .map(|i| nearest(x.row(i), &centroids).0)
                .collect();
            let changed = new_labels.iter().zip(&labels).filter(|(a, b)| a != b).count();
            labels = new_labels;

            // Update step
            let mut new_centroids = Array2::<f64>::zeros(centroids.dim());
            let mut counts = vec![0usize; k];
            for (i, &c) in labels.iter().enumerate() {
                counts[c] += 1;
                let mut row = new_centroids.row_mut(c);
                row += &x.row(i);
            }
            for c in 0..k {
                if counts[c] > 0 {
                    let mut row = new_centroids.row_mut(c);
                    row /= counts[c] as f64;
                } else {
                    // Empty cluster, reseed from a random row
                    new_centroids.row_mut(c).assign(&x.row(rng.gen_range(0..n_samples)));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            centroids = new_centroids;

            if changed == 0 || shift < self.tol {
                break;
            }
        }

        // Final assignment against the last centroids
        let assigned: Vec<(usize, f64)> = (0..n_samples)
            .into_par_iter()
            .map(|i| nearest(x.row(i), &centroids))
            .collect();
        self.inertia = Some(assigned.iter().map(|(_, d)| d).sum());
        self.labels = assigned.into_iter().map(|(c, _)| c).collect();
        self.centroids = Some(centroids);
        Ok(self)
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn inertia(&self) -> Option<f64> {
        self.inertia
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DBSCAN Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// DBSCAN (Density-Based Spatial Clustering of Applications with Noise)
///
/// Points are classified as core, border, or noise:
/// - Core: has ≥ min_samples neighbors within eps radius (itself included)
/// - Border: within eps of a core point but not core itself
/// - Noise: neither core nor border (label = -1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DBSCAN {
    /// Maximum distance between neighbors
    pub eps: f64,
    /// Minimum points to form a dense region
    pub min_samples: usize,
    labels: Vec<i64>,
    n_clusters_found: usize,
}

impl Default for DBSCAN {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl DBSCAN {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            labels: Vec::new(),
            n_clusters_found: 0,
        }
    }

    /// Find all neighbors within eps distance
    fn region_query(x: &Array2<f64>, point_idx: usize, eps_sq: f64) -> Vec<usize> {
        let row = x.row(point_idx);
        (0..x.nrows())
            .filter(|&i| euclidean_sq(row, x.row(i)) <= eps_sq)
            .collect()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if !(self.eps > 0.0) || !self.eps.is_finite() {
            return Err(QuantError::InvalidParams(format!("eps must be positive, got {}", self.eps)));
        }
        if self.min_samples == 0 {
            return Err(QuantError::InvalidParams("min_samples must be at least 1".to_string()));
        }

        let n_samples = x.nrows();
        let eps_sq = self.eps * self.eps;
        let neighbors: Vec<Vec<usize>> = (0..n_samples)
            .into_par_iter()
            .map(|i| Self::region_query(x, i, eps_sq))
            .collect();
        let is_core: Vec<bool> = neighbors.iter().map(|n| n.len() >= self.min_samples).collect();

        let mut labels = vec![-1i64; n_samples];
        let mut cluster_id: i64 = 0;

        for i in 0..n_samples {
            if labels[i] != -1 || !is_core[i] {
                continue;
            }

            // Expand cluster from core point i
            labels[i] = cluster_id;
            let mut queue: Vec<usize> = neighbors[i].clone();
            let mut head = 0;
            while head < queue.len() {
                let q = queue[head];
                head += 1;
                if labels[q] == -1 {
                    labels[q] = cluster_id;
                }
                if !is_core[q] {
                    continue;
                }
                for &neighbor in &neighbors[q] {
                    if labels[neighbor] == -1 {
                        labels[neighbor] = cluster_id;
                        queue.push(neighbor);
                    }
                }
            }
            cluster_id += 1;
        }

        self.labels = labels;
        self.n_clusters_found = cluster_id as usize;
        Ok(self)
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Number of clusters found (excluding noise)
    pub fn n_clusters(&self) -> usize {
        self.n_clusters_found
    }

    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|&&l| l == -1).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Agglomerative Clustering
// ═══════════════════════════════════════════════════════════════════════════

/// Inter-cluster distance used when merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum increase of within-cluster variance
    #[default]
    Ward,
    Complete,
    Average,
    Single,
}

impl FromStr for Linkage {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ward" => Ok(Linkage::Ward),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "single" => Ok(Linkage::Single),
            other => Err(QuantError::InvalidParams(format!(
                "unknown linkage '{}', expected ward, complete, average or single",
                other
            ))),
        }
    }
}

/// Condensed upper-triangular distance matrix
struct Condensed {
    n: usize,
    data: Vec<f64>,
}

impl Condensed {
    fn index(&self, i: usize, j: usize) -> usize {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        self.n * a - a * (a + 1) / 2 + (b - a - 1)
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }
}

/// Bottom-up hierarchical clustering cut at `n_clusters`
///
/// Merges are found with the nearest-neighbour chain algorithm and
/// Lance-Williams distance updates, then applied in height order until
/// `n_clusters` groups remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgglomerativeClustering {
    pub n_clusters: usize,
    pub linkage: Linkage,
    labels: Vec<usize>,
}

impl AgglomerativeClustering {
    pub fn new(n_clusters: usize, linkage: Linkage) -> Self {
        Self {
            n_clusters,
            linkage,
            labels: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n = x.nrows();
        if n > MAX_HIERARCHICAL_ROWS {
            return Err(QuantError::InvalidParams(format!(
                "hierarchical clustering supports at most {} rows, got {}",
                MAX_HIERARCHICAL_ROWS, n
            )));
        }
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(QuantError::InvalidParams(format!(
                "n_clusters must be between 1 and the number of rows ({}), got {}",
                n, self.n_clusters
            )));
        }

        let mut merges = self.merge_sequence(x);
        merges.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut parent: Vec<usize> = (0..n).collect();
        for &(a, b, _) in merges.iter().take(n - self.n_clusters) {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        // Number clusters by first appearance
        let mut ids = vec![usize::MAX; n];
        let mut next = 0;
        self.labels = (0..n)
            .map(|i| {
                let root = find(&mut parent, i);
                if ids[root] == usize::MAX {
                    ids[root] = next;
                    next += 1;
                }
                ids[root]
            })
            .collect();
        Ok(self)
    }

    /// `(a, b, height)` for each of the n - 1 merges, in discovery order
    fn merge_sequence(&self, x: &Array2<f64>) -> Vec<(usize, usize, f64)> {
        let n = x.nrows();
        if n < 2 {
            return Vec::new();
        }
        let ward = self.linkage == Linkage::Ward;

        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| {
                        let d = euclidean_sq(x.row(i), x.row(j));
                        if ward {
                            d
                        } else {
                            d.sqrt()
                        }
                    })
                    .collect()
            })
            .collect();
        let mut dist = Condensed {
            n,
            data: rows.into_iter().flatten().collect(),
        };

        let mut size = vec![1usize; n];
        let mut active = vec![true; n];
        let mut chain: Vec<usize> = Vec::with_capacity(n);
        let mut merges = Vec::with_capacity(n - 1);

        while merges.len() < n - 1 {
            if chain.is_empty() {
                if let Some(first) = active.iter().position(|&a| a) {
                    chain.push(first);
                }
            }

            let (a, b, d_ab) = loop {
                let a = chain[chain.len() - 1];
                let prev = if chain.len() >= 2 { Some(chain[chain.len() - 2]) } else { None };
                let (mut b, mut best) = match prev {
                    Some(p) => (p, dist.get(a, p)),
                    None => (usize::MAX, f64::INFINITY),
                };
                for k in 0..n {
                    if active[k] && k != a {
                        let d = dist.get(a, k);
                        if d < best {
                            best = d;
                            b = k;
                        }
                    }
                }
                if Some(b) == prev {
                    break (a, b, best);
                }
                chain.push(b);
            };
            chain.truncate(chain.len() - 2);

            // Merge b into a and update distances to every other active cluster
            let (sa, sb) = (size[a] as f64, size[b] as f64);
            for k in 0..n {
                if !active[k] || k == a || k == b {
                    continue;
                }
                let (d_ak, d_bk) = (dist.get(a, k), dist.get(b, k));
                let sk = size[k] as f64;
                let updated = match self.linkage {
                    Linkage::Single => d_ak.min(d_bk),
                    Linkage::Complete => d_ak.max(d_bk),
                    Linkage::Average => (sa * d_ak + sb * d_bk) / (sa + sb),
                    Linkage::Ward => ((sa + sk) * d_ak + (sb + sk) * d_bk - sk * d_ab) / (sa + sb + sk),
                };
                dist.set(a, k, updated);
            }
            active[b] = false;
            size[a] += size[b];

            let height = if ward { d_ab.max(0.0).sqrt() } else { d_ab };
            merges.push((a, b, height));
        }
        merges
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}
