//! Inverted-file cells: deterministic k-means over row-major vectors.

use serde::{Deserialize, Serialize};

use crate::config::IndexFamily;

const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IvfState {
    pub centroids: Vec<f32>,
    pub lists: Vec<Vec<usize>>,
}

/// Similarity used for both ranking and cell assignment; higher is better.
pub(crate) fn similarity(family: IndexFamily, a: &[f32], b: &[f32]) -> f32 {
    match family {
        IndexFamily::FlatL2 => 1.0 / (1.0 + squared_l2(a, b)),
        IndexFamily::FlatIp | IndexFamily::Ivf { .. } => dot(a, b),
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub(crate) fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

impl IvfState {
    /// Lloyd's k-means seeded with evenly spaced sample rows.
    pub fn train(sample: &[f32], dim: usize, nlist: usize, spherical: bool) -> Self {
        let n = sample.len() / dim;
        let mut centroids = Vec::with_capacity(nlist * dim);
        for c in 0..nlist {
            let row = c * n / nlist;
            centroids.extend_from_slice(&sample[row * dim..(row + 1) * dim]);
        }

        let mut assignment = vec![0usize; n];
        for _ in 0..KMEANS_ITERATIONS {
            for (row, slot) in assignment.iter_mut().enumerate() {
                *slot = nearest(&centroids, dim, &sample[row * dim..(row + 1) * dim]);
            }
            let mut sums = vec![0f32; nlist * dim];
            let mut counts = vec![0usize; nlist];
            for (row, &cell) in assignment.iter().enumerate() {
                counts[cell] += 1;
                for (s, x) in sums[cell * dim..(cell + 1) * dim].iter_mut().zip(&sample[row * dim..(row + 1) * dim]) {
                    *s += x;
                }
            }
            for cell in 0..nlist {
                // empty cells keep their previous centroid
                if counts[cell] == 0 {
                    continue;
                }
                let centroid = &mut centroids[cell * dim..(cell + 1) * dim];
                for (c, s) in centroid.iter_mut().zip(&sums[cell * dim..(cell + 1) * dim]) {
                    *c = s / counts[cell] as f32;
                }
                if spherical {
                    normalize(centroid);
                }
            }
        }
        Self { centroids, lists: vec![Vec::new(); nlist] }
    }

    pub fn assign(&mut self, dim: usize, row: usize, vector: &[f32]) {
        let cell = nearest(&self.centroids, dim, vector);
        self.lists[cell].push(row);
    }

    /// Rows in the `nprobe` cells whose centroids are most similar to `query`.
    pub fn probe(&self, dim: usize, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut cells: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(dim)
            .enumerate()
            .map(|(cell, centroid)| (cell, dot(query, centroid)))
            .collect();
        cells.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        cells.into_iter().take(nprobe).flat_map(|(cell, _)| self.lists[cell].iter().copied()).collect()
    }
}

fn nearest(centroids: &[f32], dim: usize, vector: &[f32]) -> usize {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (cell, centroid) in centroids.chunks_exact(dim).enumerate() {
        let s = dot(vector, centroid);
        if s > best.1 {
            best = (cell, s);
        }
    }
    best.0
}
