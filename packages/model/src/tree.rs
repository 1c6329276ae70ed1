//! Second-order regression trees for gradient boosting.
//!
//! Splits are found on per-node gradient histograms. Every column has a
//! small sorted set of distinct training values (indicators are 0/1, `hora`
//! has at most 24), and one-hot rows are mostly zeros, so a histogram is
//! built by visiting only each row's non-zero entries; the zero bin is
//! whatever remains of the node totals.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Growth limits and regularization for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub gamma: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Output for one encoded row.
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(feature).copied().unwrap_or(0.0);
                    idx = if value <= threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    pub const fn nodes(&self) -> &[Node] {
        self.nodes.as_slice()
    }

    /// Fits a tree to per-row gradients and hessians, recording every split
    /// in `stats`.
    pub fn fit(
        data: &BinnedMatrix,
        grad: &[f64],
        hess: &[f64],
        params: &TreeParams,
        stats: &mut SplitStats,
    ) -> Self {
        let mut builder = Builder {
            data,
            grad,
            hess,
            params,
            stats,
            nodes: Vec::new(),
        };
        let all: Vec<usize> = (0..data.rows.len()).collect();
        builder.grow(all, 0);
        Self {
            nodes: builder.nodes,
        }
    }
}

/// Per-feature split gain totals and split counts across every tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStats {
    gain: Vec<f64>,
    count: Vec<usize>,
}

impl SplitStats {
    pub fn new(n_features: usize) -> Self {
        Self {
            gain: vec![0.0; n_features],
            count: vec![0; n_features],
        }
    }

    pub fn record(&mut self, feature: usize, gain: f64) {
        self.gain[feature] += gain;
        self.count[feature] += 1;
    }

    /// Average gain per split of each feature, normalized to sum to 1.
    /// Features that never split score 0; all zeros if nothing split.
    #[allow(clippy::cast_precision_loss)]
    pub fn importances(&self) -> Vec<f64> {
        let average: Vec<f64> = self
            .gain
            .iter()
            .zip(&self.count)
            .map(|(&g, &n)| if n == 0 { 0.0 } else { g / n as f64 })
            .collect();
        let total: f64 = average.iter().sum();
        if total > 0.0 {
            average.iter().map(|a| a / total).collect()
        } else {
            average
        }
    }
}

/// Training rows mapped onto per-column value bins.
#[derive(Debug)]
pub struct BinnedMatrix {
    /// Sorted distinct values per column, always including `0.0`.
    bins: Vec<Vec<f64>>,
    /// Bin index of `0.0` per column.
    zero_bin: Vec<usize>,
    /// Start of each column's bins in a flat histogram.
    offsets: Vec<usize>,
    total_bins: usize,
    /// Non-zero `(column, bin)` entries per row.
    rows: Vec<Vec<(usize, usize)>>,
}

impl BinnedMatrix {
    pub fn new(x: ArrayView2<'_, f64>) -> Self {
        let mut bins: Vec<Vec<f64>> = vec![vec![0.0]; x.ncols()];
        for row in x.rows() {
            for (c, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    bins[c].push(v);
                }
            }
        }
        for values in &mut bins {
            values.sort_by(f64::total_cmp);
            values.dedup_by(|a, b| a.total_cmp(b).is_eq());
        }

        let zero_bin = bins
            .iter()
            .map(|values| bin_of(values, 0.0))
            .collect();

        let mut offsets = Vec::with_capacity(bins.len());
        let mut total_bins = 0;
        for values in &bins {
            offsets.push(total_bins);
            total_bins += values.len();
        }

        // Zeros stay implicit: the histogram derives the zero bin from the
        // node totals, so an explicit zero entry would be counted twice.
        let rows = x
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|&(_, &v)| v != 0.0)
                    .map(|(c, &v)| (c, bin_of(&bins[c], v)))
                    .collect()
            })
            .collect();

        Self {
            bins,
            zero_bin,
            offsets,
            total_bins,
            rows,
        }
    }

    fn bin(&self, row: usize, feature: usize) -> usize {
        self.rows[row]
            .iter()
            .find(|(c, _)| *c == feature)
            .map_or(self.zero_bin[feature], |&(_, b)| b)
    }
}

fn bin_of(values: &[f64], v: f64) -> usize {
    values
        .binary_search_by(|candidate| candidate.total_cmp(&v))
        .unwrap_or_else(|i| i.min(values.len().saturating_sub(1)))
}

struct Candidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct Builder<'a> {
    data: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a TreeParams,
    stats: &'a mut SplitStats,
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let (g, h) = indices.iter().fold((0.0, 0.0), |(g, h), &i| {
            (g + self.grad[i], h + self.hess[i])
        });

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || h < 2.0 * self.params.min_child_weight {
            return id;
        }

        let Some(best) = self.best_split(&indices, g, h) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.data.bin(i, best.feature) <= best.bin);

        self.stats.record(best.feature, best.gain);

        let values = &self.data.bins[best.feature];
        let threshold = (values[best.bin] + values[best.bin + 1]) / 2.0;

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold,
            left,
            right,
        };

        id
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.lambda;
        if denom <= 0.0 { 0.0 } else { g * g / denom }
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let data = self.data;
        let mut hist_g = vec![0.0; data.total_bins];
        let mut hist_h = vec![0.0; data.total_bins];
        let mut nonzero_g = vec![0.0; data.bins.len()];
        let mut nonzero_h = vec![0.0; data.bins.len()];

        for &i in indices {
            for &(c, b) in &data.rows[i] {
                let slot = data.offsets[c] + b;
                hist_g[slot] += self.grad[i];
                hist_h[slot] += self.hess[i];
                nonzero_g[c] += self.grad[i];
                nonzero_h[c] += self.hess[i];
            }
        }

        let parent = self.score(g, h);
        let mut best: Option<Candidate> = None;

        for (feature, values) in data.bins.iter().enumerate() {
            if values.len() < 2 {
                continue;
            }
            let offset = data.offsets[feature];
            let zero = offset + data.zero_bin[feature];
            hist_g[zero] = g - nonzero_g[feature];
            hist_h[zero] = h - nonzero_h[feature];

            let mut gl = 0.0;
            let mut hl = 0.0;
            for bin in 0..values.len() - 1 {
                gl += hist_g[offset + bin];
                hl += hist_h[offset + bin];
                let gr = g - gl;
                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Candidate { feature, bin, gain });
                }
            }
        }

        best
    }
}
