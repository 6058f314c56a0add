// Gradient-boosted regression trees for binary classification (logistic
// loss). Unknown feature values are routed at every split along a default
// direction chosen during training.

use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;

/// Hessians are clamped to this value to keep the leaf weights finite.
const MIN_HESSIAN: f64 = 1e-16;

#[derive(PartialEq, Debug, Clone)]
pub enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        /// Known values strictly below the threshold go left.
        threshold: f64,
        /// Where unknown values go.
        missing_left: bool,
        gain: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[Option<f64>]) -> f64 {
        match self {
            Node::Leaf { weight } => *weight,
            Node::Split {
                feature,
                threshold,
                missing_left,
                left,
                right,
                ..
            } => {
                let goes_left = match row.get(*feature).cloned().flatten() {
                    Some(v) if v.is_finite() => v < *threshold,
                    _ => *missing_left,
                };
                if goes_left {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn add_gains(&self, gains: &mut [f64]) {
        if let Node::Split {
            feature,
            gain,
            left,
            right,
            ..
        } = self
        {
            gains[*feature] += gain;
            left.add_gains(gains);
            right.add_gains(gains);
        }
    }

    fn num_leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.num_leaves() + right.num_leaves(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct RegressionTree {
    pub root: Node,
}

impl RegressionTree {
    pub fn predict(&self, row: &[Option<f64>]) -> f64 {
        self.root.predict(row)
    }
}

/// An additive ensemble of trees over the log-odds of the positive class.
#[derive(PartialEq, Debug, Clone)]
pub struct GradientBoostedTrees {
    pub n_features: usize,
    pub base_margin: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn fit(
        rows: &[Vec<Option<f64>>],
        labels: &[bool],
        params: &BoostingParams,
    ) -> Result<GradientBoostedTrees, ModelError> {
        ensure!(
            rows.len() == labels.len(),
            LengthMismatchSnafu {
                left: rows.len(),
                right: labels.len()
            }
        );
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        for row in rows.iter() {
            ensure!(
                row.len() == n_features,
                LengthMismatchSnafu {
                    left: n_features,
                    right: row.len()
                }
            );
        }

        // Known values of every feature, sorted once.
        let sorted: Vec<Vec<(usize, f64)>> = (0..n_features)
            .map(|j| {
                let mut col: Vec<(usize, f64)> = rows
                    .iter()
                    .enumerate()
                    .filter_map(|(i, row)| match row[j] {
                        Some(v) if v.is_finite() => Some((i, v)),
                        _ => None,
                    })
                    .collect();
                col.sort_by(|a, b| a.1.total_cmp(&b.1));
                col
            })
            .collect();

        let targets: Vec<f64> = labels.iter().map(|l| if *l { 1.0 } else { 0.0 }).collect();
        let all_rows: Vec<usize> = (0..rows.len()).collect();
        let base_margin = 0.0;
        let mut margins = vec![base_margin; rows.len()];
        let mut trees: Vec<RegressionTree> = Vec::with_capacity(params.n_estimators as usize);

        for round in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(rows.len());
            let mut hess = Vec::with_capacity(rows.len());
            for (m, y) in margins.iter().zip(targets.iter()) {
                let p = sigmoid(*m);
                grad.push(p - y);
                hess.push((p * (1.0 - p)).max(MIN_HESSIAN));
            }
            let builder = TreeBuilder {
                sorted: &sorted,
                grad: &grad,
                hess: &hess,
                params,
            };
            let tree = RegressionTree {
                root: builder.build(rows, &all_rows, 0),
            };
            for (m, row) in margins.iter_mut().zip(rows.iter()) {
                *m += tree.predict(row);
            }
            debug!(
                "boosting round {}: {} leaves",
                round,
                tree.root.num_leaves()
            );
            trees.push(tree);
        }
        info!(
            "Trained {} trees on {} rows and {} features",
            trees.len(),
            rows.len(),
            n_features
        );
        Ok(GradientBoostedTrees {
            n_features,
            base_margin,
            trees,
        })
    }

    pub fn predict_margin(&self, row: &[Option<f64>]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Probability of the positive class.
    pub fn predict_probability(&self, row: &[Option<f64>]) -> f64 {
        sigmoid(self.predict_margin(row))
    }

    /// Total loss reduction brought by the splits on each feature.
    pub fn feature_gains(&self) -> Vec<f64> {
        let mut gains = vec![0.0; self.n_features];
        for t in self.trees.iter() {
            t.root.add_gains(&mut gains);
        }
        gains
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    missing_left: bool,
    gain: f64,
}

struct TreeBuilder<'a> {
    sorted: &'a [Vec<(usize, f64)>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
}

impl<'a> TreeBuilder<'a> {
    fn sums(&self, members: impl Iterator<Item = usize>) -> (f64, f64) {
        members.fold((0.0, 0.0), |(g, h), i| (g + self.grad[i], h + self.hess[i]))
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn build(&self, rows: &[Vec<Option<f64>>], members: &[usize], depth: u32) -> Node {
        let (g, h) = self.sums(members.iter().cloned());
        if depth < self.params.max_depth {
            if let Some(split) = self.best_split(rows.len(), members, g, h) {
                let (left, right): (Vec<usize>, Vec<usize>) =
                    members.iter().partition(|&&i| match rows[i][split.feature] {
                        Some(v) if v.is_finite() => v < split.threshold,
                        _ => split.missing_left,
                    });
                if !left.is_empty() && !right.is_empty() {
                    return Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        missing_left: split.missing_left,
                        gain: split.gain,
                        left: Box::new(self.build(rows, &left, depth + 1)),
                        right: Box::new(self.build(rows, &right, depth + 1)),
                    };
                }
            }
        }
        Node::Leaf {
            weight: self.leaf_weight(g, h),
        }
    }

    /// The split with the largest positive gain, trying both directions for
    /// the unknown values of each feature.
    fn best_split(&self, n_rows: usize, members: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let min_child = self.params.min_child_weight;
        let parent_score = g * g / (h + lambda);
        let mut in_node = vec![false; n_rows];
        for &i in members.iter() {
            in_node[i] = true;
        }

        let mut best: Option<SplitCandidate> = None;
        for (feature, order) in self.sorted.iter().enumerate() {
            let present: Vec<(usize, f64)> =
                order.iter().cloned().filter(|(i, _)| in_node[*i]).collect();
            if present.is_empty() {
                continue;
            }
            let n_missing = members.len() - present.len();
            let (g_present, h_present) = self.sums(present.iter().map(|(i, _)| *i));
            let (g_missing, h_missing) = (g - g_present, h - h_present);

            let (mut gl, mut hl) = (0.0, 0.0);
            for (w, &(i, v)) in present.iter().enumerate() {
                gl += self.grad[i];
                hl += self.hess[i];
                let threshold = match present.get(w + 1) {
                    Some(&(_, next)) if next > v => {
                        let mid = v + (next - v) / 2.0;
                        if mid > v {
                            mid
                        } else {
                            next
                        }
                    }
                    Some(_) => continue,
                    // Known values on one side, unknown ones on the other.
                    None if n_missing > 0 => f64::INFINITY,
                    None => continue,
                };
                for missing_left in [false, true] {
                    if missing_left && n_missing == 0 {
                        continue;
                    }
                    let (lg, lh) = if missing_left {
                        (gl + g_missing, hl + h_missing)
                    } else {
                        (gl, hl)
                    };
                    let (rg, rh) = (g - lg, h - lh);
                    if lh < min_child || rh < min_child {
                        continue;
                    }
                    let gain = 0.5 * (lg * lg / (lh + lambda) + rg * rg / (rh + lambda) - parent_score)
                        - self.params.gamma;
                    let better = match &best {
                        Some(b) => gain > b.gain,
                        None => gain > 0.0,
                    };
                    if better {
                        best = Some(SplitCandidate {
                            feature,
                            threshold,
                            missing_left,
                            gain,
                        });
                    }
                }
            }
        }
        best
    }
}
