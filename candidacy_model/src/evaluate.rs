use log::info;
use snafu::prelude::*;

use crate::config::*;

/// Counts of a binary classification, the elected class being the positive one.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(actual: &[bool], predicted: &[bool]) -> ConfusionMatrix {
        let mut cm = ConfusionMatrix::default();
        for (a, p) in actual.iter().zip(predicted.iter()) {
            match (a, p) {
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
                (true, true) => cm.true_positives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn positives(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    pub fn negatives(&self) -> usize {
        self.true_negatives + self.false_positives
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct RocPoint {
    /// Scores at or above the threshold are positive. The first point of a
    /// curve has an infinite threshold.
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub roc_curve: Vec<RocPoint>,
    /// Undefined when only one class is present.
    pub auc: Option<f64>,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// The ROC curve, one point per distinct score, from (0, 0) to (1, 1).
/// Empty when one of the classes is absent.
pub fn roc_curve(actual: &[bool], scores: &[f64]) -> Vec<RocPoint> {
    let positives = actual.iter().filter(|a| **a).count();
    let negatives = actual.len() - positives;
    if positives == 0 || negatives == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<(f64, bool)> = scores.iter().cloned().zip(actual.iter().cloned()).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut curve = vec![RocPoint {
        threshold: f64::INFINITY,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let (mut tp, mut fp) = (0, 0);
    for (idx, (score, label)) in ranked.iter().enumerate() {
        if *label {
            tp += 1;
        } else {
            fp += 1;
        }
        // Tied scores form a single point.
        let last_of_group = ranked
            .get(idx + 1)
            .map(|(next, _)| next != score)
            .unwrap_or(true);
        if last_of_group {
            curve.push(RocPoint {
                threshold: *score,
                false_positive_rate: ratio(fp, negatives),
                true_positive_rate: ratio(tp, positives),
            });
        }
    }
    curve
}

/// Area under the curve, by the trapezoidal rule.
pub fn auc(curve: &[RocPoint]) -> Option<f64> {
    if curve.len() < 2 {
        return None;
    }
    let area = curve
        .windows(2)
        .map(|w| {
            (w[1].false_positive_rate - w[0].false_positive_rate)
                * (w[1].true_positive_rate + w[0].true_positive_rate)
                / 2.0
        })
        .sum();
    Some(area)
}

/// Scores the predictions made on the held-out rows.
pub fn evaluate(
    actual: &[bool],
    predicted: &[bool],
    probabilities: &[f64],
) -> Result<Evaluation, ModelError> {
    ensure!(
        actual.len() == predicted.len(),
        LengthMismatchSnafu {
            left: actual.len(),
            right: predicted.len()
        }
    );
    ensure!(
        actual.len() == probabilities.len(),
        LengthMismatchSnafu {
            left: actual.len(),
            right: probabilities.len()
        }
    );
    ensure!(!actual.is_empty(), EmptyEvaluationSnafu {});

    let confusion = ConfusionMatrix::from_predictions(actual, predicted);
    let roc_curve = roc_curve(actual, probabilities);
    let auc = auc(&roc_curve);
    let precision = ratio(
        confusion.true_positives,
        confusion.true_positives + confusion.false_positives,
    );
    let recall = ratio(confusion.true_positives, confusion.positives());
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let res = Evaluation {
        confusion,
        roc_curve,
        auc,
        accuracy: ratio(
            confusion.true_positives + confusion.true_negatives,
            confusion.total(),
        ),
        precision,
        recall,
        f1,
    };
    info!(
        "Evaluation on {} rows: accuracy {:.4}, precision {:.4}, recall {:.4}, f1 {:.4}, auc {:?}",
        confusion.total(),
        res.accuracy,
        res.precision,
        res.recall,
        res.f1,
        res.auc
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_of_a_small_sample() {
        let actual = [true, true, false, false, true];
        let predicted = [true, false, true, false, true];
        let scores = [0.9, 0.4, 0.6, 0.1, 0.8];
        let ev = evaluate(&actual, &predicted, &scores).unwrap();
        assert_eq!(
            ev.confusion,
            ConfusionMatrix {
                true_negatives: 1,
                false_positives: 1,
                false_negatives: 1,
                true_positives: 2,
            }
        );
        assert!((ev.accuracy - 0.6).abs() < 1e-12);
        assert!((ev.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((ev.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((ev.f1 - 2.0 / 3.0).abs() < 1e-12);
        // Pairs ranked correctly: 5 out of 6.
        assert!((ev.auc.unwrap() - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn roc_curve_goes_from_origin_to_corner() {
        let actual = [true, false, true, false];
        let curve = roc_curve(&actual, &[0.9, 0.7, 0.3, 0.2]);
        assert_eq!(curve.len(), 5);
        assert_eq!(curve[0].threshold, f64::INFINITY);
        assert_eq!((curve[0].false_positive_rate, curve[0].true_positive_rate), (0.0, 0.0));
        let last = curve[4];
        assert_eq!((last.false_positive_rate, last.true_positive_rate), (1.0, 1.0));
        assert_eq!(last.threshold, 0.2);
    }

    #[test]
    fn tied_scores_form_one_point() {
        let actual = [true, false, true, false];
        let curve = roc_curve(&actual, &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(curve.len(), 2);
        assert!((auc(&curve).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_class_has_no_auc() {
        let ev = evaluate(&[false, false], &[false, true], &[0.2, 0.7]).unwrap();
        assert_eq!(ev.auc, None);
        assert!(ev.roc_curve.is_empty());
        // No positive at all: every ratio falls back to zero.
        assert_eq!(ev.precision, 0.0);
        assert_eq!(ev.recall, 0.0);
        assert_eq!(ev.f1, 0.0);
        assert!((ev.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn perfect_ranking() {
        let ev = evaluate(&[false, true, true], &[false, true, true], &[0.1, 0.8, 0.95]).unwrap();
        assert_eq!(ev.auc, Some(1.0));
        assert_eq!(ev.accuracy, 1.0);
    }

    #[test]
    fn inputs_are_checked() {
        assert!(matches!(
            evaluate(&[], &[], &[]),
            Err(ModelError::EmptyEvaluation {})
        ));
        assert!(matches!(
            evaluate(&[true], &[true, false], &[0.5]),
            Err(ModelError::LengthMismatch { left: 1, right: 2 })
        ));
    }
}
