use log::{debug, info, warn};
use snafu::prelude::*;

use crate::boosting::GradientBoostedTrees;
use crate::config::*;
use crate::encode::EncodedCandidate;
use crate::matrix::{ensemble_columns, ensemble_features, FeatureMatrix};

/// The pooled historical rows and the held-out year.
#[derive(PartialEq, Debug, Clone)]
pub struct TrainTestSplit {
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

/// A fitted ensemble, bound to the feature schema it was trained on.
#[derive(PartialEq, Debug, Clone)]
pub struct TrainedClassifier {
    schema: Vec<String>,
    model: GradientBoostedTrees,
    threshold: f64,
}

impl TrainedClassifier {
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn model(&self) -> &GradientBoostedTrees {
        &self.model
    }

    /// Probability of being elected for every row. The columns must be the
    /// training columns, in the same order.
    pub fn predict_probability(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        features.check_schema(&self.schema)?;
        Ok(features
            .rows
            .iter()
            .map(|row| self.model.predict_probability(row))
            .collect())
    }

    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<bool>, ModelError> {
        let probabilities = self.predict_probability(features)?;
        Ok(probabilities.iter().map(|p| *p > self.threshold).collect())
    }

    /// Total split gain per feature, largest first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut res: Vec<(String, f64)> = self
            .schema
            .iter()
            .cloned()
            .zip(self.model.feature_gains())
            .collect();
        res.sort_by(|a, b| b.1.total_cmp(&a.1));
        res
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Prediction {
    pub key: CandidateKey,
    /// Unknown when the test row has no result.
    pub actual: Option<bool>,
    pub predicted: bool,
    pub probability: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TrainingOutcome {
    pub classifier: TrainedClassifier,
    pub n_train: usize,
    /// Training rows left out because their outcome is unknown.
    pub unlabelled_train: usize,
    pub test_year: i32,
    pub predictions: Vec<Prediction>,
}

impl TrainingOutcome {
    /// Outcomes, predictions and probabilities of the test rows with a known
    /// outcome.
    pub fn labelled_predictions(&self) -> (Vec<bool>, Vec<bool>, Vec<f64>) {
        let mut actual = Vec::new();
        let mut predicted = Vec::new();
        let mut probabilities = Vec::new();
        for p in self.predictions.iter() {
            if let Some(a) = p.actual {
                actual.push(a);
                predicted.push(p.predicted);
                probabilities.push(p.probability);
            }
        }
        (actual, predicted, probabilities)
    }
}

/// Trains the ensemble on every year up to the cutoff and predicts the
/// test year.
pub struct ClassifierTrainer {
    cutoff_year: i32,
    test_year: i32,
    params: BoostingParams,
}

impl ClassifierTrainer {
    pub fn new(cutoff_year: i32, test_year: i32, params: &BoostingParams) -> ClassifierTrainer {
        ClassifierTrainer {
            cutoff_year,
            test_year,
            params: *params,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<ClassifierTrainer, ModelError> {
        config.validate()?;
        let test_year = config.test_year().context(InvalidConfigSnafu {
            message: "no election year configured",
        })?;
        Ok(ClassifierTrainer::new(
            config.cutoff_year,
            test_year,
            &config.boosting,
        ))
    }

    /// Rows up to the cutoff go to training, rows of the test year to the
    /// test set. Any other row is left out.
    pub fn split(&self, rows: &[EncodedCandidate]) -> TrainTestSplit {
        let train = ensemble_features(
            rows.iter()
                .filter(|c| c.key.election_year <= self.cutoff_year),
        );
        let test = ensemble_features(rows.iter().filter(|c| c.key.election_year == self.test_year));
        debug!(
            "split: {} training rows up to {}, {} test rows in {}",
            train.n_rows(),
            self.cutoff_year,
            test.n_rows(),
            self.test_year
        );
        TrainTestSplit { train, test }
    }

    pub fn train(&self, rows: &[EncodedCandidate]) -> Result<TrainingOutcome, ModelError> {
        let split = self.split(rows);
        let train = split.train.labelled();
        let unlabelled_train = split.train.n_rows() - train.n_rows();
        if unlabelled_train > 0 {
            warn!(
                "{} training rows without a known outcome are left out",
                unlabelled_train
            );
        }
        ensure!(
            !train.is_empty(),
            EmptyTrainingSetSnafu {
                cutoff_year: self.cutoff_year
            }
        );
        ensure!(
            !split.test.is_empty(),
            EmptyTestSetSnafu {
                year: self.test_year
            }
        );

        let labels: Vec<bool> = train.labels.iter().map(|l| *l == Some(true)).collect();
        let model = GradientBoostedTrees::fit(&train.rows, &labels, &self.params)?;
        let classifier = TrainedClassifier {
            schema: ensemble_columns(),
            model,
            threshold: self.params.decision_threshold,
        };
        info!(
            "Trained on {} rows ({} elected)",
            train.n_rows(),
            labels.iter().filter(|l| **l).count()
        );

        let probabilities = classifier.predict_probability(&split.test)?;
        let predictions: Vec<Prediction> = split
            .test
            .keys
            .iter()
            .zip(split.test.labels.iter())
            .zip(probabilities.iter())
            .map(|((key, actual), probability)| Prediction {
                key: key.clone(),
                actual: *actual,
                predicted: *probability > classifier.threshold,
                probability: *probability,
            })
            .collect();
        info!(
            "Predicted {} rows for {}, {} predicted elected",
            predictions.len(),
            self.test_year,
            predictions.iter().filter(|p| p.predicted).count()
        );

        Ok(TrainingOutcome {
            classifier,
            n_train: train.n_rows(),
            unlabelled_train,
            test_year: self.test_year,
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::evaluate;

    fn candidate(year: i32, seq: i64) -> EncodedCandidate {
        EncodedCandidate {
            key: CandidateKey::new(year, "MG", seq),
            elected: None,
            age: None,
            gender: None,
            education: None,
            married: None,
            national: None,
            is_local: None,
            non_majority_race: None,
            third_digit: None,
            net_worth: None,
            contributions: None,
            expenditure: None,
        }
    }

    fn separable(year: i32) -> Vec<EncodedCandidate> {
        (0..10)
            .map(|i| {
                let mut c = candidate(year, i);
                let elected = i % 2 == 0;
                c.elected = Some(elected);
                c.gender = Some(u8::from(elected));
                c
            })
            .collect()
    }

    #[test]
    fn split_by_year() {
        let rows: Vec<EncodedCandidate> = [2006, 2010, 2014, 2018, 2022, 2019]
            .iter()
            .enumerate()
            .flat_map(|(i, y)| (0..3).map(move |j| candidate(*y, (i * 3 + j) as i64)))
            .collect();
        let split = ClassifierTrainer::new(2018, 2022, &BoostingParams::DEFAULT).split(&rows);
        assert_eq!(split.train.n_rows(), 12);
        assert_eq!(split.test.n_rows(), 3);
        assert!(split.train.keys.iter().all(|k| k.election_year <= 2018));
        assert!(split.test.keys.iter().all(|k| k.election_year == 2022));
        assert!(split.train.keys.iter().all(|k| !split.test.keys.contains(k)));
    }

    #[test]
    fn separating_feature_gives_perfect_scores() {
        let mut rows = separable(2018);
        rows.extend(separable(2022));
        let outcome = ClassifierTrainer::new(2018, 2022, &BoostingParams::DEFAULT)
            .train(&rows)
            .unwrap();
        assert_eq!(outcome.n_train, 10);
        assert_eq!(outcome.predictions.len(), 10);
        let (actual, predicted, probabilities) = outcome.labelled_predictions();
        let ev = evaluate(&actual, &predicted, &probabilities).unwrap();
        assert_eq!(ev.accuracy, 1.0);
        assert_eq!(ev.auc, Some(1.0));
        assert_eq!(outcome.classifier.feature_importance()[0].0, "gender");
    }

    #[test]
    fn unknown_outcomes_and_features_are_tolerated() {
        let mut rows = separable(2014);
        for c in rows.iter_mut().skip(3) {
            c.age = Some(45.0);
        }
        rows.push(candidate(2014, 100));
        // The test year has no results yet.
        rows.push(candidate(2018, 1));
        let mut with_gender = candidate(2018, 2);
        with_gender.gender = Some(1);
        rows.push(with_gender);
        let outcome = ClassifierTrainer::new(2014, 2018, &BoostingParams::DEFAULT)
            .train(&rows)
            .unwrap();
        assert_eq!(outcome.unlabelled_train, 1);
        assert_eq!(outcome.n_train, 10);
        assert_eq!(outcome.predictions.len(), 2);
        assert!(outcome.predictions.iter().all(|p| p.actual.is_none()));
        assert!(outcome.predictions[1].predicted);
        assert!(outcome.labelled_predictions().0.is_empty());
    }

    #[test]
    fn schema_must_match() {
        let rows = separable(2018);
        let mut all = rows.clone();
        all.extend(separable(2022));
        let outcome = ClassifierTrainer::new(2018, 2022, &BoostingParams::DEFAULT)
            .train(&all)
            .unwrap();
        let mut test = ensemble_features(&rows);
        test.columns.swap(0, 1);
        assert!(matches!(
            outcome.classifier.predict(&test),
            Err(ModelError::SchemaMismatch { .. })
        ));
        test.columns.pop();
        assert!(outcome.classifier.predict_probability(&test).is_err());
    }

    #[test]
    fn empty_sets_are_errors() {
        let trainer = ClassifierTrainer::new(2018, 2022, &BoostingParams::DEFAULT);
        assert!(matches!(
            trainer.train(&separable(2022)),
            Err(ModelError::EmptyTrainingSet { cutoff_year: 2018 })
        ));
        assert!(matches!(
            trainer.train(&separable(2018)),
            Err(ModelError::EmptyTestSet { year: 2022 })
        ));
    }
}
