use snafu::prelude::*;

use crate::config::*;
use crate::encode::{third_digit_dummies, EncodedCandidate};

/// The numeric features that can be read from an encoded candidacy.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Feature {
    Age,
    Gender,
    Education,
    Married,
    National,
    IsLocal,
    NonMajorityRace,
    NetWorth,
    Contributions,
    Expenditure,
    ThirdDigitIsOne,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::Gender => "gender",
            Feature::Education => "education",
            Feature::Married => "married",
            Feature::National => "national",
            Feature::IsLocal => "is_local",
            Feature::NonMajorityRace => "non_majority_race",
            Feature::NetWorth => "net_worth",
            Feature::Contributions => "contributions",
            Feature::Expenditure => "expenditure",
            Feature::ThirdDigitIsOne => "third_digit_is_one",
        }
    }

    pub fn value(&self, c: &EncodedCandidate) -> Option<f64> {
        let code = |x: Option<u8>| x.map(f64::from);
        match self {
            Feature::Age => c.age,
            Feature::Gender => code(c.gender),
            Feature::Education => code(c.education),
            Feature::Married => code(c.married),
            Feature::National => code(c.national),
            Feature::IsLocal => code(c.is_local),
            Feature::NonMajorityRace => code(c.non_majority_race),
            Feature::NetWorth => c.net_worth,
            Feature::Contributions => c.contributions,
            Feature::Expenditure => c.expenditure,
            Feature::ThirdDigitIsOne => c.third_digit.map(|d| if d == 1 { 1.0 } else { 0.0 }),
        }
    }
}

/// Regression covariates. Contributions (collinear with expenditure) and race
/// (mostly missing in the early cycles) are left out. The third digit is
/// added as indicators.
pub const REGRESSION_FEATURES: [Feature; 8] = [
    Feature::Age,
    Feature::Gender,
    Feature::Education,
    Feature::Married,
    Feature::National,
    Feature::IsLocal,
    Feature::NetWorth,
    Feature::Expenditure,
];

pub const ENSEMBLE_FEATURES: [Feature; 11] = [
    Feature::Age,
    Feature::Gender,
    Feature::Education,
    Feature::Married,
    Feature::National,
    Feature::IsLocal,
    Feature::NonMajorityRace,
    Feature::NetWorth,
    Feature::Contributions,
    Feature::Expenditure,
    Feature::ThirdDigitIsOne,
];

/// A table of named features, where any cell may be unknown, with the
/// outcome of every row.
#[derive(PartialEq, Debug, Clone)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub keys: Vec<CandidateKey>,
    pub rows: Vec<Vec<Option<f64>>>,
    pub labels: Vec<Option<bool>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> FeatureMatrix {
        FeatureMatrix {
            columns,
            keys: Vec::new(),
            rows: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Appends a row, which must have one value per column.
    pub fn push_row(
        &mut self,
        key: CandidateKey,
        values: Vec<Option<f64>>,
        label: Option<bool>,
    ) -> Result<(), ModelError> {
        ensure!(
            values.len() == self.columns.len(),
            LengthMismatchSnafu {
                left: self.columns.len(),
                right: values.len()
            }
        );
        self.push(key, values, label);
        Ok(())
    }

    // The designs below always build rows of the right width.
    fn push(&mut self, key: CandidateKey, values: Vec<Option<f64>>, label: Option<bool>) {
        self.keys.push(key);
        self.rows.push(values);
        self.labels.push(label);
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the rows for which the predicate holds.
    pub fn filter<F>(&self, mut keep: F) -> FeatureMatrix
    where
        F: FnMut(&CandidateKey, &[Option<f64>], Option<bool>) -> bool,
    {
        let mut res = FeatureMatrix::new(self.columns.clone());
        for ((key, row), label) in self.keys.iter().zip(&self.rows).zip(&self.labels) {
            if keep(key, row.as_slice(), *label) {
                res.push(key.clone(), row.clone(), *label);
            }
        }
        res
    }

    /// The rows with a known outcome and no unknown feature.
    pub fn complete_cases(&self) -> FeatureMatrix {
        self.filter(|_, row, label| label.is_some() && row.iter().all(|v| v.is_some()))
    }

    /// The rows with a known outcome.
    pub fn labelled(&self) -> FeatureMatrix {
        self.filter(|_, _, label| label.is_some())
    }

    /// Fails unless the columns are exactly the expected ones, in order.
    pub fn check_schema(&self, expected: &[String]) -> Result<(), ModelError> {
        ensure!(
            self.columns.as_slice() == expected,
            SchemaMismatchSnafu {
                expected: expected.to_vec(),
                found: self.columns.clone(),
            }
        );
        Ok(())
    }
}

/// The regression design of a set of candidacies: the regression covariates
/// followed by the nine third digit indicators.
pub fn regression_features<'a, I>(rows: I) -> FeatureMatrix
where
    I: IntoIterator<Item = &'a EncodedCandidate>,
{
    let dummies = third_digit_dummies();
    let mut columns: Vec<String> = REGRESSION_FEATURES
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    columns.extend(dummies.column_names());

    let mut res = FeatureMatrix::new(columns);
    for c in rows {
        let mut values: Vec<Option<f64>> = REGRESSION_FEATURES.iter().map(|f| f.value(c)).collect();
        values.extend(dummies.expand(c.third_digit));
        res.push(c.key.clone(), values, c.elected);
    }
    res
}

/// The classifier design: all the features, the third digit collapsed to a
/// single indicator. Unknown values are kept.
pub fn ensemble_features<'a, I>(rows: I) -> FeatureMatrix
where
    I: IntoIterator<Item = &'a EncodedCandidate>,
{
    let mut res = FeatureMatrix::new(ensemble_columns());
    for c in rows {
        let values = ENSEMBLE_FEATURES.iter().map(|f| f.value(c)).collect();
        res.push(c.key.clone(), values, c.elected);
    }
    res
}

pub fn ensemble_columns() -> Vec<String> {
    ENSEMBLE_FEATURES
        .iter()
        .map(|f| f.name().to_string())
        .collect()
}
