// ********* Input data structures ***********

use std::fmt::Display;

use snafu::prelude::*;

use crate::encode::{EncodingTables, NULL_MARKERS};

/// Identifies one candidacy. The same key is used by all the source streams.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct CandidateKey {
    pub election_year: i32,
    pub state_code: String,
    pub sequence_id: i64,
}

impl CandidateKey {
    pub fn new(election_year: i32, state_code: &str, sequence_id: i64) -> CandidateKey {
        CandidateKey {
            election_year,
            state_code: state_code.to_string(),
            sequence_id,
        }
    }
}

impl Display for CandidateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.election_year, self.state_code, self.sequence_id
        )
    }
}

/// The state of a candidacy registration with the electoral court.
///
/// Only accepted candidacies (with or without a pending appeal) take part in
/// any of the models.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum CandidacyStatus {
    Accepted,
    AcceptedWithAppeal,
    /// Rejected, withdrawn, cancelled, etc. The original label is kept.
    Other(String),
}

impl CandidacyStatus {
    pub const ACCEPTED_LABEL: &'static str = "DEFERIDO";
    pub const ACCEPTED_WITH_APPEAL_LABEL: &'static str = "DEFERIDO COM RECURSO";

    pub fn from_label(label: &str) -> CandidacyStatus {
        match label.trim().to_uppercase().as_str() {
            CandidacyStatus::ACCEPTED_LABEL => CandidacyStatus::Accepted,
            CandidacyStatus::ACCEPTED_WITH_APPEAL_LABEL => CandidacyStatus::AcceptedWithAppeal,
            _ => CandidacyStatus::Other(label.trim().to_string()),
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(
            self,
            CandidacyStatus::Accepted | CandidacyStatus::AcceptedWithAppeal
        )
    }
}

/// The registration record of a candidacy. All the text fields are raw labels,
/// as found in the source.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateInfo {
    pub key: CandidateKey,
    pub ballot_number: Option<String>,
    pub party: Option<String>,
    pub office: Option<String>,
    pub candidacy_status: CandidacyStatus,
    pub occupation: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub education_level: Option<String>,
    pub marital_status: Option<String>,
    pub nationality: Option<String>,
    pub birth_state: Option<String>,
    pub race: Option<String>,
}

impl CandidateInfo {
    /// A record with only the key and the status filled in.
    pub fn new(key: CandidateKey, candidacy_status: CandidacyStatus) -> CandidateInfo {
        CandidateInfo {
            key,
            ballot_number: None,
            party: None,
            office: None,
            candidacy_status,
            occupation: None,
            age: None,
            gender: None,
            education_level: None,
            marital_status: None,
            nationality: None,
            birth_state: None,
            race: None,
        }
    }
}

/// One itemized amount declared for a candidacy (a declared asset, a
/// received contribution or an expense).
#[derive(PartialEq, Debug, Clone)]
pub struct FinancialItem {
    pub key: CandidateKey,
    pub amount: f64,
}

/// The sum of all the items of a financial stream for one candidacy.
#[derive(PartialEq, Debug, Clone)]
pub struct KeyedAmount {
    pub key: CandidateKey,
    pub amount: f64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateResult {
    pub key: CandidateKey,
    pub outcome: Option<String>,
}

impl CandidateResult {
    pub const ELECTED_OUTCOMES: [&'static str; 4] =
        ["ELEITO", "ELEITO POR QP", "ELEITO POR MÉDIA", "MÉDIA"];
    pub const NOT_ELECTED_OUTCOMES: [&'static str; 2] = ["NÃO ELEITO", "SUPLENTE"];

    /// Collapses the outcome label.
    pub fn outcome_lookup(&self) -> OutcomeLookup {
        let outcome = match self.outcome.as_deref().map(|o| o.trim().to_uppercase()) {
            None => return OutcomeLookup::Missing,
            Some(o) if o.is_empty() || NULL_MARKERS.contains(&o.as_str()) => {
                return OutcomeLookup::Missing
            }
            Some(o) => o,
        };
        if CandidateResult::ELECTED_OUTCOMES.contains(&outcome.as_str()) {
            OutcomeLookup::Known(true)
        } else if CandidateResult::NOT_ELECTED_OUTCOMES.contains(&outcome.as_str()) {
            OutcomeLookup::Known(false)
        } else {
            OutcomeLookup::OutOfDomain
        }
    }

    /// Unknown labels (and missing outcomes) do not count as defeats.
    pub fn elected(&self) -> Option<bool> {
        match self.outcome_lookup() {
            OutcomeLookup::Known(b) => Some(b),
            OutcomeLookup::Missing | OutcomeLookup::OutOfDomain => None,
        }
    }
}

/// An outcome label read against the outcome tables.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OutcomeLookup {
    Known(bool),
    Missing,
    /// Present but in neither table.
    OutOfDomain,
}

/// Gives access to the candidacy key of a record.
pub trait Keyed {
    fn key(&self) -> &CandidateKey;
}

impl Keyed for CandidateInfo {
    fn key(&self) -> &CandidateKey {
        &self.key
    }
}

impl Keyed for KeyedAmount {
    fn key(&self) -> &CandidateKey {
        &self.key
    }
}

impl Keyed for CandidateResult {
    fn key(&self) -> &CandidateKey {
        &self.key
    }
}

/// The five record streams that feed a run.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum StreamName {
    CandidateInfo,
    NetWorth,
    Contributions,
    Expenditure,
    Results,
}

impl StreamName {
    pub const ALL: [StreamName; 5] = [
        StreamName::CandidateInfo,
        StreamName::NetWorth,
        StreamName::Contributions,
        StreamName::Expenditure,
        StreamName::Results,
    ];

    pub const FINANCIAL: [StreamName; 3] = [
        StreamName::NetWorth,
        StreamName::Contributions,
        StreamName::Expenditure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::CandidateInfo => "candidate_info",
            StreamName::NetWorth => "net_worth",
            StreamName::Contributions => "contributions",
            StreamName::Expenditure => "expenditure",
            StreamName::Results => "results",
        }
    }

    pub fn from_name(name: &str) -> Option<StreamName> {
        StreamName::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn is_financial(&self) -> bool {
        StreamName::FINANCIAL.contains(self)
    }
}

impl Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ********* Configuration **********

/// Settings of the Newton-Raphson solver used for the yearly logistic fits.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct RegressionParams {
    pub max_iterations: u32,
    /// Convergence is reached when no coefficient moves by more than this.
    pub tolerance: f64,
    /// A Cholesky pivot smaller than this fraction of its diagonal entry
    /// marks the matrix as singular.
    pub pivot_tolerance: f64,
}

impl RegressionParams {
    pub const DEFAULT: RegressionParams = RegressionParams {
        max_iterations: 35,
        tolerance: 1e-8,
        pivot_tolerance: 1e-10,
    };
}

/// Settings of the gradient-boosted trees.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct BoostingParams {
    pub n_estimators: u32,
    pub learning_rate: f64,
    pub max_depth: u32,
    /// Minimum sum of hessians in each child of a split.
    pub min_child_weight: f64,
    /// L2 penalty on the leaf weights.
    pub lambda: f64,
    /// Minimum loss reduction to keep a split.
    pub gamma: f64,
    /// Probability above which a candidacy is predicted as elected.
    pub decision_threshold: f64,
}

impl BoostingParams {
    pub const DEFAULT: BoostingParams = BoostingParams {
        n_estimators: 100,
        learning_rate: 0.1,
        max_depth: 3,
        min_child_weight: 1.0,
        lambda: 1.0,
        gamma: 0.0,
        decision_threshold: 0.5,
    };
}

#[derive(PartialEq, Debug, Clone)]
pub struct ModelConfig {
    /// The election years considered. Rows from other years are ignored.
    pub years: Vec<i32>,
    /// Last year (inclusive) of the training set of the classifier.
    pub cutoff_year: i32,
    pub encoding: EncodingTables,
    pub regression: RegressionParams,
    pub boosting: BoostingParams,
}

impl ModelConfig {
    pub fn new(years: &[i32], cutoff_year: i32) -> ModelConfig {
        ModelConfig {
            years: years.to_vec(),
            cutoff_year,
            encoding: EncodingTables::default(),
            regression: RegressionParams::DEFAULT,
            boosting: BoostingParams::DEFAULT,
        }
    }

    /// The held-out year: the most recent year considered.
    pub fn test_year(&self) -> Option<i32> {
        self.years.iter().max().cloned()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let test_year = self.test_year().context(InvalidConfigSnafu {
            message: "no election year configured",
        })?;
        ensure!(
            test_year > self.cutoff_year,
            InvalidConfigSnafu {
                message: format!(
                    "the test year {} must come after the cutoff year {}",
                    test_year, self.cutoff_year
                ),
            }
        );
        ensure!(
            self.years.iter().any(|y| *y <= self.cutoff_year),
            InvalidConfigSnafu {
                message: format!("no election year up to the cutoff {}", self.cutoff_year),
            }
        );
        let b = &self.boosting;
        ensure!(
            b.n_estimators > 0 && b.learning_rate > 0.0 && b.lambda >= 0.0,
            InvalidConfigSnafu {
                message: format!("invalid boosting parameters {:?}", b),
            }
        );
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::new(&[2006, 2010, 2014, 2018, 2022], 2018)
    }
}

// ******** Errors *********

/// Errors that stop a run. Failures limited to one election year are
/// reported as `SkippedYear` instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ModelError {
    #[snafu(display("Duplicate rows in stream {stream} for candidacy {key}"))]
    JoinIntegrity { stream: StreamName, key: CandidateKey },

    #[snafu(display("Feature schema mismatch: expected {expected:?}, found {found:?}"))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[snafu(display("No labelled training row up to year {cutoff_year}"))]
    EmptyTrainingSet { cutoff_year: i32 },

    #[snafu(display("No row for the test year {year}"))]
    EmptyTestSet { year: i32 },

    #[snafu(display("Nothing to evaluate"))]
    EmptyEvaluation {},

    #[snafu(display("Inputs of different lengths: {left} and {right}"))]
    LengthMismatch { left: usize, right: usize },

    #[snafu(display("Stream {stream} does not hold financial items"))]
    NotFinancialStream { stream: StreamName },

    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Option<&str>) -> CandidateResult {
        CandidateResult {
            key: CandidateKey::new(2014, "BA", 7),
            outcome: outcome.map(|o| o.to_string()),
        }
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(result(Some("eleito por média")).elected(), Some(true));
        assert_eq!(result(Some("SUPLENTE")).elected(), Some(false));
        assert_eq!(result(None).outcome_lookup(), OutcomeLookup::Missing);
        assert_eq!(result(Some("#NULO#")).outcome_lookup(), OutcomeLookup::Missing);
        // Without the accent the label is not recognized.
        let unaccented = result(Some("ELEITO POR MEDIA"));
        assert_eq!(unaccented.outcome_lookup(), OutcomeLookup::OutOfDomain);
        assert_eq!(unaccented.elected(), None);
        assert_eq!(
            result(Some("2º TURNO")).outcome_lookup(),
            OutcomeLookup::OutOfDomain
        );
    }
}
