mod config;
mod linalg;

pub mod boosting;
pub mod builder;
pub mod digits;
pub mod encode;
pub mod evaluate;
pub mod integrate;
pub mod manual;
pub mod matrix;
pub mod regression;
pub mod trainer;

use log::{debug, info, warn};

pub use crate::config::*;
pub use crate::digits::DigitRate;
pub use crate::encode::{EncodedTable, EncodingTables, FeatureEncoder};
pub use crate::evaluate::Evaluation;
pub use crate::integrate::{CandidateFeatureVector, RecordStore, SourceTables};
pub use crate::regression::{YearwiseRegressionEstimator, YearwiseReport};
pub use crate::trainer::{ClassifierTrainer, TrainedClassifier, TrainingOutcome};

/// Everything computed by one run of the pipeline.
#[derive(PartialEq, Debug, Clone)]
pub struct PipelineReport {
    /// Rows of the integrated table, one per candidacy.
    pub integrated_rows: usize,
    /// Integrated rows outside the configured years.
    pub other_years: usize,
    pub encoded: EncodedTable,
    pub digit_rates: Vec<DigitRate>,
    pub regressions: YearwiseReport,
    pub training: TrainingOutcome,
    /// Absent when no test row has a known outcome.
    pub evaluation: Option<Evaluation>,
}

/// The loaded streams and the configuration of one run.
///
/// The tables are read once from the store and never modified afterwards.
#[derive(PartialEq, Debug, Clone)]
pub struct RunContext {
    tables: SourceTables,
    config: ModelConfig,
}

impl RunContext {
    pub fn new(tables: SourceTables, config: &ModelConfig) -> RunContext {
        RunContext {
            tables,
            config: config.clone(),
        }
    }

    pub fn load<S: RecordStore>(store: &S, config: &ModelConfig) -> Result<RunContext, S::Error> {
        Ok(RunContext::new(SourceTables::load(store)?, config))
    }

    pub fn tables(&self) -> &SourceTables {
        &self.tables
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PipelineReport, ModelError> {
        run_pipeline(&self.tables, &self.config)
    }
}

/// Runs all the stages: integration, encoding, yearly regressions, training
/// of the ensemble and evaluation on the test year.
///
/// Integration and schema errors stop the run. A year that cannot be
/// regressed is reported in the regressions and the run continues.
pub fn run_pipeline(
    tables: &SourceTables,
    config: &ModelConfig,
) -> Result<PipelineReport, ModelError> {
    info!(
        "Running pipeline on years {:?}, cutoff {}",
        config.years, config.cutoff_year
    );
    config.validate()?;
    let trainer = ClassifierTrainer::from_config(config)?;

    let integrated = integrate::integrate(tables)?;
    let integrated_rows = integrated.len();
    let in_years: Vec<CandidateFeatureVector> = integrated
        .into_iter()
        .filter(|r| config.years.contains(&r.info.key.election_year))
        .collect();
    let other_years = integrated_rows - in_years.len();
    if other_years > 0 {
        info!("{} candidacies outside the configured years", other_years);
    }

    let encoded = FeatureEncoder::new(&config.encoding).encode(&in_years);
    for issue in encoded.issues.iter() {
        debug!("run_pipeline: encoding issue {:?}", issue);
    }

    let digit_rates = digits::third_digit_rates(&encoded.rows, &config.years);
    let regressions =
        YearwiseRegressionEstimator::new(&config.regression).estimate(&encoded.rows, &config.years);
    let training = trainer.train(&encoded.rows)?;

    let (actual, predicted, probabilities) = training.labelled_predictions();
    let evaluation = if actual.is_empty() {
        warn!(
            "No known outcome in {}: the predictions are not evaluated",
            training.test_year
        );
        None
    } else {
        Some(evaluate::evaluate(&actual, &predicted, &probabilities)?)
    };

    Ok(PipelineReport {
        integrated_rows,
        other_years,
        encoded,
        digit_rates,
        regressions,
        training,
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::builder::Builder;
    use super::regression::FitFailure;
    use super::*;

    fn info(year: i32, seq: i64, status: &str, gender: &str) -> CandidateInfo {
        let mut c = CandidateInfo::new(
            CandidateKey::new(year, "SP", seq),
            CandidacyStatus::from_label(status),
        );
        c.ballot_number = Some(format!("{}", 10000 + seq));
        c.gender = Some(gender.to_string());
        c.age = Some(40);
        c.birth_state = Some("SP".to_string());
        c
    }

    #[test]
    fn only_accepted_candidacies_are_encoded() {
        let mut builder = Builder::new();
        for (seq, status) in [
            (1, "DEFERIDO"),
            (2, "INDEFERIDO"),
            (3, "DEFERIDO COM RECURSO"),
            (4, "RENÚNCIA"),
        ] {
            builder
                .add_candidate(info(2006, seq, status, "MASCULINO"))
                .unwrap();
        }
        let tables = builder.build().unwrap();
        let integrated = integrate::integrate(&tables).unwrap();
        assert_eq!(integrated.len(), 4);
        let encoded = FeatureEncoder::new(&EncodingTables::default()).encode(&integrated);
        assert_eq!(encoded.ineligible, 2);
        let seqs: Vec<i64> = encoded.rows.iter().map(|r| r.key.sequence_id).collect();
        assert_eq!(seqs, vec![1, 3]);
    }

    #[test]
    fn full_run() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut builder = Builder::new();
        for year in [2010, 2014, 2018] {
            for seq in 0..12 {
                let female = seq % 2 == 0;
                let c = info(year, seq, "DEFERIDO", if female { "FEMININO" } else { "MASCULINO" });
                let key = c.key.clone();
                builder.add_candidate(c).unwrap();
                builder
                    .add_financial_item(StreamName::NetWorth, &key, 1000.0 * (seq / 2) as f64)
                    .unwrap();
                if year < 2018 || seq < 10 {
                    builder
                        .add_result(&key, if female { "ELEITO" } else { "SUPLENTE" })
                        .unwrap();
                }
            }
        }
        // Outside the configured years.
        builder
            .add_candidate(info(2002, 1, "DEFERIDO", "FEMININO"))
            .unwrap();
        let config = ModelConfig::new(&[2010, 2014, 2018], 2014);
        let ctx = RunContext::load(&builder, &config).unwrap();
        let report = ctx.run().unwrap();

        assert_eq!(report.integrated_rows, 37);
        assert_eq!(report.other_years, 1);
        assert_eq!(report.encoded.rows.len(), 36);
        assert_eq!(report.digit_rates.len(), 30);
        // Education and expenditure are never known: no complete case.
        assert!(report.regressions.fits.is_empty());
        assert_eq!(report.regressions.skipped.len(), 3);
        assert!(report
            .regressions
            .skipped
            .iter()
            .all(|s| s.reason == FitFailure::NoObservations));

        assert_eq!(report.training.n_train, 24);
        assert_eq!(report.training.predictions.len(), 12);
        let ev = report.evaluation.unwrap();
        assert_eq!(ev.confusion.total(), 10);
        assert_eq!(ev.accuracy, 1.0);
        assert_eq!(ev.auc, Some(1.0));
    }

    /// Deterministic uniform draws in [0, 1).
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }

        fn pick<'a>(&mut self, labels: &[&'a str]) -> &'a str {
            labels[((self.next() * labels.len() as f64) as usize).min(labels.len() - 1)]
        }
    }

    #[test]
    fn complete_years_are_fitted() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = Lcg(17);
        let mut builder = Builder::new();
        for year in [2014, 2018] {
            for seq in 0..400 {
                let mut c = CandidateInfo::new(
                    CandidateKey::new(year, "SP", seq),
                    CandidacyStatus::Accepted,
                );
                let digit = (rng.next() * 10.0) as i64 % 10;
                c.ballot_number = Some(format!("{}{}{}", 10 + seq % 80, digit, 10 + seq % 90));
                let age = 25 + (rng.next() * 45.0) as u32;
                c.age = Some(age);
                let gender = rng.pick(&["MASCULINO", "FEMININO"]);
                c.gender = Some(gender.to_string());
                c.education_level = Some(
                    rng.pick(&["ENSINO FUNDAMENTAL COMPLETO", "ENSINO MÉDIO COMPLETO", "SUPERIOR COMPLETO"])
                        .to_string(),
                );
                c.marital_status = Some(rng.pick(&["CASADO(A)", "SOLTEIRO(A)"]).to_string());
                c.nationality = Some(
                    rng.pick(&["BRASILEIRA NATA", "BRASILEIRA NATA", "BRASILEIRA (NATURALIZADA)"])
                        .to_string(),
                );
                c.birth_state = Some(rng.pick(&["SP", "SP", "MG"]).to_string());
                c.race = Some(rng.pick(&["BRANCA", "PARDA"]).to_string());
                let key = c.key.clone();
                builder.add_candidate(c).unwrap();
                builder
                    .add_financial_item(StreamName::NetWorth, &key, (1000.0 * rng.next()).round())
                    .unwrap();
                builder
                    .add_financial_item(StreamName::Expenditure, &key, (500.0 * rng.next()).round())
                    .unwrap();

                let eta = -0.5 + if gender == "FEMININO" { 1.0 } else { 0.0 } - 0.03 * (age as f64 - 45.0);
                let elected = rng.next() < 1.0 / (1.0 + (-eta).exp());
                builder
                    .add_result(&key, if elected { "ELEITO" } else { "NÃO ELEITO" })
                    .unwrap();
            }
        }
        let config = ModelConfig::new(&[2014, 2018], 2014);
        let report = RunContext::load(&builder, &config).unwrap().run().unwrap();

        assert!(report.encoded.issues.is_empty());
        assert!(report.regressions.skipped.is_empty());
        let years: Vec<i32> = report.regressions.fits.iter().map(|f| f.year).collect();
        assert_eq!(years, vec![2014, 2018]);
        for fit in report.regressions.fits.iter() {
            assert_eq!(fit.n_obs, 400);
            assert_eq!(fit.coefficients.len(), 18);
            assert_eq!(fit.coefficients[0].name, regression::INTERCEPT);
            assert!(fit.coefficients.iter().all(|c| c.std_error.is_finite()));
            assert!(fit.pseudo_r2 > 0.0 && fit.pseudo_r2 < 1.0);
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let tables = SourceTables::default();
        let config = ModelConfig::new(&[2010, 2014], 2014);
        assert!(matches!(
            run_pipeline(&tables, &config),
            Err(ModelError::InvalidConfig { .. })
        ));
        assert!(matches!(
            run_pipeline(&tables, &ModelConfig::new(&[], 2014)),
            Err(ModelError::InvalidConfig { .. })
        ));
    }
}
