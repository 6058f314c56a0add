use std::collections::BTreeMap;

use snafu::prelude::*;

pub use crate::config::*;
use crate::integrate::{RecordStore, SourceTables};

/// An in-memory record store.
///
/// The records are kept as they are added. Financial items are summed per
/// candidacy when the tables are built.
///
/// ```
/// use candidacy_model::builder::Builder;
/// use candidacy_model::{CandidacyStatus, CandidateInfo, CandidateKey, StreamName};
/// # use candidacy_model::ModelError;
///
/// let key = CandidateKey::new(2006, "SP", 250000001);
/// let mut builder = Builder::new();
/// builder.add_candidate(CandidateInfo::new(key.clone(), CandidacyStatus::Accepted))?;
/// builder.add_financial_item(StreamName::NetWorth, &key, 1200.0)?;
/// builder.add_financial_item(StreamName::NetWorth, &key, 300.0)?;
/// builder.add_result(&key, "ELEITO")?;
///
/// let tables = builder.build()?;
/// assert_eq!(tables.net_worth[0].amount, 1500.0);
/// # Ok::<(), ModelError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    candidates: Vec<CandidateInfo>,
    items: BTreeMap<StreamName, Vec<FinancialItem>>,
    results: Vec<CandidateResult>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn add_candidate(&mut self, info: CandidateInfo) -> Result<(), ModelError> {
        self.candidates.push(info);
        Ok(())
    }

    /// Adds one itemized amount to a financial stream.
    pub fn add_financial_item(
        &mut self,
        stream: StreamName,
        key: &CandidateKey,
        amount: f64,
    ) -> Result<(), ModelError> {
        ensure!(stream.is_financial(), NotFinancialStreamSnafu { stream });
        self.items.entry(stream).or_default().push(FinancialItem {
            key: key.clone(),
            amount,
        });
        Ok(())
    }

    pub fn add_result(&mut self, key: &CandidateKey, outcome: &str) -> Result<(), ModelError> {
        self.results.push(CandidateResult {
            key: key.clone(),
            outcome: Some(outcome.to_string()),
        });
        Ok(())
    }

    pub fn build(&self) -> Result<SourceTables, ModelError> {
        SourceTables::load(self)
    }
}

impl RecordStore for Builder {
    type Error = ModelError;

    fn candidate_info(&self) -> Result<Vec<CandidateInfo>, ModelError> {
        Ok(self.candidates.clone())
    }

    fn financial_items(&self, stream: StreamName) -> Result<Vec<FinancialItem>, ModelError> {
        ensure!(stream.is_financial(), NotFinancialStreamSnafu { stream });
        Ok(self.items.get(&stream).cloned().unwrap_or_default())
    }

    fn results(&self) -> Result<Vec<CandidateResult>, ModelError> {
        Ok(self.results.clone())
    }
}
