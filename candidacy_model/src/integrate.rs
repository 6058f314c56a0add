use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;

/// Access to the five record streams of a run.
///
/// Implementations may query a remote service or read local files: the
/// pipeline only sees the records.
pub trait RecordStore {
    type Error: std::error::Error + 'static;

    fn candidate_info(&self) -> Result<Vec<CandidateInfo>, Self::Error>;

    /// The itemized amounts of one of the financial streams.
    fn financial_items(&self, stream: StreamName) -> Result<Vec<FinancialItem>, Self::Error>;

    fn results(&self) -> Result<Vec<CandidateResult>, Self::Error>;
}

/// The five streams, loaded once per run. Financial streams hold one
/// aggregate per candidacy.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SourceTables {
    pub info: Vec<CandidateInfo>,
    pub net_worth: Vec<KeyedAmount>,
    pub contributions: Vec<KeyedAmount>,
    pub expenditure: Vec<KeyedAmount>,
    pub results: Vec<CandidateResult>,
}

impl SourceTables {
    pub fn load<S: RecordStore>(store: &S) -> Result<SourceTables, S::Error> {
        let info = store.candidate_info()?;
        info!("Loaded {} candidacies", info.len());
        let net_worth = aggregate_items(&store.financial_items(StreamName::NetWorth)?);
        let contributions = aggregate_items(&store.financial_items(StreamName::Contributions)?);
        let expenditure = aggregate_items(&store.financial_items(StreamName::Expenditure)?);
        let results = store.results()?;
        info!(
            "Loaded aggregates: net worth {}, contributions {}, expenditure {}, results {}",
            net_worth.len(),
            contributions.len(),
            expenditure.len(),
            results.len()
        );
        Ok(SourceTables {
            info,
            net_worth,
            contributions,
            expenditure,
            results,
        })
    }

    pub fn amounts(&self, stream: StreamName) -> &[KeyedAmount] {
        match stream {
            StreamName::NetWorth => &self.net_worth,
            StreamName::Contributions => &self.contributions,
            StreamName::Expenditure => &self.expenditure,
            StreamName::CandidateInfo | StreamName::Results => &[],
        }
    }
}

/// Sums the items per candidacy. Candidacies without any item get no row.
pub fn aggregate_items(items: &[FinancialItem]) -> Vec<KeyedAmount> {
    let mut sums: BTreeMap<&CandidateKey, f64> = BTreeMap::new();
    for item in items.iter() {
        *sums.entry(&item.key).or_insert(0.0) += item.amount;
    }
    sums.into_iter()
        .map(|(key, amount)| KeyedAmount {
            key: key.clone(),
            amount,
        })
        .collect()
}

/// A candidacy joined with everything known about it.
/// Financial values and the outcome stay unknown when the stream has no row.
#[derive(PartialEq, Debug, Clone)]
pub struct CandidateFeatureVector {
    pub info: CandidateInfo,
    pub net_worth: Option<f64>,
    pub contributions: Option<f64>,
    pub expenditure: Option<f64>,
    pub elected: Option<bool>,
    /// The outcome label, when it is in neither outcome table.
    pub unrecognized_outcome: Option<String>,
}

/// Left-joins the candidacies with the financial aggregates and the results.
///
/// The output has exactly one row per candidacy, in input order.
pub fn integrate(tables: &SourceTables) -> Result<Vec<CandidateFeatureVector>, ModelError> {
    info!("Integrating {} candidacies", tables.info.len());
    index_by_key(&tables.info, StreamName::CandidateInfo)?;
    let net_worth = index_by_key(&tables.net_worth, StreamName::NetWorth)?;
    let contributions = index_by_key(&tables.contributions, StreamName::Contributions)?;
    let expenditure = index_by_key(&tables.expenditure, StreamName::Expenditure)?;
    let results = index_by_key(&tables.results, StreamName::Results)?;

    let amount_of = |index: &HashMap<&CandidateKey, &KeyedAmount>, key: &CandidateKey| {
        index.get(key).map(|ka| ka.amount)
    };

    let rows: Vec<CandidateFeatureVector> = tables
        .info
        .iter()
        .map(|info| {
            let result = results.get(&info.key);
            let lookup = result.map(|r| r.outcome_lookup());
            CandidateFeatureVector {
                info: info.clone(),
                net_worth: amount_of(&net_worth, &info.key),
                contributions: amount_of(&contributions, &info.key),
                expenditure: amount_of(&expenditure, &info.key),
                elected: match lookup {
                    Some(OutcomeLookup::Known(b)) => Some(b),
                    _ => None,
                },
                unrecognized_outcome: match lookup {
                    Some(OutcomeLookup::OutOfDomain) => result.and_then(|r| r.outcome.clone()),
                    _ => None,
                },
            }
        })
        .collect();

    debug!(
        "integrate: without net worth: {}, without contributions: {}, without expenditure: {}, without outcome: {}",
        rows.iter().filter(|r| r.net_worth.is_none()).count(),
        rows.iter().filter(|r| r.contributions.is_none()).count(),
        rows.iter().filter(|r| r.expenditure.is_none()).count(),
        rows.iter().filter(|r| r.elected.is_none()).count()
    );
    Ok(rows)
}

fn index_by_key<T: Keyed>(
    rows: &[T],
    stream: StreamName,
) -> Result<HashMap<&CandidateKey, &T>, ModelError> {
    let mut index: HashMap<&CandidateKey, &T> = HashMap::with_capacity(rows.len());
    for row in rows.iter() {
        let key = row.key();
        ensure!(
            index.insert(key, row).is_none(),
            JoinIntegritySnafu {
                stream,
                key: key.clone()
            }
        );
    }
    Ok(index)
}
