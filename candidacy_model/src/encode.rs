use log::{debug, info, warn};

use crate::config::*;
use crate::integrate::CandidateFeatureVector;

/// Labels that the electoral court uses for a value that was not filled in.
pub const NULL_MARKERS: [&str; 3] = ["#NULO#", "#NE#", "#NULO"];

/// The result of looking up a raw label in a mapping table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Lookup {
    Code(u8),
    /// Blank, absent or explicitly marked as not filled in.
    Missing,
    /// Present but not part of the declared domain.
    OutOfDomain,
}

/// A fixed mapping from raw categorical labels to numeric codes.
///
/// Labels are compared after trimming and upper-casing. There is no default
/// code: anything outside the table is reported as such.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CategoryMap {
    entries: Vec<(String, u8)>,
}

impl CategoryMap {
    pub fn new(entries: &[(&str, u8)]) -> CategoryMap {
        CategoryMap::from_entries(
            entries
                .iter()
                .map(|(label, code)| (label.to_string(), *code))
                .collect(),
        )
    }

    pub fn from_entries(entries: Vec<(String, u8)>) -> CategoryMap {
        CategoryMap {
            entries: entries
                .into_iter()
                .map(|(label, code)| (normalize_label(&label), code))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(String, u8)] {
        &self.entries
    }

    pub fn lookup(&self, raw: Option<&str>) -> Lookup {
        let label = match raw.map(normalize_label) {
            None => return Lookup::Missing,
            Some(l) if l.is_empty() || NULL_MARKERS.contains(&l.as_str()) => {
                return Lookup::Missing
            }
            Some(l) => l,
        };
        self.entries
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, code)| Lookup::Code(*code))
            .unwrap_or(Lookup::OutOfDomain)
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// The mapping tables of all the categorical attributes.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EncodingTables {
    /// 1 for married or widowed.
    pub marital_status: CategoryMap,
    /// 1 for anything but male.
    pub gender: CategoryMap,
    /// Education ladder, from 0 (illiterate or not disclosed) to 7 (completed
    /// higher education).
    pub education_level: CategoryMap,
    /// 1 for native citizens.
    pub nationality: CategoryMap,
    /// 1 for anything but the majority category.
    pub race: CategoryMap,
}

impl Default for EncodingTables {
    fn default() -> Self {
        EncodingTables {
            marital_status: CategoryMap::new(&[
                ("CASADO(A)", 1),
                ("VIÚVO(A)", 1),
                ("SOLTEIRO(A)", 0),
                ("DIVORCIADO(A)", 0),
                ("SEPARADO(A) JUDICIALMENTE", 0),
            ]),
            gender: CategoryMap::new(&[("MASCULINO", 0), ("FEMININO", 1)]),
            education_level: CategoryMap::new(&[
                ("NÃO DIVULGÁVEL", 0),
                ("ANALFABETO", 0),
                ("LÊ E ESCREVE", 1),
                ("ENSINO FUNDAMENTAL INCOMPLETO", 2),
                ("ENSINO FUNDAMENTAL COMPLETO", 3),
                ("ENSINO MÉDIO INCOMPLETO", 4),
                ("ENSINO MÉDIO COMPLETO", 5),
                ("SUPERIOR INCOMPLETO", 6),
                ("SUPERIOR COMPLETO", 7),
            ]),
            nationality: CategoryMap::new(&[
                ("BRASILEIRA NATA", 1),
                ("BRASILEIRA (NATURALIZADA)", 0),
                ("PORTUGUESA COM IGUALDADE DE DIREITOS", 0),
                ("ESTRANGEIRO", 0),
            ]),
            race: CategoryMap::new(&[
                ("BRANCA", 0),
                ("PRETA", 1),
                ("PARDA", 1),
                ("AMARELA", 1),
                ("INDÍGENA", 1),
            ]),
        }
    }
}

/// Expands a categorical code into binary indicators, one per category of
/// the domain except the reference category.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DummyEncoder {
    name: String,
    domain: Vec<u8>,
    reference: u8,
}

impl DummyEncoder {
    pub fn new(name: &str, domain: &[u8], reference: u8) -> DummyEncoder {
        DummyEncoder {
            name: name.to_string(),
            domain: domain.to_vec(),
            reference,
        }
    }

    /// The indicator codes, in domain order.
    fn indicators(&self) -> impl Iterator<Item = u8> + '_ {
        self.domain
            .iter()
            .cloned()
            .filter(move |c| *c != self.reference)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.indicators()
            .map(|c| format!("{}_{}", self.name, c))
            .collect()
    }

    /// An unknown code (or one outside the domain) gives unknown indicators.
    pub fn expand(&self, code: Option<u8>) -> Vec<Option<f64>> {
        match code {
            Some(c) if self.domain.contains(&c) => self
                .indicators()
                .map(|i| Some(if i == c { 1.0 } else { 0.0 }))
                .collect(),
            _ => self.indicators().map(|_| None).collect(),
        }
    }
}

/// Indicators for the third digit of the ballot number, 0 being the reference.
pub fn third_digit_dummies() -> DummyEncoder {
    DummyEncoder::new("third_digit", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9], 0)
}

/// The third character of a ballot number, counting from the left.
///
/// Ballot numbers are made of digits only. Anything else, or a number with
/// fewer than three digits, has no third digit.
pub fn third_digit(ballot_number: &str) -> Option<u8> {
    let s = ballot_number.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.chars()
        .nth(2)
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
}

/// A candidacy ready for the models. Every feature may be unknown.
#[derive(PartialEq, Debug, Clone)]
pub struct EncodedCandidate {
    pub key: CandidateKey,
    pub elected: Option<bool>,
    pub age: Option<f64>,
    pub gender: Option<u8>,
    pub education: Option<u8>,
    pub married: Option<u8>,
    pub national: Option<u8>,
    pub is_local: Option<u8>,
    pub non_majority_race: Option<u8>,
    pub third_digit: Option<u8>,
    pub net_worth: Option<f64>,
    pub contributions: Option<f64>,
    pub expenditure: Option<f64>,
}

/// A raw value that could not be mapped. The feature is left unknown.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EncodingIssue {
    pub key: CandidateKey,
    pub field: &'static str,
    pub value: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EncodedTable {
    pub rows: Vec<EncodedCandidate>,
    pub issues: Vec<EncodingIssue>,
    /// Number of input rows dropped because of their candidacy status.
    pub ineligible: usize,
}

/// Turns integrated candidacies into numeric features.
///
/// Encoding is only defined on raw labels: the output is a different type,
/// and numeric codes fed back as labels fall outside every table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FeatureEncoder {
    tables: EncodingTables,
}

impl FeatureEncoder {
    pub fn new(tables: &EncodingTables) -> FeatureEncoder {
        FeatureEncoder {
            tables: tables.clone(),
        }
    }

    pub fn encode(&self, rows: &[CandidateFeatureVector]) -> EncodedTable {
        let mut issues: Vec<EncodingIssue> = Vec::new();
        let mut encoded: Vec<EncodedCandidate> = Vec::new();
        let mut ineligible = 0;
        for row in rows.iter() {
            if !row.info.candidacy_status.is_eligible() {
                debug!(
                    "encode: skipping {} with status {:?}",
                    row.info.key, row.info.candidacy_status
                );
                ineligible += 1;
                continue;
            }
            encoded.push(self.encode_row(row, &mut issues));
        }
        info!(
            "Encoded {} eligible candidacies, {} ineligible, {} encoding issues",
            encoded.len(),
            ineligible,
            issues.len()
        );
        if !issues.is_empty() {
            warn!("encode: first encoding issue: {:?}", issues[0]);
        }
        EncodedTable {
            rows: encoded,
            issues,
            ineligible,
        }
    }

    fn encode_row(
        &self,
        row: &CandidateFeatureVector,
        issues: &mut Vec<EncodingIssue>,
    ) -> EncodedCandidate {
        let info = &row.info;
        let mut code = |map: &CategoryMap, field: &'static str, raw: &Option<String>| match map
            .lookup(raw.as_deref())
        {
            Lookup::Code(c) => Some(c),
            Lookup::Missing => None,
            Lookup::OutOfDomain => {
                issues.push(EncodingIssue {
                    key: info.key.clone(),
                    field,
                    value: raw.clone().unwrap_or_default(),
                });
                None
            }
        };

        let gender = code(&self.tables.gender, "gender", &info.gender);
        let education = code(
            &self.tables.education_level,
            "education_level",
            &info.education_level,
        );
        let married = code(
            &self.tables.marital_status,
            "marital_status",
            &info.marital_status,
        );
        let national = code(&self.tables.nationality, "nationality", &info.nationality);
        let non_majority_race = code(&self.tables.race, "race", &info.race);

        let is_local = match info.birth_state.as_deref().map(normalize_label) {
            Some(b) if !b.is_empty() && !NULL_MARKERS.contains(&b.as_str()) => {
                Some(u8::from(b == normalize_label(&info.key.state_code)))
            }
            _ => None,
        };

        let third = match info.ballot_number.as_deref() {
            None => None,
            Some(b) => {
                let d = third_digit(b);
                if d.is_none() {
                    issues.push(EncodingIssue {
                        key: info.key.clone(),
                        field: "ballot_number",
                        value: b.to_string(),
                    });
                }
                d
            }
        };

        if let Some(outcome) = &row.unrecognized_outcome {
            issues.push(EncodingIssue {
                key: info.key.clone(),
                field: "outcome",
                value: outcome.clone(),
            });
        }

        EncodedCandidate {
            key: info.key.clone(),
            elected: row.elected,
            age: info.age.map(f64::from),
            gender,
            education,
            married,
            national,
            is_local,
            non_majority_race,
            third_digit: third,
            net_worth: row.net_worth,
            contributions: row.contributions,
            expenditure: row.expenditure,
        }
    }
}
