// Conversion of the raw stream tables into records.

use crate::forecast::*;

use candidacy_model::encode::NULL_MARKERS;

pub const YEAR: &str = "ano";
pub const STATE: &str = "sigla_uf";
pub const SEQUENCE: &str = "sequencial_candidato";

pub const BALLOT_NUMBER: &str = "numero";
pub const PARTY: &str = "sigla_partido";
pub const OFFICE: &str = "cargo";
pub const STATUS: &str = "situacao";
pub const OCCUPATION: &str = "ocupacao";
pub const AGE: &str = "idade";
pub const GENDER: &str = "genero";
pub const EDUCATION: &str = "instrucao";
pub const MARITAL_STATUS: &str = "estado_civil";
pub const NATIONALITY: &str = "nacionalidade";
pub const BIRTH_STATE: &str = "sigla_uf_nascimento";
pub const RACE: &str = "raca";

pub const OUTCOME: &str = "resultado";

/// The column holding the itemized amounts of a financial stream.
pub fn amount_column(stream: StreamName) -> Option<&'static str> {
    match stream {
        StreamName::NetWorth => Some("valor_item"),
        StreamName::Contributions => Some("valor_receita"),
        StreamName::Expenditure => Some("valor_despesa"),
        StreamName::CandidateInfo | StreamName::Results => None,
    }
}

/// A stream as read from a file: a header and text cells. Blank cells and
/// the null markers of the electoral court are already missing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StreamTable {
    pub stream: StreamName,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// The line of the first data row in the source, for error messages.
    pub first_line: usize,
}

pub fn clean_cell(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || NULL_MARKERS.contains(&s) {
        None
    } else {
        Some(s.to_string())
    }
}

/// Reads a number with either a decimal point or a decimal comma (in which
/// case dots are thousands separators).
pub fn parse_amount(s: &str) -> Option<f64> {
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };
    normalized.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Integers are sometimes exported as decimals ("2014.0").
fn parse_integer(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        parse_amount(s)
            .filter(|x| x.fract() == 0.0 && x.abs() < 9.0e15)
            .map(|x| x as i64)
    })
}

/// Positions of the requested columns in the header.
struct Columns<'a> {
    table: &'a StreamTable,
}

impl<'a> Columns<'a> {
    fn index(&self, name: &str) -> ForecastResult<usize> {
        self.table
            .header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .context(MissingColumnSnafu {
                stream: self.table.stream,
                column: name,
            })
    }
}

fn cell(row: &[Option<String>], idx: usize) -> Option<String> {
    row.get(idx).cloned().flatten()
}

struct KeyReader {
    year: usize,
    state: usize,
    sequence: usize,
}

impl KeyReader {
    fn new(cols: &Columns) -> ForecastResult<KeyReader> {
        Ok(KeyReader {
            year: cols.index(YEAR)?,
            state: cols.index(STATE)?,
            sequence: cols.index(SEQUENCE)?,
        })
    }

    fn read(&self, table: &StreamTable, row: &[Option<String>], lineno: usize) -> ForecastResult<CandidateKey> {
        let wrong = |column: &str, content: Option<String>| WrongCellTypeSnafu {
            stream: table.stream,
            lineno,
            column: column.to_string(),
            content: content.unwrap_or_default(),
        };
        let year_s = cell(row, self.year);
        let year = year_s
            .as_deref()
            .and_then(parse_integer)
            .and_then(|y| i32::try_from(y).ok())
            .with_context(|| wrong(YEAR, year_s.clone()))?;
        let state_s = cell(row, self.state);
        let state = state_s.clone().with_context(|| wrong(STATE, state_s.clone()))?;
        let seq_s = cell(row, self.sequence);
        let sequence = seq_s
            .as_deref()
            .and_then(parse_integer)
            .with_context(|| wrong(SEQUENCE, seq_s.clone()))?;
        Ok(CandidateKey::new(year, &state, sequence))
    }
}

pub fn to_candidate_info(table: &StreamTable) -> ForecastResult<Vec<CandidateInfo>> {
    let cols = Columns { table };
    let keys = KeyReader::new(&cols)?;
    let status_idx = cols.index(STATUS)?;
    let ballot_idx = cols.index(BALLOT_NUMBER)?;
    let party_idx = cols.index(PARTY)?;
    let office_idx = cols.index(OFFICE)?;
    let occupation_idx = cols.index(OCCUPATION)?;
    let age_idx = cols.index(AGE)?;
    let gender_idx = cols.index(GENDER)?;
    let education_idx = cols.index(EDUCATION)?;
    let marital_idx = cols.index(MARITAL_STATUS)?;
    let nationality_idx = cols.index(NATIONALITY)?;
    let birth_idx = cols.index(BIRTH_STATE)?;
    let race_idx = cols.index(RACE)?;

    let mut res: Vec<CandidateInfo> = Vec::with_capacity(table.rows.len());
    for (idx, row) in table.rows.iter().enumerate() {
        let lineno = table.first_line + idx;
        let key = keys.read(table, row, lineno)?;
        let status = cell(row, status_idx)
            .map(|s| CandidacyStatus::from_label(&s))
            .unwrap_or_else(|| CandidacyStatus::Other(String::new()));
        let age = match cell(row, age_idx) {
            None => None,
            Some(s) => Some(
                parse_integer(&s)
                    .and_then(|a| u32::try_from(a).ok())
                    .context(WrongCellTypeSnafu {
                        stream: table.stream,
                        lineno,
                        column: AGE.to_string(),
                        content: s.clone(),
                    })?,
            ),
        };
        res.push(CandidateInfo {
            key,
            ballot_number: cell(row, ballot_idx),
            party: cell(row, party_idx),
            office: cell(row, office_idx),
            candidacy_status: status,
            occupation: cell(row, occupation_idx),
            age,
            gender: cell(row, gender_idx),
            education_level: cell(row, education_idx),
            marital_status: cell(row, marital_idx),
            nationality: cell(row, nationality_idx),
            birth_state: cell(row, birth_idx),
            race: cell(row, race_idx),
        });
    }
    Ok(res)
}

/// Rows without an amount are skipped.
pub fn to_financial_items(table: &StreamTable) -> ForecastResult<Vec<FinancialItem>> {
    let cols = Columns { table };
    let keys = KeyReader::new(&cols)?;
    let column = amount_column(table.stream).context(MissingColumnSnafu {
        stream: table.stream,
        column: "amount",
    })?;
    let amount_idx = cols.index(column)?;

    let mut res: Vec<FinancialItem> = Vec::with_capacity(table.rows.len());
    let mut skipped = 0;
    for (idx, row) in table.rows.iter().enumerate() {
        let lineno = table.first_line + idx;
        let key = keys.read(table, row, lineno)?;
        match cell(row, amount_idx) {
            None => skipped += 1,
            Some(s) => {
                let amount = parse_amount(&s).context(WrongCellTypeSnafu {
                    stream: table.stream,
                    lineno,
                    column: column.to_string(),
                    content: s.clone(),
                })?;
                res.push(FinancialItem { key, amount });
            }
        }
    }
    if skipped > 0 {
        warn!(
            "{}: {} rows without an amount were skipped",
            table.stream, skipped
        );
    }
    Ok(res)
}

pub fn to_results(table: &StreamTable) -> ForecastResult<Vec<CandidateResult>> {
    let cols = Columns { table };
    let keys = KeyReader::new(&cols)?;
    let outcome_idx = cols.index(OUTCOME)?;
    let mut res: Vec<CandidateResult> = Vec::with_capacity(table.rows.len());
    for (idx, row) in table.rows.iter().enumerate() {
        let key = keys.read(table, row, table.first_line + idx)?;
        res.push(CandidateResult {
            key,
            outcome: cell(row, outcome_idx),
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(stream: StreamName, header: &[&str], rows: &[&[&str]]) -> StreamTable {
        StreamTable {
            stream,
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| clean_cell(c)).collect())
                .collect(),
            first_line: 2,
        }
    }

    #[test]
    fn cells_and_amounts() {
        assert_eq!(clean_cell("  SP "), Some("SP".to_string()));
        assert_eq!(clean_cell("#NULO#"), None);
        assert_eq!(clean_cell("#NE#"), None);
        assert_eq!(clean_cell("   "), None);
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_integer("2014.0"), Some(2014));
        assert_eq!(parse_integer("250000012345"), Some(250000012345));
    }

    const CANDIDATE_HEADER: [&str; 15] = [
        "ANO",
        "sigla_uf",
        "sequencial_candidato",
        "numero",
        "sigla_partido",
        "cargo",
        "situacao",
        "ocupacao",
        "idade",
        "genero",
        "instrucao",
        "estado_civil",
        "nacionalidade",
        "sigla_uf_nascimento",
        "raca",
    ];

    #[test]
    fn candidate_rows() {
        let t = table(
            StreamName::CandidateInfo,
            &CANDIDATE_HEADER,
            &[
                &[
                    "2014", "SP", "250000001", "12345", "PT", "DEPUTADO ESTADUAL", "DEFERIDO",
                    "ADVOGADO", "45", "FEMININO", "SUPERIOR COMPLETO", "CASADO(A)",
                    "BRASILEIRA NATA", "SP", "#NULO#",
                ],
                &[
                    "2014", "SP", "250000002", "#NULO#", "PSOL", "DEPUTADO ESTADUAL", "INDEFERIDO",
                    "", "", "MASCULINO", "", "", "", "", "",
                ],
            ],
        );
        let infos = to_candidate_info(&t).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].key, CandidateKey::new(2014, "SP", 250000001));
        assert_eq!(infos[0].candidacy_status, CandidacyStatus::Accepted);
        assert_eq!(infos[0].age, Some(45));
        assert_eq!(infos[0].ballot_number.as_deref(), Some("12345"));
        assert_eq!(infos[0].gender.as_deref(), Some("FEMININO"));
        assert_eq!(infos[0].race, None);
        assert_eq!(infos[1].ballot_number, None);
        assert_eq!(infos[1].age, None);
        assert_eq!(
            infos[1].candidacy_status,
            CandidacyStatus::Other("INDEFERIDO".to_string())
        );
    }

    #[test]
    fn candidate_attribute_columns_are_required() {
        let header: Vec<&str> = CANDIDATE_HEADER
            .iter()
            .cloned()
            .filter(|h| *h != "genero")
            .collect();
        let t = table(StreamName::CandidateInfo, &header, &[]);
        match to_candidate_info(&t) {
            Err(ForecastError::MissingColumn { stream, column }) => {
                assert_eq!(stream, StreamName::CandidateInfo);
                assert_eq!(column, "genero");
            }
            x => panic!("unexpected {:?}", x),
        }

        // Only the key and the status.
        let t = table(
            StreamName::CandidateInfo,
            &["ano", "sigla_uf", "sequencial_candidato", "situacao"],
            &[&["2014", "SP", "1", "DEFERIDO"]],
        );
        assert!(matches!(
            to_candidate_info(&t),
            Err(ForecastError::MissingColumn { .. })
        ));
    }

    #[test]
    fn missing_key_column() {
        let t = table(StreamName::Results, &["ano", "sigla_uf", "resultado"], &[]);
        assert!(matches!(
            to_results(&t),
            Err(ForecastError::MissingColumn { .. })
        ));
    }

    #[test]
    fn bad_cells_report_their_line() {
        let t = table(
            StreamName::NetWorth,
            &["ano", "sigla_uf", "sequencial_candidato", "valor_item"],
            &[
                &["2010", "RJ", "1", "10,5"],
                &["2010", "RJ", "1", ""],
                &["2010", "RJ", "2", "dez"],
            ],
        );
        match to_financial_items(&t) {
            Err(ForecastError::WrongCellType { lineno, column, .. }) => {
                assert_eq!(lineno, 4);
                assert_eq!(column, "valor_item");
            }
            x => panic!("unexpected {:?}", x),
        }
        let ok = table(
            StreamName::NetWorth,
            &["ano", "sigla_uf", "sequencial_candidato", "valor_item"],
            &[&["2010", "RJ", "1", "10,5"], &["2010", "RJ", "1", ""]],
        );
        let items = to_financial_items(&ok).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, 10.5);
    }
}
