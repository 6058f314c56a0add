use log::{debug, info, warn};

use candidacy_model::encode::CategoryMap;
use candidacy_model::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Reader, Xlsx};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_xlsx;
pub mod report;

use crate::forecast::config_reader::*;
use crate::forecast::io_common::StreamTable;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ForecastError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading {path}, line {lineno}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("{path}, line {lineno}: the text is not in the configured encoding"))]
    WrongEncoding { path: String, lineno: usize },

    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet {sheet} in {path}"))]
    MissingSheet { path: String, sheet: String },

    #[snafu(display("Stream {stream} in {path} has no header"))]
    EmptyStream { stream: StreamName, path: String },
    #[snafu(display("Stream {stream} has no column {column}"))]
    MissingColumn { stream: StreamName, column: String },
    #[snafu(display("Stream {stream}, line {lineno}, column {column}: could not understand {content:?}"))]
    WrongCellType {
        stream: StreamName,
        lineno: usize,
        column: String,
        content: String,
    },
    #[snafu(display("Unknown provider {provider}"))]
    UnknownProvider { provider: String },

    #[snafu(display("Pipeline error"))]
    Model { source: ModelError },

    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ForecastResult<T> = Result<T, ForecastError>;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Provider {
    Csv {
        delimiter: u8,
        encoding: TextEncoding,
    },
    Xlsx,
}

/// The five streams, read from local CSV files or from an Excel workbook.
pub struct FileStore {
    settings: SourceSettings,
    provider: Provider,
    /// Directory of the CSV files, or path of the workbook.
    location: PathBuf,
}

impl FileStore {
    pub fn new(settings: &SourceSettings, root: &Path) -> ForecastResult<FileStore> {
        let provider = match settings.provider.as_str() {
            "csv" => Provider::Csv {
                delimiter: settings.delimiter_byte()?,
                encoding: settings.text_encoding()?,
            },
            "xlsx" => Provider::Xlsx,
            x => {
                return UnknownProviderSnafu { provider: x }.fail();
            }
        };
        Ok(FileStore {
            settings: settings.clone(),
            provider,
            location: root.join(&settings.path),
        })
    }

    fn read_table(&self, stream: StreamName) -> ForecastResult<StreamTable> {
        let name = self.settings.stream_location(stream);
        match self.provider {
            Provider::Csv {
                delimiter,
                encoding,
            } => {
                let p = self.location.join(name).display().to_string();
                io_csv::read_csv_table(&p, stream, delimiter, encoding)
            }
            Provider::Xlsx => {
                let p = self.location.display().to_string();
                io_xlsx::read_xlsx_table(&p, &name, stream)
            }
        }
    }
}

impl RecordStore for FileStore {
    type Error = ForecastError;

    fn candidate_info(&self) -> ForecastResult<Vec<CandidateInfo>> {
        io_common::to_candidate_info(&self.read_table(StreamName::CandidateInfo)?)
    }

    fn financial_items(&self, stream: StreamName) -> ForecastResult<Vec<FinancialItem>> {
        io_common::to_financial_items(&self.read_table(stream)?)
    }

    fn results(&self) -> ForecastResult<Vec<CandidateResult>> {
        io_common::to_results(&self.read_table(StreamName::Results)?)
    }
}

fn write_output(out: &str, contents: &str) -> ForecastResult<()> {
    if out == "stdout" {
        println!("{}", contents);
        return Ok(());
    }
    info!("Writing report to {:?}", out);
    fs::write(out, contents).context(WritingOutputSnafu { path: out })
}

/// Where the report goes when no output is given on the command line.
fn default_output(settings: &OutputSettings, root: &Path) -> String {
    match &settings.output_directory {
        Some(dir) => root
            .join(dir)
            .join(format!("{}_report.json", settings.run_name))
            .display()
            .to_string(),
        None => "stdout".to_string(),
    }
}

/// Runs the whole forecast described by a configuration file and writes the
/// JSON report.
///
/// If a reference report is provided, the report must match it exactly.
pub fn run_forecast(
    config_path: &str,
    out: Option<String>,
    check_summary_path: Option<String>,
    cutoff_override: Option<i32>,
) -> ForecastResult<JSValue> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);
    let model_config = validate_model(&config, cutoff_override)?;

    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let store = FileStore::new(&config.source, root_p)?;
    let ctx = RunContext::load(&store, &model_config)?;
    let pipeline_report = ctx.run().context(ModelSnafu {})?;
    for s in pipeline_report.regressions.skipped.iter() {
        warn!("Year {} has no regression: {}", s.year, s.reason);
    }

    let result_js = report::build_report_js(&config.output_settings, &model_config, &pipeline_report);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    let out_path = out.unwrap_or_else(|| default_output(&config.output_settings, root_p));
    write_output(&out_path, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        debug!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference report");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between the report and the reference report")
        }
    }

    Ok(result_js)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_config() -> String {
        format!(
            "{}/tests/data/synthetic/config.json",
            env!("CARGO_MANIFEST_DIR")
        )
    }

    fn tmp_out(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("candforecast-{}-{}", std::process::id(), name))
            .display()
            .to_string()
    }

    #[test]
    fn synthetic_run() {
        let _ = env_logger::builder().is_test(true).try_init();
        let out = tmp_out("synthetic_report.json");
        let js = run_forecast(&fixture_config(), Some(out.clone()), None, None).unwrap();

        assert_eq!(js["config"]["testYear"], json!(2018));
        assert_eq!(js["integration"]["candidacies"], json!(96));
        assert_eq!(js["encoding"]["eligible"], json!(90));
        assert_eq!(js["encoding"]["ineligible"], json!(6));
        // "SOLTEIRO" is not a label of the marital status table.
        let issues = js["encoding"]["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["field"], json!("marital_status"));
        assert_eq!(js["thirdDigitRates"].as_array().unwrap().len(), 30);

        // 2010 has no expenditure rows, so no candidacy has every regressor.
        let skipped = js["skippedYears"].as_array().unwrap();
        assert!(skipped
            .iter()
            .any(|s| s["year"] == json!(2010) && s["reason"] == json!("no complete observation")));
        let fits = js["regressions"].as_array().unwrap();
        let mut years: Vec<i64> = fits
            .iter()
            .chain(skipped.iter())
            .map(|v| v["year"].as_i64().unwrap())
            .collect();
        years.sort_unstable();
        assert_eq!(years, vec![2010, 2014, 2018]);
        for fit in fits {
            let coefficients = fit["coefficients"].as_array().unwrap();
            // The intercept, 8 regressors and 9 third digit indicators.
            assert_eq!(coefficients.len(), 18);
            assert_eq!(coefficients[0]["name"], json!("const"));
            assert!(fit["nObs"].as_u64().unwrap() > 0);
        }

        assert_eq!(js["classifier"]["trainingRows"], json!(60));
        assert_eq!(js["classifier"]["testYear"], json!(2018));
        assert_eq!(js["classifier"]["predictions"].as_array().unwrap().len(), 30);
        let accuracy = js["evaluation"]["accuracy"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        let cm = &js["evaluation"]["confusionMatrix"];
        let total: u64 = ["trueNegatives", "falsePositives", "falseNegatives", "truePositives"]
            .iter()
            .map(|k| cm[*k].as_u64().unwrap())
            .sum();
        // Two candidacies of the test year have no result.
        assert_eq!(total, 28);

        // The written report is its own reference.
        let again = run_forecast(&fixture_config(), Some(tmp_out("again.json")), Some(out), None);
        assert!(again.is_ok());
    }

    #[test]
    fn reference_mismatch_is_an_error() {
        let reference = tmp_out("wrong_reference.json");
        fs::write(&reference, "{\"config\": {}}").unwrap();
        let res = run_forecast(
            &fixture_config(),
            Some(tmp_out("mismatch.json")),
            Some(reference),
            None,
        );
        assert!(matches!(res, Err(ForecastError::Whatever { .. })));
    }

    #[test]
    fn cutoff_override_is_validated() {
        let res = run_forecast(&fixture_config(), Some(tmp_out("cutoff.json")), None, Some(2018));
        assert!(matches!(res, Err(ForecastError::Whatever { .. })));
    }

    #[test]
    fn unknown_provider() {
        let settings = SourceSettings {
            provider: "parquet".to_string(),
            path: ".".to_string(),
            delimiter: None,
            encoding: None,
            streams: None,
        };
        assert!(matches!(
            FileStore::new(&settings, Path::new(".")),
            Err(ForecastError::UnknownProvider { .. })
        ));
    }
}
