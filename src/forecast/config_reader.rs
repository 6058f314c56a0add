use crate::forecast::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "runName")]
    pub run_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// `csv` or `xlsx`
    pub provider: String,
    /// The directory holding the CSV files, or the Excel workbook. Relative
    /// paths start from the directory of the configuration file.
    pub path: String,
    pub delimiter: Option<String>,
    /// `utf8` (default) or `latin1`
    pub encoding: Option<String>,
    /// File name (CSV) or worksheet name (Excel) of each stream.
    pub streams: Option<BTreeMap<String, String>>,
}

impl SourceSettings {
    /// Where a stream is read from. Defaults to `<stream>.csv` or to a
    /// worksheet named after the stream.
    pub fn stream_location(&self, stream: StreamName) -> String {
        let configured = self
            .streams
            .as_ref()
            .and_then(|m| m.get(stream.as_str()))
            .cloned();
        match configured {
            Some(x) => x,
            None if self.provider == "csv" => format!("{}.csv", stream.as_str()),
            None => stream.as_str().to_string(),
        }
    }

    pub fn delimiter_byte(&self) -> ForecastResult<u8> {
        match self.delimiter.as_deref() {
            None => Ok(b','),
            Some(d) if d.len() == 1 => Ok(d.as_bytes()[0]),
            Some(d) => whatever!("the delimiter must be a single ASCII character, got {:?}", d),
        }
    }

    pub fn text_encoding(&self) -> ForecastResult<TextEncoding> {
        match self.encoding.as_deref() {
            None | Some("utf8") | Some("utf-8") => Ok(TextEncoding::Utf8),
            Some("latin1") | Some("iso-8859-1") => Ok(TextEncoding::Latin1),
            Some(x) => whatever!("unknown text encoding: {}", x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RegressionSettings {
    #[serde(rename = "maxIterations")]
    pub max_iterations: Option<u32>,
    pub tolerance: Option<f64>,
    #[serde(rename = "pivotTolerance")]
    pub pivot_tolerance: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BoostingSettings {
    #[serde(rename = "nEstimators")]
    pub n_estimators: Option<u32>,
    #[serde(rename = "learningRate")]
    pub learning_rate: Option<f64>,
    #[serde(rename = "maxDepth")]
    pub max_depth: Option<u32>,
    #[serde(rename = "minChildWeight")]
    pub min_child_weight: Option<f64>,
    pub lambda: Option<f64>,
    pub gamma: Option<f64>,
    #[serde(rename = "decisionThreshold")]
    pub decision_threshold: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub years: Option<Vec<i32>>,
    #[serde(rename = "cutoffYear")]
    pub cutoff_year: Option<i32>,
    pub regression: Option<RegressionSettings>,
    pub boosting: Option<BoostingSettings>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub label: String,
    pub code: u8,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MappingSettings {
    #[serde(rename = "maritalStatus")]
    pub marital_status: Option<Vec<MappingEntry>>,
    pub gender: Option<Vec<MappingEntry>>,
    #[serde(rename = "educationLevel")]
    pub education_level: Option<Vec<MappingEntry>>,
    pub nationality: Option<Vec<MappingEntry>>,
    pub race: Option<Vec<MappingEntry>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub source: SourceSettings,
    pub model: Option<ModelSettings>,
    pub mappings: Option<MappingSettings>,
}

pub fn read_config(path: &str) -> ForecastResult<ForecastConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: ForecastConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> ForecastResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

fn mapping(entries: &Option<Vec<MappingEntry>>, default: &CategoryMap) -> ForecastResult<CategoryMap> {
    match entries {
        None => Ok(default.clone()),
        Some(v) if v.is_empty() => whatever!("a mapping table may not be empty"),
        Some(v) => Ok(CategoryMap::from_entries(
            v.iter().map(|e| (e.label.clone(), e.code)).collect(),
        )),
    }
}

/// Turns the configuration file into the settings of the models, applying
/// the command line override of the cutoff year.
pub fn validate_model(
    config: &ForecastConfig,
    cutoff_override: Option<i32>,
) -> ForecastResult<ModelConfig> {
    let mut res = ModelConfig::default();
    if let Some(m) = &config.model {
        if let Some(years) = &m.years {
            res.years = years.clone();
        }
        if let Some(c) = m.cutoff_year {
            res.cutoff_year = c;
        }
        if let Some(r) = &m.regression {
            let p = &mut res.regression;
            p.max_iterations = r.max_iterations.unwrap_or(p.max_iterations);
            p.tolerance = r.tolerance.unwrap_or(p.tolerance);
            p.pivot_tolerance = r.pivot_tolerance.unwrap_or(p.pivot_tolerance);
        }
        if let Some(b) = &m.boosting {
            let p = &mut res.boosting;
            p.n_estimators = b.n_estimators.unwrap_or(p.n_estimators);
            p.learning_rate = b.learning_rate.unwrap_or(p.learning_rate);
            p.max_depth = b.max_depth.unwrap_or(p.max_depth);
            p.min_child_weight = b.min_child_weight.unwrap_or(p.min_child_weight);
            p.lambda = b.lambda.unwrap_or(p.lambda);
            p.gamma = b.gamma.unwrap_or(p.gamma);
            p.decision_threshold = b.decision_threshold.unwrap_or(p.decision_threshold);
        }
    }
    if let Some(c) = cutoff_override {
        info!("Cutoff year overridden: {}", c);
        res.cutoff_year = c;
    }
    if let Some(m) = &config.mappings {
        let defaults = EncodingTables::default();
        res.encoding = EncodingTables {
            marital_status: mapping(&m.marital_status, &defaults.marital_status)?,
            gender: mapping(&m.gender, &defaults.gender)?,
            education_level: mapping(&m.education_level, &defaults.education_level)?,
            nationality: mapping(&m.nationality, &defaults.nationality)?,
            race: mapping(&m.race, &defaults.race)?,
        };
    }
    if let Err(e) = res.validate() {
        whatever!("{}", e)
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "outputSettings": { "runName": "test" },
        "source": {
            "provider": "csv",
            "path": ".",
            "delimiter": ";",
            "encoding": "latin1",
            "streams": { "net_worth": "bens.csv" }
        },
        "model": {
            "years": [2010, 2014],
            "cutoffYear": 2010,
            "boosting": { "nEstimators": 20, "learningRate": 0.3 }
        },
        "mappings": {
            "gender": [{ "label": "M", "code": 0 }, { "label": "F", "code": 1 }]
        }
    }"#;

    #[test]
    fn parse_and_validate() {
        let config: ForecastConfig = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(config.source.delimiter_byte().unwrap(), b';');
        assert_eq!(config.source.text_encoding().unwrap(), TextEncoding::Latin1);
        assert_eq!(config.source.stream_location(StreamName::NetWorth), "bens.csv");
        assert_eq!(
            config.source.stream_location(StreamName::Results),
            "results.csv"
        );

        let model = validate_model(&config, None).unwrap();
        assert_eq!(model.years, vec![2010, 2014]);
        assert_eq!(model.cutoff_year, 2010);
        assert_eq!(model.boosting.n_estimators, 20);
        assert_eq!(model.boosting.max_depth, BoostingParams::DEFAULT.max_depth);
        assert_eq!(model.regression, RegressionParams::DEFAULT);
        assert_eq!(
            model.encoding.gender.lookup(Some("f")),
            candidacy_model::encode::Lookup::Code(1)
        );
        assert_eq!(
            model.encoding.race,
            EncodingTables::default().race
        );
    }

    #[test]
    fn cutoff_must_precede_the_test_year() {
        let config: ForecastConfig = serde_json::from_str(CONFIG).unwrap();
        assert!(validate_model(&config, Some(2014)).is_err());
        assert_eq!(validate_model(&config, Some(2010)).unwrap().cutoff_year, 2010);
    }

    #[test]
    fn cutoff_needs_a_training_year() {
        let config: ForecastConfig = serde_json::from_str(CONFIG).unwrap();
        match validate_model(&config, Some(2006)) {
            Err(e) => assert!(e.to_string().contains("no election year up to the cutoff 2006")),
            Ok(m) => panic!("unexpected {:?}", m),
        }
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ForecastConfig = serde_json::from_str(
            r#"{"outputSettings": {"runName": "x"}, "source": {"provider": "xlsx", "path": "data.xlsx"}}"#,
        )
        .unwrap();
        assert_eq!(validate_model(&config, None).unwrap(), ModelConfig::default());
        assert_eq!(config.source.stream_location(StreamName::CandidateInfo), "candidate_info");
        assert_eq!(config.source.delimiter_byte().unwrap(), b',');
    }
}
