/*!

This is the long-form manual for `candidacy_model` and `candforecast`.

## The records

A run reads five streams of records about state legislature candidacies. Each
record carries the key of a candidacy: election year (`ano`), state
(`sigla_uf`) and the sequence number given by the electoral court
(`sequencial_candidato`).

| stream           | default file / sheet | columns |
|------------------|----------------------|---------|
| `candidate_info` | `candidate_info.csv` | key, `situacao`, `numero`, `sigla_partido`, `cargo`, `ocupacao`, `idade`, `genero`, `instrucao`, `estado_civil`, `nacionalidade`, `sigla_uf_nascimento`, `raca` |
| `net_worth`      | `net_worth.csv`      | key, `valor_item` |
| `contributions`  | `contributions.csv`  | key, `valor_receita` |
| `expenditure`    | `expenditure.csv`    | key, `valor_despesa` |
| `results`        | `results.csv`        | key, `resultado` |

Column names are matched without regard to case. Blank cells and the markers
`#NULO#`, `#NE#` and `#NULO` are missing values. Amounts accept either a
decimal point (`1234.56`) or a decimal comma with dot thousands separators
(`1.234,56`). Financial rows without an amount are skipped.

The financial streams are itemized: all the items of a candidacy are summed.
The candidate and results streams must have at most one row per candidacy,
otherwise the run stops with a join integrity error.

Only candidacies with the status `DEFERIDO` or `DEFERIDO COM RECURSO` take part
in the models. The outcomes `ELEITO`, `ELEITO POR QP`, `ELEITO POR MÉDIA` and
`MÉDIA` count as elected; `NÃO ELEITO` and `SUPLENTE` as not elected. Any other
outcome, or a candidacy without a result, has an unknown outcome. Other
outcomes of eligible candidacies are also reported as encoding issues on the
field `outcome`.

All the columns listed above must be present, even when every cell is blank;
a missing column stops the run.

## Features

| feature              | meaning |
|----------------------|---------|
| `age`                | age at the election |
| `gender`             | 1 for female |
| `education`          | 0 (illiterate) to 7 (completed higher education) |
| `married`            | 1 for married or widowed |
| `national`           | 1 for native Brazilians |
| `is_local`           | 1 when born in the state of the candidacy |
| `non_majority_race`  | 1 for any race other than white |
| `net_worth`, `contributions`, `expenditure` | summed amounts |
| `third_digit_1` .. `third_digit_9` | the third digit of the ballot number, against 0 |
| `third_digit_is_one` | 1 when the third digit is 1 |

Categorical labels outside of a mapping table are reported as encoding issues
and left unknown.

## Models

For each configured year, a logistic regression of the outcome on `age`,
`gender`, `education`, `married`, `national`, `is_local`, `net_worth`,
`expenditure` and the third digit indicators is estimated by maximum
likelihood. The candidacies with any unknown regressor are left out. Years
that cannot be estimated (no observation, a single outcome, collinear
regressors, perfect separation, no convergence) are listed with the reason.

A gradient-boosted trees classifier is trained on all the years up to the
cutoff year and tested on the last configured year. Unknown feature values are
allowed: each split learns which side they go to. Training candidacies with an
unknown outcome are left out; test candidacies with an unknown outcome get a
prediction but are not evaluated.

## Configuration

```json
{
  "outputSettings": { "runName": "sp_2018", "outputDirectory": "out" },
  "source": {
    "provider": "csv",
    "path": "data",
    "delimiter": ";",
    "encoding": "latin1",
    "streams": { "net_worth": "bens.csv" }
  },
  "model": {
    "years": [2006, 2010, 2014, 2018],
    "cutoffYear": 2014,
    "regression": { "maxIterations": 35, "tolerance": 1e-8, "pivotTolerance": 1e-10 },
    "boosting": {
      "nEstimators": 100, "learningRate": 0.1, "maxDepth": 3,
      "minChildWeight": 1.0, "lambda": 1.0, "gamma": 0.0, "decisionThreshold": 0.5
    }
  },
  "mappings": {
    "gender": [{ "label": "MASCULINO", "code": 0 }, { "label": "FEMININO", "code": 1 }]
  }
}
```

`source`:
 - `provider`: `csv` (a directory of files) or `xlsx` (one workbook, one
   worksheet per stream).
 - `path`: relative to the directory of the configuration file.
 - `delimiter` (CSV only, default `,`) and `encoding` (`utf8` or `latin1`,
   default `utf8`).
 - `streams`: file or worksheet name of each stream.

`model` and all its fields are optional. The defaults are the years 2006, 2010,
2014, 2018 and 2022 with the cutoff 2018. The test year is always the last year, and
it must come after the cutoff year.

`mappings` replaces some of the label tables: `maritalStatus`, `gender`,
`educationLevel`, `nationality`, `race`.

## Running

```text
candforecast --config config.json [--out report.json | --out stdout]
             [--reference expected.json] [--cutoff-year 2010] [--verbose]
```

Without `--out`, the report goes to `<outputDirectory>/<runName>_report.json`,
or to the standard output when no output directory is configured. With
`--reference`, the run fails if the report differs from the reference, and
the differences are printed.

## The report

The JSON report has the sections:
 - `config`: run name, years, cutoff and test year
 - `integration`: number of candidacies, and how many are outside the years
 - `encoding`: eligible and ineligible counts, encoding issues
 - `thirdDigitRates`: election rate per year and third digit
 - `regressions` and `skippedYears`: the per-year fits (coefficient, standard
   error, z statistic, p-value, pseudo R²)
 - `classifier`: feature importance (total split gain) and the test predictions
 - `evaluation`: confusion matrix, accuracy, precision, recall, F1, ROC curve
   and AUC. It is `null` when no test candidacy has a known outcome.

 */
