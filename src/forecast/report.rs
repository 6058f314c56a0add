// JSON rendering of a pipeline run.

use crate::forecast::*;

use candidacy_model::regression::YearFit;

fn config_js(settings: &OutputSettings, config: &ModelConfig) -> JSValue {
    json!({
        "runName": settings.run_name,
        "years": config.years,
        "cutoffYear": config.cutoff_year,
        "testYear": config.test_year(),
    })
}

fn fit_js(fit: &YearFit) -> JSValue {
    let coefficients: Vec<JSValue> = fit
        .coefficients
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "estimate": c.estimate,
                "stdError": c.std_error,
                "z": c.z_value,
                "pValue": c.p_value,
            })
        })
        .collect();
    json!({
        "year": fit.year,
        "nObs": fit.n_obs,
        "pseudoR2": fit.pseudo_r2,
        "logLikelihood": fit.log_likelihood,
        "nullLogLikelihood": fit.null_log_likelihood,
        "iterations": fit.iterations,
        "coefficients": coefficients,
    })
}

fn evaluation_js(ev: &Evaluation) -> JSValue {
    let cm = &ev.confusion;
    let roc: Vec<JSValue> = ev
        .roc_curve
        .iter()
        .map(|p| json!({"threshold": p.threshold, "fpr": p.false_positive_rate, "tpr": p.true_positive_rate}))
        .collect();
    json!({
        "confusionMatrix": {
            "trueNegatives": cm.true_negatives,
            "falsePositives": cm.false_positives,
            "falseNegatives": cm.false_negatives,
            "truePositives": cm.true_positives,
        },
        "accuracy": ev.accuracy,
        "precision": ev.precision,
        "recall": ev.recall,
        "f1": ev.f1,
        "auc": ev.auc,
        "roc": roc,
    })
}

pub fn build_report_js(
    settings: &OutputSettings,
    config: &ModelConfig,
    report: &PipelineReport,
) -> JSValue {
    let encoded = &report.encoded;
    let issues: Vec<JSValue> = encoded
        .issues
        .iter()
        .map(|i| json!({"key": i.key.to_string(), "field": i.field, "value": i.value}))
        .collect();

    let digit_rates: Vec<JSValue> = report
        .digit_rates
        .iter()
        .map(|d| {
            json!({
                "year": d.year,
                "digit": d.digit,
                "candidates": d.candidates,
                "elected": d.elected,
                "rate": d.rate(),
            })
        })
        .collect();

    let regressions: Vec<JSValue> = report.regressions.fits.iter().map(fit_js).collect();
    let skipped: Vec<JSValue> = report
        .regressions
        .skipped
        .iter()
        .map(|s| json!({"year": s.year, "reason": s.reason.to_string()}))
        .collect();

    let training = &report.training;
    let importance: Vec<JSValue> = training
        .classifier
        .feature_importance()
        .iter()
        .map(|(name, gain)| json!({"feature": name, "gain": gain}))
        .collect();
    let predictions: Vec<JSValue> = training
        .predictions
        .iter()
        .map(|p| {
            json!({
                "key": p.key.to_string(),
                "actual": p.actual,
                "predicted": p.predicted,
                "probability": p.probability,
            })
        })
        .collect();

    json!({
        "config": config_js(settings, config),
        "integration": {
            "candidacies": report.integrated_rows,
            "outsideYears": report.other_years,
        },
        "encoding": {
            "eligible": encoded.rows.len(),
            "ineligible": encoded.ineligible,
            "issues": issues,
        },
        "thirdDigitRates": digit_rates,
        "regressions": regressions,
        "skippedYears": skipped,
        "classifier": {
            "trainingRows": training.n_train,
            "unlabelledTrainingRows": training.unlabelled_train,
            "testYear": training.test_year,
            "trees": training.classifier.model().trees.len(),
            "featureImportance": importance,
            "predictions": predictions,
        },
        "evaluation": report.evaluation.as_ref().map(evaluation_js),
    })
}
