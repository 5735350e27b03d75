use crate::api::InferenceEngine;
use crate::error::{Error, Result};
use crate::extract::{self, Extraction};
use crate::models::StructuredAnalysis;
use crate::{template, validate};

/// Runs the structured-extraction pipeline for one request.
///
/// Validation failures return before the engine is contacted. A reply the
/// model did not format properly still yields the fallback record.
pub async fn analyze(engine: &dyn InferenceEngine, symptoms: Option<&str>) -> Result<StructuredAnalysis> {
    let symptoms = symptoms
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingSymptoms)?;

    let text = validate::validate(symptoms).map_err(|rejection| {
        tracing::debug!(reason = ?rejection, "symptoms rejected by validator");
        rejection
    })?;

    let prompt = template::build(text);
    let reply = engine.complete_sync(&prompt).await?;

    match extract::extract(&reply) {
        Extraction::Rejected { message } => {
            tracing::info!("model flagged input as non-medical");
            Err(Error::RejectedByModel(message))
        }
        Extraction::Parsed(analysis) => {
            let issues = analysis.out_of_domain();
            if !issues.is_empty() {
                tracing::warn!(?issues, "model output outside documented ranges, passing through");
            }
            Ok(analysis)
        }
        Extraction::Fallback { analysis, reason } => {
            tracing::warn!(%reason, "using fallback analysis");
            Ok(analysis)
        }
    }
}
