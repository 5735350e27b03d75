//! Turns the model's free-text reply into a `StructuredAnalysis`.
//!
//! The reply is untrusted. Extraction never fails: anything that cannot be
//! used becomes the fallback record, and the reason is kept so it can be
//! logged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::models::StructuredAnalysis;
use crate::template::INVALID_INPUT;

pub const DEFAULT_REJECTION_MESSAGE: &str = "Please describe your actual medical symptoms";

// first `{` through last `}`
static OBJECT_SPAN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").ok());

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The model emitted `{"error": "invalid_input", ...}`.
    Rejected { message: String },
    Parsed(StructuredAnalysis),
    Fallback {
        analysis: StructuredAnalysis,
        reason: FallbackReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    NoJsonObject,
    InvalidJson(String),
    ShapeMismatch(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoJsonObject => write!(f, "no JSON object in reply"),
            Self::InvalidJson(e) => write!(f, "invalid JSON: {}", e),
            Self::ShapeMismatch(e) => write!(f, "unexpected shape: {}", e),
        }
    }
}

#[derive(Deserialize)]
struct ModelRejection {
    error: String,
    // any JSON type; only a non-blank string is used
    #[serde(default)]
    message: Option<Value>,
}

pub fn extract(raw: &str) -> Extraction {
    let Some(span) = object_span(raw) else {
        return fallback(FallbackReason::NoJsonObject);
    };

    let value: Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => return fallback(FallbackReason::InvalidJson(e.to_string())),
    };

    if let Some(message) = rejection_message(&value) {
        return Extraction::Rejected { message };
    }

    match serde_json::from_value::<StructuredAnalysis>(value) {
        Ok(analysis) => Extraction::Parsed(analysis),
        Err(e) => fallback(FallbackReason::ShapeMismatch(e.to_string())),
    }
}

fn object_span(raw: &str) -> Option<&str> {
    OBJECT_SPAN
        .as_ref()
        .and_then(|re| re.find(raw))
        .map(|m| m.as_str())
}

fn rejection_message(value: &Value) -> Option<String> {
    let rejection = ModelRejection::deserialize(value).ok()?;
    if rejection.error != INVALID_INPUT {
        return None;
    }
    Some(
        rejection
            .message
            .as_ref()
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string()),
    )
}

fn fallback(reason: FallbackReason) -> Extraction {
    Extraction::Fallback {
        analysis: StructuredAnalysis::fallback(),
        reason,
    }
}
