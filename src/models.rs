use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Body of `POST /api/analyze-symptoms`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAnalysis {
    pub conditions: Vec<Condition>,
    pub recommended_specialist: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub confidence_scores: Vec<ConfidenceScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Kept as the model wrote it, integer or not.
    pub likelihood: Number,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub category: InsightCategory,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub condition: String,
    pub confidence: Number,
    #[serde(default)]
    pub reasoning: String,
}

/// Unknown strings from the model are kept in `Other` so they reach the
/// client unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
    Other(String),
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        match s.as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Other(s),
        }
    }
}

impl From<Severity> for String {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Low => "low".to_string(),
            Severity::Medium => "medium".to_string(),
            Severity::High => "high".to_string(),
            Severity::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InsightCategory {
    RedFlags,
    Lifestyle,
    Prevention,
    General,
    Other(String),
}

impl From<String> for InsightCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "red_flags" => Self::RedFlags,
            "lifestyle" => Self::Lifestyle,
            "prevention" => Self::Prevention,
            "general" => Self::General,
            _ => Self::Other(s),
        }
    }
}

impl From<InsightCategory> for String {
    fn from(c: InsightCategory) -> Self {
        match c {
            InsightCategory::RedFlags => "red_flags".to_string(),
            InsightCategory::Lifestyle => "lifestyle".to_string(),
            InsightCategory::Prevention => "prevention".to_string(),
            InsightCategory::General => "general".to_string(),
            InsightCategory::Other(s) => s,
        }
    }
}

impl StructuredAnalysis {
    /// Safe record returned whenever the model reply cannot be used.
    pub fn fallback() -> Self {
        const NAME: &str = "Multiple Possible Conditions";

        Self {
            conditions: vec![Condition {
                name: NAME.to_string(),
                description: "Based on your symptoms, several conditions could be possible. A healthcare professional can provide proper diagnosis.".to_string(),
                likelihood: Number::from(50),
                severity: Severity::Medium,
            }],
            recommended_specialist: "General Practitioner".to_string(),
            insights: vec![
                Insight {
                    category: InsightCategory::RedFlags,
                    title: "When to Seek Immediate Care".to_string(),
                    content: "If symptoms worsen, become severe, or you experience difficulty breathing, chest pain, or severe headache, seek immediate medical attention.".to_string(),
                },
                Insight {
                    category: InsightCategory::Lifestyle,
                    title: "General Care".to_string(),
                    content: "Rest, stay hydrated, monitor your symptoms, and avoid strenuous activities until you can see a healthcare provider.".to_string(),
                },
                Insight {
                    category: InsightCategory::Prevention,
                    title: "Health Maintenance".to_string(),
                    content: "Maintain a healthy lifestyle with regular exercise, balanced diet, adequate sleep, and regular health check-ups.".to_string(),
                },
                Insight {
                    category: InsightCategory::General,
                    title: "See a Professional".to_string(),
                    content: "This overview is not a diagnosis. Please consult a healthcare professional about your symptoms.".to_string(),
                },
            ],
            confidence_scores: vec![ConfidenceScore {
                condition: NAME.to_string(),
                confidence: Number::from(50),
                reasoning: "Symptoms require professional medical evaluation for accurate diagnosis.".to_string(),
            }],
        }
    }

    /// Fields whose values fall outside the documented domain. Nothing is
    /// corrected here; callers decide what to do with the list.
    pub fn out_of_domain(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for (i, c) in self.conditions.iter().enumerate() {
            if !is_percentage(&c.likelihood) {
                issues.push(format!("conditions[{}].likelihood={}", i, c.likelihood));
            }
            if let Severity::Other(s) = &c.severity {
                issues.push(format!("conditions[{}].severity={:?}", i, s));
            }
        }

        for (i, insight) in self.insights.iter().enumerate() {
            if let InsightCategory::Other(s) = &insight.category {
                issues.push(format!("insights[{}].category={:?}", i, s));
            }
        }

        for (i, score) in self.confidence_scores.iter().enumerate() {
            if !is_percentage(&score.confidence) {
                issues.push(format!("confidenceScores[{}].confidence={}", i, score.confidence));
            }
        }

        if self.recommended_specialist.trim().is_empty() {
            issues.push("recommendedSpecialist is empty".to_string());
        }

        issues
    }
}

fn is_percentage(n: &Number) -> bool {
    n.as_f64().is_some_and(|v| (0.0..=100.0).contains(&v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/chat`. Only the last message is sent to the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn prompt(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}
