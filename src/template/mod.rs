pub struct Template {
    template: &'static str,
}

impl Template {
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Replaces every `{{ .Key }}` placeholder, in the order given.
    /// Unknown keys are left as-is.
    pub fn execute(&self, data: &[(&str, &str)]) -> String {
        let mut result = self.template.to_string();

        for (key, value) in data {
            let placeholder = format!("{{{{ .{} }}}}", key);
            result = result.replace(&placeholder, value);
        }

        result
    }
}

pub const INVALID_INPUT: &str = "invalid_input";

pub static SYMPTOM_ANALYSIS: Template = Template::new(SYMPTOM_ANALYSIS_TEMPLATE);

/// Renders the analysis prompt for already validated symptom text.
pub fn build(symptoms: &str) -> String {
    // user text goes in last so it is never rescanned for placeholders
    SYMPTOM_ANALYSIS.execute(&[("InvalidInput", INVALID_INPUT), ("Symptoms", symptoms)])
}

const SYMPTOM_ANALYSIS_TEMPLATE: &str = r#"You are an AI medical assistant. IMPORTANT: First determine if the input describes actual medical symptoms or health concerns.

Input: {{ .Symptoms }}

VALIDATION STEP: Carefully analyze if this input is:
1. A real medical symptom description with context (duration, severity, location, etc.)
2. A test input, single word, or vague statement without medical context
3. Someone trying to test the system with disease names or simple words

If the input is NOT a genuine medical symptom description (like single words "cold", "fever", test phrases, or lacks proper medical context), respond with:
{
  "error": "{{ .InvalidInput }}",
  "message": "Please describe your actual medical symptoms with proper context"
}

EXAMPLES OF INVALID INPUTS:
- Single words: "cold", "fever", "headache", "pain"
- Test phrases: "test cold", "testing fever", "check headache"
- Disease names without symptoms: "covid", "flu", "diabetes"
- Vague statements: "I feel bad", "something wrong", "not well"

EXAMPLES OF VALID INPUTS:
- "I've had a persistent headache for 3 days, mainly on the left side, with nausea"
- "Chest pain when breathing deeply, started yesterday after exercise"
- "Fever of 101°F for 2 days with body aches and sore throat"

If the input DOES describe genuine medical symptoms with proper context, analyze them and provide a structured response in JSON format:

{
  "conditions": [
    {
      "name": "Condition Name",
      "description": "Brief description of the condition",
      "likelihood": 75,
      "severity": "medium"
    }
  ],
  "recommendedSpecialist": "Type of doctor to visit (e.g., 'Cardiologist', 'General Practitioner')",
  "insights": [
    {
      "category": "red_flags",
      "title": "Warning Signs",
      "content": "Any urgent symptoms that need immediate attention"
    },
    {
      "category": "lifestyle",
      "title": "Lifestyle Recommendations",
      "content": "Things to do while waiting for medical consultation"
    },
    {
      "category": "prevention",
      "title": "Prevention Tips",
      "content": "How to prevent similar issues in the future"
    }
  ],
  "confidenceScores": [
    {
      "condition": "Condition Name",
      "confidence": 75,
      "reasoning": "Why this confidence level"
    }
  ]
}

Important guidelines:
- ONLY analyze if input describes actual medical symptoms with proper context
- Reject single words or vague statements without medical details
- Provide 2-4 most likely conditions
- Likelihood should be 0-100
- Severity can be "low", "medium", or "high"
- Always recommend seeing a healthcare professional
- Include red flags for urgent symptoms
- Be conservative with diagnoses
- Focus on common conditions first
- Provide practical lifestyle advice"#;
