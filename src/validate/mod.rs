//! Coarse pre-filter for symptom descriptions.
//!
//! This only weeds out obvious non-input (greetings, test tokens, keyboard
//! mashing). Whether the text really describes symptoms is decided later by
//! the model, see `extract`.

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use thiserror::Error;

pub const MIN_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Please provide a more detailed description of your symptoms (at least 10 characters)")]
    TooShort,
    #[error("Please describe your actual medical symptoms. For example: 'headache and fever for 2 days' or 'chest pain when breathing'")]
    NonMedicalPattern,
}

/// `Ok` carries the trimmed text that was accepted.
pub type ValidationOutcome<'a> = Result<&'a str, Rejection>;

static NON_MEDICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(hi|hello|hey|hii|hiii|yo|sup|what's up|whatsup)$",
        r"(?i)^(test|testing|123|abc|xyz|qwerty)$",
        // no letters at all, in any script
        r"^\P{L}*$",
        // one character repeated, "aaaaa"
        r"^(.)\1{4,}$",
    ]
    .iter()
    .filter_map(|p| match Regex::new(p) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern = %p, error = %e, "failed to compile validation pattern");
            None
        }
    })
    .collect()
});

pub fn validate(text: &str) -> ValidationOutcome<'_> {
    let text = text.trim();

    if text.chars().count() < MIN_LENGTH {
        return Err(Rejection::TooShort);
    }

    if is_non_medical(text) {
        return Err(Rejection::NonMedicalPattern);
    }

    Ok(text)
}

/// True when the trimmed text matches one of the known filler patterns.
/// Independent of the length check, which `validate` applies first.
pub fn is_non_medical(text: &str) -> bool {
    let text = text.trim();
    NON_MEDICAL_PATTERNS
        .iter()
        .any(|re| re.is_match(text).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_is_too_short() {
        for text in ["", "   ", "hi", "headache", "  fever  ", "123456789"] {
            assert_eq!(validate(text), Err(Rejection::TooShort), "{:?}", text);
        }
    }

    #[test]
    fn test_filler_patterns() {
        for text in ["hi", "HELLO", "what's up", "test", "Testing", "123", "qwerty", "xyz", "aaaaa", "!!!!"] {
            assert!(is_non_medical(text), "{:?}", text);
        }
        assert!(!is_non_medical("headache"));
        assert!(!is_non_medical("hello doctor"));
    }

    #[test]
    fn test_long_non_medical_input() {
        assert_eq!(validate("aaaaaaaaaaaa"), Err(Rejection::NonMedicalPattern));
        assert_eq!(validate("1234567890 !!"), Err(Rejection::NonMedicalPattern));
        assert_eq!(validate("   ??????????   "), Err(Rejection::NonMedicalPattern));
    }

    #[test]
    fn test_accepts_and_trims() {
        let text = "  persistent headache for 3 days with nausea  ";
        assert_eq!(validate(text), Ok("persistent headache for 3 days with nausea"));
    }

    #[test]
    fn test_non_latin_letters_are_letters() {
        assert_eq!(validate("सिरदर्द और बुखार दो दिन से"), Ok("सिरदर्द और बुखार दो दिन से"));
    }

    #[test]
    fn test_repeated_char_must_fill_the_input() {
        assert!(!is_non_medical("aaaaab"));
        assert_eq!(validate("aaaaaaa pain in my knee"), Ok("aaaaaaa pain in my knee"));
    }
}
