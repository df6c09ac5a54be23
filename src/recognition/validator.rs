use super::Recognition;
use crate::config::RecognitionConfig;
use crate::error::{Error, Result};
use crate::ledger::normalize_plate;
use regex::Regex;

/// Decides whether recognized text is worth showing to the operator
pub trait PlateValidator: Send + Sync {
    fn is_valid(&self, recognition: &Recognition) -> bool;
}

impl<F> PlateValidator for F
where
    F: Fn(&Recognition) -> bool + Send + Sync,
{
    fn is_valid(&self, recognition: &Recognition) -> bool {
        self(recognition)
    }
}

/// Accepts any text with at least one visible character
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyText;

impl PlateValidator for NonEmptyText {
    fn is_valid(&self, recognition: &Recognition) -> bool {
        !recognition.text.trim().is_empty()
    }
}

/// Configurable acceptance rule: the normalized plate must match a pattern and
/// the recognizer confidence, when reported, must reach a floor.
#[derive(Debug, Clone, Default)]
pub struct PlatePattern {
    pattern: Option<Regex>,
    min_confidence: Option<f32>,
}

impl PlatePattern {
    pub fn new(pattern: Option<&str>, min_confidence: Option<f32>) -> Result<Self> {
        let pattern = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid plate pattern: {}", e)))?;

        Ok(Self {
            pattern,
            min_confidence,
        })
    }

    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        Self::new(config.plate_pattern.as_deref(), config.min_confidence)
    }
}

impl PlateValidator for PlatePattern {
    fn is_valid(&self, recognition: &Recognition) -> bool {
        let plate = match normalize_plate(&recognition.text) {
            Ok(plate) => plate,
            Err(_) => return false,
        };

        if let (Some(floor), Some(confidence)) = (self.min_confidence, recognition.confidence) {
            if confidence < floor {
                return false;
            }
        }

        self.pattern
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(&plate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text() {
        assert!(NonEmptyText.is_valid(&Recognition::new("AB12")));
        assert!(!NonEmptyText.is_valid(&Recognition::new("  ")));
    }

    #[test]
    fn test_pattern_matches_normalized_text() {
        let validator = PlatePattern::new(Some(r"^[A-Z]{2}\d{2}[A-Z]{1,2}\d{4}$"), None).unwrap();
        assert!(validator.is_valid(&Recognition::new("ap 31 bq 1234")));
        assert!(!validator.is_valid(&Recognition::new("HELLO")));
        assert!(!validator.is_valid(&Recognition::new("AP31/BQ1234")));
    }

    #[test]
    fn test_confidence_floor() {
        let validator = PlatePattern::new(None, Some(0.6)).unwrap();
        assert!(validator.is_valid(&Recognition::with_confidence("AB12", 0.9)));
        assert!(!validator.is_valid(&Recognition::with_confidence("AB12", 0.3)));
        // No confidence reported, nothing to compare
        assert!(validator.is_valid(&Recognition::new("AB12")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(matches!(
            PlatePattern::new(Some("[A-"), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_recognition_config() -> anyhow::Result<()> {
        let config: RecognitionConfig = toml::from_str(
            r#"
            plate_pattern = '^[A-Z]{3}\d{3}$'
            min_confidence = 0.75
            "#,
        )?;
        let validator = PlatePattern::from_config(&config)?;
        assert!(validator.is_valid(&Recognition::with_confidence("abc 123", 0.8)));
        assert!(!validator.is_valid(&Recognition::with_confidence("ABC123", 0.5)));
        assert!(!validator.is_valid(&Recognition::new("AB1234")));

        // Defaults accept any non-empty text
        let open = PlatePattern::from_config(&RecognitionConfig::default())?;
        assert!(open.is_valid(&Recognition::with_confidence("Z9", 0.01)));
        assert!(!open.is_valid(&Recognition::new(" - ")));

        let broken: RecognitionConfig = toml::from_str("plate_pattern = '(AB'")?;
        assert!(matches!(
            PlatePattern::from_config(&broken),
            Err(Error::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_closure_validator() {
        let only_long = |r: &Recognition| r.text.len() >= 6;
        assert!(only_long.is_valid(&Recognition::new("ABC123")));
        assert!(!only_long.is_valid(&Recognition::new("AB1")));
    }
}
