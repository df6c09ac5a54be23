use crate::error::{Error, Result};

/// Canonical form of a plate number: trimmed, upper-case, without spaces,
/// dashes or dots. Anything else that is not alphanumeric is rejected.
pub fn normalize_plate(raw: &str) -> Result<String> {
    let plate: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.'))
        .flat_map(char::to_uppercase)
        .collect();

    if plate.is_empty() {
        return Err(Error::ConstraintViolation(format!(
            "Plate number {:?} is empty",
            raw
        )));
    }

    if let Some(bad) = plate.chars().find(|c| !c.is_alphanumeric()) {
        return Err(Error::ConstraintViolation(format!(
            "Plate number {:?} contains invalid character {:?}",
            raw, bad
        )));
    }

    Ok(plate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate(" ap 31-bq.1234 ").unwrap(), "AP31BQ1234");
        assert_eq!(normalize_plate("abc123").unwrap(), "ABC123");
    }

    #[test]
    fn test_malformed_plates() {
        assert!(matches!(
            normalize_plate("  - "),
            Err(Error::ConstraintViolation(_))
        ));
        assert!(matches!(
            normalize_plate("AB/123"),
            Err(Error::ConstraintViolation(_))
        ));
    }
}
