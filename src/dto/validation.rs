//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest referral code accepted from clients.
pub const MAX_REFERRAL_CODE_LEN: usize = 32;

/// Validates that a referral code is 2 to 32 ASCII letters or digits.
///
/// # Examples
///
/// ```ignore
/// validate_referral_code("JaneD")   // Ok
/// validate_referral_code("Jane D")  // Err - space
/// validate_referral_code("J")       // Err - too short
/// ```
pub fn validate_referral_code(code: &str) -> Result<(), ValidationError> {
    if code.len() < 2 || code.len() > MAX_REFERRAL_CODE_LEN {
        let mut err = ValidationError::new("referral_code_length");
        err.message = Some(
            format!(
                "Referral code must be 2 to {MAX_REFERRAL_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("referral_code_format");
        err.message = Some("Referral code must contain only ASCII letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_referral_code_valid() {
        assert!(validate_referral_code("JaneD").is_ok());
        assert!(validate_referral_code("CherX").is_ok());
        assert!(validate_referral_code("JD2024").is_ok());
    }

    #[test]
    fn test_validate_referral_code_invalid_length() {
        assert!(validate_referral_code("J").is_err());
        assert!(validate_referral_code("").is_err());
        assert!(validate_referral_code(&"A".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_referral_code_invalid_format() {
        assert!(validate_referral_code("Jane D").is_err()); // space
        assert!(validate_referral_code("Jane-D").is_err()); // dash
        assert!(validate_referral_code("JanéD").is_err()); // non-ascii
    }
}
