//! # Validation Utilities
//!
//! Request-shape validators shared by the service surface and the resolution pipeline.

/// Validate that a string is not empty.
pub fn validate_not_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate a token address against `^0x[0-9a-fA-F]{40}$`.
///
/// Case is accepted either way; callers normalize to lowercase separately via
/// [`normalize_token`].
pub fn validate_token_address(token: &str) -> Result<(), String> {
    let body = token
        .strip_prefix("0x")
        .ok_or_else(|| format!("Invalid token address: {token}"))?;

    if body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(format!("Invalid token address: {token}"))
    }
}

/// Lowercase a token address. Mixed-case keys would fragment the cache and
/// silently miss, so every entry point normalizes through this function.
pub fn normalize_token(token: &str) -> String {
    token.to_ascii_lowercase()
}

/// Validate a start/end date pair: `start` must not be after `end`.
pub fn validate_date_range(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> Result<(), String> {
    if start > end {
        Err(format!("startDate ({start}) must not be after endDate ({end})"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_address() {
        assert!(validate_token_address("0xabc").is_err());
    }

    #[test]
    fn accepts_and_normalizes_mixed_case() {
        let addr = "0xAAAAbbbbCCCCddddEEEEffff0000111122223333";
        assert!(validate_token_address(addr).is_ok());
        assert_eq!(
            normalize_token(addr),
            "0xaaaabbbbccccddddeeeeffff0000111122223333"
        );
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(validate_token_address("AAAAbbbbCCCCddddEEEEffff0000111122223333zz").is_err());
    }
}
