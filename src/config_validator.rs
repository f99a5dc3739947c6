use crate::config::Config;
use crate::error::ThrottlerError;

/// Validates configuration before the server starts
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the whole service configuration
    pub fn validate(config: &Config) -> Result<(), ThrottlerError> {
        Self::validate_store_url(&config.store_url())?;
        Self::validate_limit("IP_RATE_LIMIT", config.ip_rate_limit)?;
        Self::validate_limit("TOKEN_RATE_LIMIT", config.token_rate_limit)?;
        Self::validate_positive("BLOCK_DURATION", config.block_duration_secs)?;
        Self::validate_positive("RATE_LIMIT_WINDOW_MS", config.window_ms)?;
        Self::validate_positive("STORE_TIMEOUT_MS", config.store_timeout_ms)?;
        Ok(())
    }

    /// Validates a normalized store URL
    pub fn validate_store_url(url: &str) -> Result<(), ThrottlerError> {
        let rest = url
            .strip_prefix("redis://")
            .or_else(|| url.strip_prefix("rediss://"))
            .ok_or_else(|| {
                ThrottlerError::Configuration(
                    "Store URL must start with 'redis://' or 'rediss://'".to_string(),
                )
            })?;

        if rest.is_empty() {
            return Err(ThrottlerError::Configuration(
                "Store URL is missing a host".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_limit(name: &str, limit: u64) -> Result<(), ThrottlerError> {
        if limit == 0 {
            return Err(ThrottlerError::Configuration(format!(
                "{} must be greater than 0",
                name
            )));
        }
        Ok(())
    }

    // Redis rejects a zero expiry, so durations must be positive too.
    fn validate_positive(name: &str, value: u64) -> Result<(), ThrottlerError> {
        if value == 0 {
            return Err(ThrottlerError::Configuration(format!(
                "{} must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}
