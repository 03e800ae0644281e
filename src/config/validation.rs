use crate::config::types::{
    Config, CrawlerConfig, FetcherConfig, FilterConfig, LimitsConfig, OutputConfig,
    UserAgentConfig,
};
use crate::ConfigError;

/// Smallest budget that still holds an empty brotli stream with room to spare
const MIN_COMPRESSED_LENGTH: usize = 16;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_limits_config(&config.limits)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_filter_config(&config.filter)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.cooldown_days < 1 {
        return Err(ConfigError::Validation(
            "cooldown_days must be >= 1".to_string(),
        ));
    }

    if config.max_redirect_depth < 1 || config.max_redirect_depth > 50 {
        return Err(ConfigError::Validation(format!(
            "max_redirect_depth must be between 1 and 50, got {}",
            config.max_redirect_depth
        )));
    }

    if let Some(stop_file) = &config.stop_file {
        if stop_file.is_empty() {
            return Err(ConfigError::Validation(
                "stop_file cannot be empty when given".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.max_recv_speed_bps < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_recv_speed_bps must be >= 1024, got {}",
            config.max_recv_speed_bps
        )));
    }

    if config.ca_bundle_refresh_hours < 1 {
        return Err(ConfigError::Validation(
            "ca_bundle_refresh_hours must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits_config(config: &LimitsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("headers_max_length", config.headers_max_length),
        ("content_max_length", config.content_max_length),
    ] {
        if value < MIN_COMPRESSED_LENGTH {
            return Err(ConfigError::Validation(format!(
                "{} must be >= {}, got {}",
                name, MIN_COMPRESSED_LENGTH, value
            )));
        }
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() || config.crawler_version.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "crawler_version must be a single non-empty token, got '{}'",
            config.crawler_version
        )));
    }

    // The contact address is what an annoyed operator sees in their logs
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    for hostname in &config.ignored_hostnames {
        if hostname.is_empty() || hostname.chars().any(|c| c.is_uppercase()) {
            return Err(ConfigError::Validation(format!(
                "ignored hostname '{}' must be non-empty and lower-case",
                hostname
            )));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
