use crate::config::types::{Config, CrawlerConfig, OutputConfig, SourceConfig, SourceKind};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_source_config(&config.source)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_imports < 1 || config.max_concurrent_imports > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_imports must be between 1 and 100, got {}",
            config.max_concurrent_imports
        )));
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.max_passes == Some(0) {
        return Err(ConfigError::Validation(
            "max_passes must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the remote source section
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &config.base_url {
        let url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "base_url '{}' must use http or https",
                base_url
            )));
        }
    }

    let has_user = config.user.as_ref().map_or(false, |u| !u.is_empty());
    let has_password = config.password.as_ref().map_or(false, |p| !p.is_empty());
    let has_token = config.token.as_ref().map_or(false, |t| !t.is_empty());

    if has_password && !has_user {
        return Err(ConfigError::Validation(
            "password is set but user is missing".to_string(),
        ));
    }

    if config.kind == SourceKind::Gitlab && has_user && !has_token {
        return Err(ConfigError::Validation(
            "GitLab requires a token; user/password login is not supported".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.gexf_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "gexf_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
