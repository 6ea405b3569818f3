use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub upload: UploadConfig,
    pub processor: ProcessorConfig,
    pub auth: AuthConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root directory of the local blob store
    pub upload_path: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Lowercase extensions including the dot, e.g. ".txt"
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token -> (user id, email)
    pub api_tokens: HashMap<String, (String, String)>,
    /// Shared secret the link processor sends on callback routes.
    pub processor_token: Option<String>,
}

/// What `finalize_link_count(_, 0)` does to a file with no extractable links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyFilePolicy {
    /// Mark the file FAILED.
    #[default]
    Fail,
    /// Record the count and leave the file non-terminal.
    Hold,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    pub empty_file_policy: EmptyFilePolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_path: "./uploads".to_string(),
            max_upload_size: 1024 * 1024, // 1MB
            allowed_extensions: vec![".txt".to_string(), ".csv".to_string()],
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

impl ProcessorConfig {
    /// Full dispatch URL, if both halves are configured.
    pub fn process_url(&self) -> Option<String> {
        match (self.base_url.as_deref(), self.endpoint.as_deref()) {
            (Some(base), Some(endpoint)) if !base.is_empty() && !endpoint.is_empty() => {
                Some(format!("{}{}", base.trim_end_matches('/'), endpoint))
            }
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let upload_path = std::env::var("UPLOAD_PATH").unwrap_or_else(|_| "./uploads".to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024 * 1024);

        let allowed_extensions = std::env::var("ALLOWED_EXTENSIONS")
            .map(|v| parse_extensions(&v))
            .unwrap_or_else(|_| UploadConfig::default().allowed_extensions);

        let base_url = std::env::var("PROCESSING_SERVICE_BASE_URL").ok();
        let endpoint = std::env::var("PROCESSING_SERVICE_ENDPOINT").ok();
        let timeout_ms = std::env::var("PROCESSING_SERVICE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);

        let api_tokens = std::env::var("API_TOKENS")
            .map(|v| parse_api_tokens(&v))
            .unwrap_or_else(|_| Ok(HashMap::new()))?;

        let processor_token = std::env::var("PROCESSOR_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let empty_file_policy = match std::env::var("EMPTY_FILE_POLICY")
            .unwrap_or_else(|_| "fail".to_string())
            .to_lowercase()
            .as_str()
        {
            "hold" => EmptyFilePolicy::Hold,
            _ => EmptyFilePolicy::Fail,
        };

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            upload: UploadConfig {
                upload_path,
                max_upload_size,
                allowed_extensions,
            },
            processor: ProcessorConfig {
                base_url,
                endpoint,
                timeout_ms,
            },
            auth: AuthConfig {
                api_tokens,
                processor_token,
            },
            lifecycle: LifecycleConfig { empty_file_policy },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "ALLOWED_EXTENSIONS cannot be empty".to_string(),
            ));
        }

        if self.processor.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "PROCESSING_SERVICE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.processor.process_url().is_none() {
            tracing::warn!(
                "PROCESSING_SERVICE_BASE_URL or PROCESSING_SERVICE_ENDPOINT is not set. \
                 Uploads will be stored but never dispatched."
            );
        }

        if self.auth.api_tokens.is_empty() {
            tracing::warn!("API_TOKENS is empty. Every user request will be rejected.");
        }

        Ok(())
    }
}

/// Parse `.txt, CSV ,json` into `[".txt", ".csv", ".json"]`.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
        .collect()
}

/// Parse `token:user_id:email` entries separated by commas.
pub fn parse_api_tokens(
    raw: &str,
) -> Result<HashMap<String, (String, String)>, ConfigError> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = entry.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(user_id), Some(email))
                if !token.is_empty() && !user_id.is_empty() && !email.is_empty() =>
            {
                tokens.insert(token.to_string(), (user_id.to_string(), email.to_string()));
            }
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "API_TOKENS entry '{entry}' must look like token:user_id:email"
                )));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extensions_normalizes() {
        assert_eq!(
            parse_extensions(".txt, CSV ,,json"),
            vec![".txt", ".csv", ".json"]
        );
    }

    #[test]
    fn test_parse_api_tokens() {
        let tokens = parse_api_tokens("abc:1:a@example.com, def:2:b@example.com").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            tokens.get("def"),
            Some(&("2".to_string(), "b@example.com".to_string()))
        );
    }

    #[test]
    fn test_parse_api_tokens_rejects_malformed_entry() {
        assert!(parse_api_tokens("abc:1").is_err());
        assert!(parse_api_tokens("::").is_err());
    }

    #[test]
    fn test_process_url_joins_base_and_endpoint() {
        let processor = ProcessorConfig {
            base_url: Some("http://scraper:8000/".to_string()),
            endpoint: Some("/process".to_string()),
            timeout_ms: 1000,
        };
        assert_eq!(
            processor.process_url().as_deref(),
            Some("http://scraper:8000/process")
        );
        assert!(ProcessorConfig::default().process_url().is_none());
    }
}
