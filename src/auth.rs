use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::response::ApiError;
use crate::AppState;

/// Header the link processor authenticates callbacks with.
pub const PROCESSOR_TOKEN_HEADER: &str = "x-processor-token";

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
}

/// Resolves an opaque bearer token to a caller.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Fixed token table, loaded from `API_TOKENS`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Caller>,
}

impl StaticTokens {
    pub fn new(tokens: &HashMap<String, (String, String)>) -> Self {
        let tokens = tokens
            .iter()
            .map(|(token, (user_id, email))| {
                (
                    token.clone(),
                    Caller {
                        user_id: user_id.clone(),
                        email: email.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

impl IdentityProvider for StaticTokens {
    fn resolve(&self, token: &str) -> Option<Caller> {
        self.tokens.get(token).cloned()
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing or malformed bearer token"))?;

        state.identity.resolve(token).ok_or_else(|| {
            tracing::warn!("Rejected request with unknown bearer token");
            ApiError::unauthorized("Invalid token")
        })
    }
}

/// Marker extractor for processor callback routes.
///
/// When `PROCESSOR_TOKEN` is configured the request must carry it in
/// `X-Processor-Token`; otherwise callbacks are accepted as-is.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorCallback;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ProcessorCallback {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let Some(ref expected) = state.config.auth.processor_token else {
            return Ok(ProcessorCallback);
        };

        let presented = parts
            .headers
            .get(PROCESSOR_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented == Some(expected.as_str()) {
            Ok(ProcessorCallback)
        } else {
            tracing::warn!("Rejected processor callback with missing or wrong token");
            Err(ApiError::unauthorized("Invalid processor token"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_tokens_resolve() {
        let mut table = HashMap::new();
        table.insert(
            "tok-a".to_string(),
            ("1".to_string(), "a@example.com".to_string()),
        );
        let provider = StaticTokens::new(&table);

        assert_eq!(
            provider.resolve("tok-a"),
            Some(Caller {
                user_id: "1".to_string(),
                email: "a@example.com".to_string(),
            })
        );
        assert_eq!(provider.resolve("tok-b"), None);
    }
}
