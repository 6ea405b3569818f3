//! Shared test helpers for router tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::auth::StaticTokens;
use crate::blob_store::LocalStore;
use crate::config::{
    AuthConfig, Config, LifecycleConfig, NodeConfig, ProcessorConfig, UploadConfig,
};
use crate::dispatch::{DispatchError, LinkProcessor, ProcessRequest};
use crate::storage::Database;
use crate::AppState;

pub const TOKEN_A: &str = "token-user-a";
pub const TOKEN_B: &str = "token-user-b";

/// Processor that accepts every request and remembers it.
#[derive(Default)]
pub struct AcceptingProcessor {
    pub requests: Mutex<Vec<ProcessRequest>>,
}

impl AcceptingProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl LinkProcessor for AcceptingProcessor {
    async fn request_processing(&self, request: &ProcessRequest) -> Result<(), DispatchError> {
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(request.clone());
        Ok(())
    }
}

/// Processor that answers every request with a 503.
pub struct FailingProcessor;

impl FailingProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl LinkProcessor for FailingProcessor {
    async fn request_processing(&self, _request: &ProcessRequest) -> Result<(), DispatchError> {
        Err(DispatchError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

/// Create a test AppState with a temporary database and local blob store.
/// `TOKEN_A` resolves to user "1", `TOKEN_B` to user "2".
pub fn test_state(
    temp_dir: &tempfile::TempDir,
    processor: Arc<dyn LinkProcessor>,
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");

    let mut api_tokens = HashMap::new();
    api_tokens.insert(
        TOKEN_A.to_string(),
        ("1".to_string(), "a@example.com".to_string()),
    );
    api_tokens.insert(
        TOKEN_B.to_string(),
        ("2".to_string(), "b@example.com".to_string()),
    );

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        upload: UploadConfig {
            upload_path: upload_dir.to_string_lossy().to_string(),
            ..UploadConfig::default()
        },
        processor: ProcessorConfig {
            timeout_ms: 500,
            ..ProcessorConfig::default()
        },
        auth: AuthConfig {
            api_tokens,
            processor_token: None,
        },
        lifecycle: LifecycleConfig::default(),
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let blob_store = LocalStore::new(&upload_dir).expect("Failed to create test blob store");
    let identity = StaticTokens::new(&config.auth.api_tokens);

    Arc::new(AppState::new(
        config,
        db,
        Arc::new(blob_store),
        processor,
        Arc::new(identity),
    ))
}
