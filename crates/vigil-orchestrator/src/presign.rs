//! Time-limited download URLs for trained artifacts.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use tracing::debug;

use crate::config::StorageSettings;
use crate::error::{OrchestratorError, Result};

/// Resolves a storage key into a URL the trainer can download from.
#[async_trait]
pub trait Presigner: Send + Sync {
    async fn presign(&self, key: &str) -> Result<String>;
}

/// Presigns GET requests against an S3-compatible bucket.
pub struct S3Presigner {
    store: AmazonS3,
    ttl: Duration,
}

impl fmt::Debug for S3Presigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Presigner").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl S3Presigner {
    /// Builds a presigner from storage settings. Credentials missing from the
    /// settings are taken from the standard `AWS_*` environment variables.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&settings.region)
            .with_bucket_name(&settings.bucket)
            .with_allow_http(settings.allow_http);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key_id) = &settings.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &settings.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder.build().map_err(|e| OrchestratorError::Presign {
            key: String::new(),
            message: format!("invalid object storage settings: {e}"),
        })?;
        Ok(Self { store, ttl: Duration::from_secs(settings.presign_ttl_secs) })
    }
}

#[async_trait]
impl Presigner for S3Presigner {
    async fn presign(&self, key: &str) -> Result<String> {
        let presign_error = |message: String| OrchestratorError::Presign { key: key.to_string(), message };

        let path = Path::parse(key).map_err(|e| presign_error(e.to_string()))?;
        let url = self
            .store
            .signed_url(Method::GET, &path, self.ttl)
            .await
            .map_err(|e| presign_error(e.to_string()))?;
        debug!(key, ttl_secs = self.ttl.as_secs(), "Presigned artifact URL");
        Ok(url.to_string())
    }
}
